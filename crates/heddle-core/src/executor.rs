//! Fixed worker pool draining a shared cancellable queue.
//!
//! Scheduling is deliberately simple: a worker pops a task, evaluates
//! its gate via `try_execute`, and re-enqueues the task to the tail if
//! the gate is not yet satisfied. FIFO re-enqueue keeps one gated task
//! from starving ready ones; there is no priority queue and no timer
//! wheel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{BoxError, EmptySelection};
use crate::future::Future;
use crate::observability::ExecutorStatus;
use crate::queue::CancelQueue;
use crate::task::{ExecOutcome, TaskHandle};

/// Configures and spawns an [`Executor`].
///
/// Worker count defaults to the number of logical CPUs.
pub struct ExecutorBuilder {
    workers: usize,
    thread_name: String,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            thread_name: "heddle-worker".to_string(),
        }
    }

    /// Number of worker threads. Must be positive; `build` panics on zero.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Prefix for worker thread names.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Spawn all workers eagerly. No threads are added later.
    pub fn build(self) -> Executor {
        assert!(self.workers > 0, "executor needs at least one worker");

        let queue = Arc::new(CancelQueue::new());
        let busy = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let queue = Arc::clone(&queue);
            let busy = Arc::clone(&busy);
            let handle = thread::Builder::new()
                .name(format!("{}-{worker_id}", self.thread_name))
                .spawn(move || worker_loop(worker_id, &queue, &busy))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        log::debug!("executor started with {} workers", self.workers);

        Executor {
            queue,
            busy,
            workers: Mutex::new(workers),
            worker_count: self.workers,
        }
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(worker_id: usize, queue: &CancelQueue<TaskHandle>, busy: &AtomicUsize) {
    // A pop of None means the queue is canceled and drained: exit.
    while let Some(task) = queue.pop() {
        if task.is_canceled() {
            log::trace!("worker-{worker_id}: dropping canceled {}", task.id());
            continue;
        }

        busy.fetch_add(1, Ordering::Relaxed);
        let outcome = task.try_execute();
        busy.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            ExecOutcome::Ran | ExecOutcome::Lost => {}
            ExecOutcome::NotReady => {
                if queue.push(Arc::clone(&task)) {
                    // A lone gated task would otherwise spin this
                    // worker through pop/requeue at full speed.
                    thread::yield_now();
                } else {
                    // Shutdown canceled the queue while we held the
                    // task; release its waiters instead of leaving it
                    // pending forever.
                    task.cancel();
                }
            }
        }
    }
    log::trace!("worker-{worker_id}: exiting");
}

/// The pool and shared queue that dispatch tasks onto worker threads.
///
/// Dropping the executor shuts it down: the queue is canceled, queued
/// tasks are drained and dispatched, and all workers are joined.
pub struct Executor {
    queue: Arc<CancelQueue<TaskHandle>>,
    busy: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl Executor {
    /// Pool with `workers` threads. See [`ExecutorBuilder`] for more knobs.
    pub fn new(workers: usize) -> Self {
        ExecutorBuilder::new().workers(workers).build()
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Hand a task to the pool.
    ///
    /// After shutdown has begun the task is canceled instead; a task
    /// that is no longer `Pending` is dropped silently.
    pub fn submit(&self, task: TaskHandle) {
        if self.queue.is_canceled() {
            task.cancel();
            return;
        }
        if task.is_pending() && !self.queue.push(Arc::clone(&task)) {
            // Shutdown slipped in between the check and the push.
            task.cancel();
        }
    }

    /// Begin shutdown: no new submissions are accepted, but tasks
    /// already in the queue are still popped and dispatched. Idempotent.
    pub fn start_shutdown(&self) {
        log::debug!("executor shutdown requested");
        self.queue.cancel();
    }

    /// Join every worker thread. Idempotent; blocks indefinitely if
    /// shutdown was never started.
    pub fn wait_shutdown(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Point-in-time view of the pool.
    pub fn status(&self) -> ExecutorStatus {
        ExecutorStatus {
            workers: self.worker_count,
            busy: self.busy.load(Ordering::Relaxed),
            queued: self.queue.len(),
            shutting_down: self.queue.is_canceled(),
        }
    }

    /// Wrap `body` into a future and submit it immediately, ungated.
    pub fn invoke<T, F>(&self, body: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let future = Future::new(body);
        self.submit(Arc::clone(future.task()));
        future
    }

    /// Run `body` once `input` is finished, in any terminal state.
    ///
    /// The body decides how to observe the input, typically by holding
    /// a clone of it and calling `get`, which re-raises on failure.
    pub fn then<T, Y, F>(&self, input: &Future<T>, body: F) -> Future<Y>
    where
        Y: Send + 'static,
        F: FnOnce() -> Result<Y, BoxError> + Send + 'static,
    {
        let future = Future::new(body);
        future.add_dependency(input.task());
        self.submit(Arc::clone(future.task()));
        future
    }

    /// Collect every input's result, in input order, once all of them
    /// are finished. The first failed or canceled input re-raises.
    pub fn when_all<T>(&self, inputs: Vec<Future<T>>) -> Future<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        let future = Future::new({
            let inputs = inputs.clone();
            move || {
                let mut results = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    // The dependency gate guarantees the input is
                    // finished, so this never blocks on a worker.
                    results.push(input.get()?);
                }
                Ok(results)
            }
        });
        for input in &inputs {
            future.add_dependency(input.task());
        }
        self.submit(Arc::clone(future.task()));
        future
    }

    /// Resolve to the first finished input's result, scanning in input
    /// order (input order is the tiebreak when several have already
    /// finished). A finished-but-failed winner re-raises. Zero inputs
    /// resolve to a failed future carrying [`EmptySelection`].
    pub fn when_first<T>(&self, inputs: Vec<Future<T>>) -> Future<T>
    where
        T: Clone + Send + 'static,
    {
        let future = Future::new({
            let inputs = inputs.clone();
            move || {
                for input in &inputs {
                    if input.is_finished() {
                        return Ok(input.get()?);
                    }
                }
                // Finished is monotonic, so with a nonempty list the
                // scan above always finds the trigger that admitted
                // us; this only resolves the empty-input case.
                let head = inputs.first().ok_or(EmptySelection)?;
                Ok(head.get()?)
            }
        });
        for input in &inputs {
            future.add_trigger(input.task());
        }
        self.submit(Arc::clone(future.task()));
        future
    }

    /// At `deadline`, collect the results of the inputs that are
    /// finished by then, in input order; unfinished inputs are omitted.
    /// A finished-but-failed input re-raises, matching `when_all`.
    pub fn when_all_before_deadline<T>(
        &self,
        inputs: Vec<Future<T>>,
        deadline: Instant,
    ) -> Future<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        let future = Future::new({
            let inputs = inputs.clone();
            move || {
                let mut results = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    if input.is_finished() {
                        results.push(input.get()?);
                    }
                }
                Ok(results)
            }
        });
        future.set_time_trigger(deadline);
        self.submit(Arc::clone(future.task()));
        future
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.start_shutdown();
        self.wait_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::Task;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn invoke_runs_on_a_worker() {
        let executor = Executor::new(2);
        let future = executor.invoke(|| Ok(42));
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn builder_defaults_to_a_positive_worker_count() {
        let builder = ExecutorBuilder::new();
        assert!(builder.workers >= 1);
    }

    #[test]
    #[should_panic(expected = "at least one worker")]
    fn zero_workers_is_rejected() {
        let _ = Executor::new(0);
    }

    #[test]
    fn dependency_chain_passes_values_through_get() {
        let executor = Executor::new(2);

        let a = executor.invoke(|| Ok(1));
        let b = Future::new({
            let a = a.clone();
            move || Ok(a.get()? + 1)
        });
        b.add_dependency(a.task());
        executor.submit(Arc::clone(b.task()));

        assert_eq!(b.get().unwrap(), 2);
    }

    #[test]
    fn then_runs_after_its_input() {
        let executor = Executor::new(2);

        let a = executor.invoke(|| Ok(20));
        let b = executor.then(&a, {
            let a = a.clone();
            move || Ok(a.get()? * 2 + 2)
        });

        assert_eq!(b.get().unwrap(), 42);
    }

    #[test]
    fn failure_surfaces_through_get() {
        let executor = Executor::new(2);
        let future: Future<u32> = executor.invoke(|| Err("ledger out of balance".into()));

        match future.get() {
            Err(TaskError::Failed(cause)) => {
                assert!(cause.to_string().contains("ledger out of balance"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(future.is_failed());
    }

    #[test]
    fn when_all_collects_in_input_order() {
        let executor = Executor::new(3);

        // The slowest input comes first so completion order differs
        // from input order.
        let inputs = vec![
            executor.invoke(|| {
                thread::sleep(Duration::from_millis(40));
                Ok(1)
            }),
            executor.invoke(|| {
                thread::sleep(Duration::from_millis(10));
                Ok(2)
            }),
            executor.invoke(|| Ok(3)),
        ];
        let all = executor.when_all(inputs);

        assert_eq!(all.get().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn when_all_reraises_the_first_failure() {
        let executor = Executor::new(2);

        let ok = executor.invoke(|| Ok(1));
        let bad: Future<i32> = executor.invoke(|| Err("no quorum".into()));
        let all = executor.when_all(vec![ok, bad]);

        match all.get() {
            Err(TaskError::Failed(cause)) => assert!(cause.to_string().contains("no quorum")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn when_first_returns_the_earliest_finisher() {
        let executor = Executor::new(2);

        let slow = executor.invoke(|| {
            thread::sleep(Duration::from_millis(100));
            Ok("a")
        });
        let fast = executor.invoke(|| {
            thread::sleep(Duration::from_millis(10));
            Ok("b")
        });
        let first = executor.when_first(vec![slow, fast]);

        assert_eq!(first.get().unwrap(), "b");
    }

    #[test]
    fn when_first_breaks_ties_by_input_order() {
        let executor = Executor::new(2);

        let a = executor.invoke(|| Ok("a"));
        let b = executor.invoke(|| Ok("b"));
        a.wait();
        b.wait();

        // Both are already finished when the selector runs.
        let first = executor.when_first(vec![a, b]);
        assert_eq!(first.get().unwrap(), "a");
    }

    #[test]
    fn when_first_of_nothing_fails() {
        let executor = Executor::new(1);
        let first: Future<u32> = executor.when_first(Vec::new());

        match first.get() {
            Err(TaskError::Failed(cause)) => {
                assert!(cause.to_string().contains("empty set"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn deadline_gather_omits_unfinished_inputs() {
        let executor = Executor::new(4);

        let inputs = vec![
            executor.invoke(|| {
                thread::sleep(Duration::from_millis(10));
                Ok(1)
            }),
            executor.invoke(|| {
                thread::sleep(Duration::from_millis(50));
                Ok(2)
            }),
            executor.invoke(|| {
                thread::sleep(Duration::from_millis(500));
                Ok(3)
            }),
        ];
        let gathered = executor
            .when_all_before_deadline(inputs, Instant::now() + Duration::from_millis(150));

        assert_eq!(gathered.get().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancel_wins_against_a_far_time_trigger() {
        let executor = Executor::new(2);

        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let ran = Arc::clone(&ran);
            Task::new(move || {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        task.set_time_trigger(Instant::now() + Duration::from_secs(1));
        executor.submit(Arc::clone(&task));
        task.cancel();

        task.wait();
        assert!(task.is_canceled());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn submit_after_shutdown_cancels_the_task() {
        let executor = Executor::new(1);
        executor.start_shutdown();

        let task = Task::new(|| Ok(()));
        executor.submit(Arc::clone(&task));
        assert!(task.is_canceled());
    }

    #[test]
    fn tasks_queued_before_shutdown_still_run() {
        let future;
        {
            let executor = Executor::new(2);
            future = executor.invoke(|| Ok(9));
            // Drop starts shutdown and joins; the queued future is
            // drained and dispatched on the way out.
        }
        assert!(future.is_finished());
        assert_eq!(future.get().unwrap(), 9);
    }

    #[test]
    fn gated_task_is_released_when_shutdown_drains_it() {
        let executor = Executor::new(1);

        let task = Task::new(|| Ok(()));
        task.set_time_trigger(Instant::now() + Duration::from_secs(30));
        executor.submit(Arc::clone(&task));

        // Let the worker cycle the task through the queue a few times.
        thread::sleep(Duration::from_millis(30));
        executor.start_shutdown();

        // Must not hang: the rejected re-enqueue cancels the task.
        task.wait();
        assert!(task.is_canceled());
        executor.wait_shutdown();
    }

    #[test]
    fn wait_shutdown_joins_all_workers_and_is_idempotent() {
        let executor = Executor::new(3);
        executor.invoke(|| Ok(()));

        executor.start_shutdown();
        executor.wait_shutdown();
        executor.wait_shutdown();

        let status = executor.status();
        assert_eq!(status.busy, 0);
        assert!(status.shutting_down);
    }

    #[test]
    fn start_shutdown_is_idempotent() {
        let executor = Executor::new(1);
        executor.start_shutdown();
        executor.start_shutdown();
        executor.wait_shutdown();
    }

    #[test]
    fn parallelism_never_exceeds_the_worker_count() {
        let executor = Executor::new(2);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                executor.invoke(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        for future in futures {
            future.get().unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= 2, "observed {peak} concurrent bodies with 2 workers");
    }

    #[test]
    fn a_panicking_body_does_not_kill_its_worker() {
        let executor = Executor::new(1);

        let panicky: Future<u32> = executor.invoke(|| panic!("spindle jammed"));
        assert!(matches!(panicky.get(), Err(TaskError::Failed(_))));

        // The lone worker must still be alive to run this.
        let after = executor.invoke(|| Ok(5));
        assert_eq!(after.get().unwrap(), 5);
    }

    #[test]
    fn status_reflects_the_pool_and_serializes() {
        let executor = Executor::builder()
            .workers(3)
            .thread_name("status-test")
            .build();

        let status = executor.status();
        assert_eq!(status.workers, 3);
        assert!(!status.shutting_down);

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"workers\":3"));

        executor.start_shutdown();
        assert!(executor.status().shutting_down);
    }
}
