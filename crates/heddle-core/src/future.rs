//! Typed result-bearing task.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::domain::{TaskId, TaskState};
use crate::error::{BoxError, FailureCause, TaskError};
use crate::task::{Task, TaskHandle};

/// A task whose body produces a `T`, stored for later retrieval.
///
/// Design:
/// - The future is a thin pair of the underlying task handle and a
///   shared result slot; cloning is cheap and every clone observes the
///   same task.
/// - The slot is written by the body before the task reaches
///   `Completed`, so any observer of `Completed` can read it.
pub struct Future<T> {
    task: TaskHandle,
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Wrap a value-producing body into a pending future.
    pub fn new(body: impl FnOnce() -> Result<T, BoxError> + Send + 'static) -> Self {
        let slot = Arc::new(Mutex::new(None));
        let task = {
            let slot = Arc::clone(&slot);
            Task::new(move || {
                let value = body()?;
                *slot.lock() = Some(value);
                Ok(())
            })
        };
        Self { task, slot }
    }
}

impl<T> Future<T> {
    /// The underlying task handle, for gating other tasks on this one
    /// and for submission.
    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_pending()
    }

    pub fn is_completed(&self) -> bool {
        self.task.is_completed()
    }

    pub fn is_failed(&self) -> bool {
        self.task.is_failed()
    }

    pub fn is_canceled(&self) -> bool {
        self.task.is_canceled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn error(&self) -> Option<FailureCause> {
        self.task.error()
    }

    /// Gate this future on `dep` reaching any terminal state. Attach
    /// before submission.
    pub fn add_dependency(&self, dep: &TaskHandle) {
        self.task.add_dependency(dep);
    }

    /// Gate this future on any one of its triggers finishing.
    pub fn add_trigger(&self, trigger: &TaskHandle) {
        self.task.add_trigger(trigger);
    }

    /// Earliest instant the body may start.
    pub fn set_time_trigger(&self, at: Instant) {
        self.task.set_time_trigger(at);
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn wait(&self) {
        self.task.wait();
    }
}

impl<T: Clone> Future<T> {
    /// Block until finished, then yield the stored value, re-raise the
    /// captured failure, or report cancellation.
    pub fn get(&self) -> Result<T, TaskError> {
        self.task.wait();
        self.resolve()
    }

    /// Non-blocking peek: `None` while the future is unfinished.
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        if !self.task.is_finished() {
            return None;
        }
        Some(self.resolve())
    }

    fn resolve(&self) -> Result<T, TaskError> {
        match self.task.state() {
            TaskState::Completed => {
                Ok(self.slot.lock().clone().expect("result should be set"))
            }
            TaskState::Failed => Err(TaskError::Failed(
                self.task.error().expect("failure cause should be set"),
            )),
            TaskState::Canceled => Err(TaskError::Canceled),
            TaskState::Pending | TaskState::Running => {
                unreachable!("resolve called on an unfinished task")
            }
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    // Drive the underlying task directly; executor integration lives in
    // executor.rs tests.
    fn run<T: Send + 'static>(future: &Future<T>) {
        future.task().try_execute();
    }

    #[test]
    fn get_returns_the_produced_value() {
        let future = Future::new(|| Ok(42));
        run(&future);
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn get_reraises_the_captured_failure() {
        let future: Future<u32> = Future::new(|| Err("bad checksum".into()));
        run(&future);

        assert!(future.is_failed());
        match future.get() {
            Err(TaskError::Failed(cause)) => {
                assert!(cause.to_string().contains("bad checksum"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn get_reports_cancellation() {
        let future: Future<u32> = Future::new(|| Ok(1));
        future.cancel();

        assert!(future.is_canceled());
        assert!(matches!(future.get(), Err(TaskError::Canceled)));
    }

    #[test]
    fn try_get_is_none_until_finished() {
        let future = Future::new(|| Ok("ready"));
        assert!(future.try_get().is_none());

        run(&future);
        assert_eq!(future.try_get().unwrap().unwrap(), "ready");
    }

    #[test]
    fn clones_observe_the_same_task() {
        let future = Future::new(|| Ok(7));
        let clone = future.clone();

        run(&future);
        assert!(clone.is_completed());
        assert_eq!(clone.get().unwrap(), 7);
    }

    #[test]
    fn get_blocks_until_the_value_arrives() {
        let future = Future::new(|| Ok(5));

        let getter = {
            let future = future.clone();
            thread::spawn(move || future.get())
        };

        thread::sleep(Duration::from_millis(20));
        run(&future);
        assert_eq!(getter.join().unwrap().unwrap(), 5);
    }
}
