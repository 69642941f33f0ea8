//! Task: a gated unit of work with an observable lifecycle.
//!
//! Design:
//! - State lives in an atomic cell; every exit from `Pending` is a
//!   compare-and-swap, so `cancel` and a worker claiming the task race
//!   safely (exactly one wins).
//! - Gates (dependencies, triggers, time trigger) live under one mutex,
//!   which doubles as the condvar mutex for `wait`.
//! - The body runs outside the gate mutex; waiters are only blocked for
//!   the length of a state check.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::domain::{StateCell, TaskId, TaskState};
use crate::error::{BodyPanic, BoxError, FailureCause};

/// Shared handle to a task. Held by the submitter, the queue, any
/// dependents, and the worker currently processing it.
pub type TaskHandle = Arc<Task>;

type TaskBody = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// What a single `try_execute` attempt did, reported to the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecOutcome {
    /// The gate is not satisfied yet; the task is still `Pending`.
    NotReady,
    /// The task was no longer `Pending` (canceled, or claimed by
    /// another worker between pop and claim).
    Lost,
    /// The body ran to a terminal state (`Completed` or `Failed`).
    Ran,
}

/// Gating conditions checked before a task may start.
#[derive(Default)]
struct Gates {
    /// Every dependency must be finished, in any terminal state.
    dependencies: Vec<TaskHandle>,
    /// At least one trigger must be finished. An empty list does not gate.
    triggers: Vec<TaskHandle>,
    /// Earliest instant the task may start.
    not_before: Option<Instant>,
}

impl Gates {
    fn satisfied(&self, now: Instant) -> bool {
        if self.dependencies.iter().any(|dep| !dep.is_finished()) {
            return false;
        }
        if !self.triggers.is_empty() && !self.triggers.iter().any(|t| t.is_finished()) {
            return false;
        }
        if let Some(at) = self.not_before {
            if now < at {
                return false;
            }
        }
        true
    }
}

/// A scheduled unit of computation.
///
/// Constructed with a body, optionally gated, then submitted to an
/// [`Executor`](crate::executor::Executor). Predecessors referenced by
/// the gates are held alive until this task has observed their finish.
pub struct Task {
    id: TaskId,
    state: StateCell,
    gates: Mutex<Gates>,
    body: Mutex<Option<TaskBody>>,
    failure: Mutex<Option<FailureCause>>,
    finished: Condvar,
}

impl Task {
    /// Wrap a body into a pending, ungated task.
    pub fn new(body: impl FnOnce() -> Result<(), BoxError> + Send + 'static) -> TaskHandle {
        Arc::new(Self {
            id: TaskId::generate(),
            state: StateCell::new(),
            gates: Mutex::new(Gates::default()),
            body: Mutex::new(Some(Box::new(body))),
            failure: Mutex::new(None),
            finished: Condvar::new(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state.load()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TaskState::Canceled
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The captured failure. `Some` exactly when the state is `Failed`.
    pub fn error(&self) -> Option<FailureCause> {
        if !self.is_failed() {
            return None;
        }
        self.failure.lock().clone()
    }

    /// Gate this task on `dep` reaching any terminal state.
    ///
    /// Gates may only be attached while the task is `Pending` and not
    /// yet submitted.
    pub fn add_dependency(&self, dep: &TaskHandle) {
        debug_assert!(self.is_pending(), "gates must be attached before submit");
        self.gates.lock().dependencies.push(Arc::clone(dep));
    }

    /// Gate this task on *any* of its triggers reaching a terminal state.
    pub fn add_trigger(&self, trigger: &TaskHandle) {
        debug_assert!(self.is_pending(), "gates must be attached before submit");
        self.gates.lock().triggers.push(Arc::clone(trigger));
    }

    /// Gate this task on the clock: it may not start before `at`.
    pub fn set_time_trigger(&self, at: Instant) {
        debug_assert!(self.is_pending(), "gates must be attached before submit");
        self.gates.lock().not_before = Some(at);
    }

    /// Attempt the `Pending -> Canceled` transition. A no-op once the
    /// task is `Running` or finished. Idempotent.
    pub fn cancel(&self) {
        // Taken for the condvar handshake: waiters check state under
        // this mutex, so the notify cannot be missed.
        let _gates = self.gates.lock();
        if self.state.try_transition(TaskState::Pending, TaskState::Canceled) {
            log::trace!("{} canceled", self.id);
            self.finished.notify_all();
        }
    }

    /// Block until the task is finished. Any number of waiters may
    /// block concurrently; all are released by the final transition.
    pub fn wait(&self) {
        let mut gates = self.gates.lock();
        while !self.is_finished() {
            self.finished.wait(&mut gates);
        }
    }

    /// Worker-side entry point: run the body if the gate allows it.
    ///
    /// Gate evaluation and the `Pending -> Running` claim happen under
    /// the gate mutex; the body itself runs with no locks held.
    pub(crate) fn try_execute(&self) -> ExecOutcome {
        {
            let gates = self.gates.lock();
            if !self.is_pending() {
                return ExecOutcome::Lost;
            }
            if !gates.satisfied(Instant::now()) {
                return ExecOutcome::NotReady;
            }
            if !self.state.try_transition(TaskState::Pending, TaskState::Running) {
                return ExecOutcome::Lost;
            }
        }

        // The Running claim is won exactly once, so the body is present.
        let body = self.body.lock().take();
        let result = match body {
            Some(body) => match catch_unwind(AssertUnwindSafe(body)) {
                Ok(result) => result,
                Err(payload) => Err(Box::new(BodyPanic::from_payload(payload)) as BoxError),
            },
            None => Ok(()),
        };

        match result {
            Ok(()) => self.finish(TaskState::Completed, None),
            Err(cause) => self.finish(TaskState::Failed, Some(Arc::from(cause))),
        }
        ExecOutcome::Ran
    }

    /// Publish the terminal state and release every waiter. The failure
    /// cause is written before the state store so any observer of
    /// `Failed` sees it.
    fn finish(&self, terminal: TaskState, cause: Option<FailureCause>) {
        if let Some(cause) = cause {
            *self.failure.lock() = Some(cause);
        }
        let _gates = self.gates.lock();
        self.state.store(terminal);
        log::trace!("{} finished as {:?}", self.id, terminal);
        self.finished.notify_all();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
