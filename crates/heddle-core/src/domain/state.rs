//! Task lifecycle states.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// TaskState is the lifecycle state of a task.
///
/// Transitions:
/// - `Pending -> Running`: a worker claimed the task (gate satisfied)
/// - `Running -> Completed`: body returned Ok
/// - `Running -> Failed`: body returned Err or panicked
/// - `Pending -> Canceled`: cancel won the race against a worker
///
/// `Completed`, `Failed` and `Canceled` are terminal. There is no
/// transition out of a terminal state, and no `Running -> Canceled`:
/// cancellation never interrupts a body in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Terminal means the task will never run (again): finished.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

/// Atomically observable state slot.
///
/// All exits from `Pending` go through `try_transition` so that
/// `cancel` and a worker claiming the task cannot both win. Stores use
/// release ordering and loads acquire ordering: anything written before
/// a terminal store (result slot, failure cause) is visible to an
/// observer that reads the terminal state.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;
const CANCELED: u8 = 4;

fn encode(state: TaskState) -> u8 {
    match state {
        TaskState::Pending => PENDING,
        TaskState::Running => RUNNING,
        TaskState::Completed => COMPLETED,
        TaskState::Failed => FAILED,
        TaskState::Canceled => CANCELED,
    }
}

fn decode(raw: u8) -> TaskState {
    match raw {
        PENDING => TaskState::Pending,
        RUNNING => TaskState::Running,
        COMPLETED => TaskState::Completed,
        FAILED => TaskState::Failed,
        CANCELED => TaskState::Canceled,
        other => unreachable!("invalid task state discriminant: {other}"),
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    pub fn load(&self) -> TaskState {
        decode(self.0.load(Ordering::Acquire))
    }

    /// Unconditional store. Only used for `Running -> Completed/Failed`,
    /// where the running worker is the sole writer.
    pub fn store(&self, state: TaskState) {
        self.0.store(encode(state), Ordering::Release);
    }

    /// Compare-and-swap `from -> to`. Returns false if the state was no
    /// longer `from`.
    pub fn try_transition(&self, from: TaskState, to: TaskState) -> bool {
        self.0
            .compare_exchange(
                encode(from),
                encode(to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
