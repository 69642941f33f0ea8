use serde::{Deserialize, Serialize};

/// Point-in-time view of an executor, for logs and status endpoints.
///
/// `busy` counts workers currently holding a task (gate check included),
/// `queued` the tasks waiting in the shared queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorStatus {
    pub workers: usize,
    pub busy: usize,
    pub queued: usize,
    pub shutting_down: bool,
}
