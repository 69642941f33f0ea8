use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Error type task bodies return. Open-ended on purpose: the executor
/// neither understands nor validates what a body does.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A captured failure, shared between every handle observing the task.
pub type FailureCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// What `Future::get` reports when there is no value to hand out.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The body returned an error or panicked; carries the cause.
    #[error("task failed: {0}")]
    Failed(FailureCause),

    /// The task was canceled before its body ran.
    #[error("task was canceled")]
    Canceled,
}

/// A panic caught in a task body, preserved as the failure cause so the
/// worker thread survives and `get` can re-raise something inspectable.
#[derive(Debug, Error)]
#[error("task body panicked: {message}")]
pub struct BodyPanic {
    message: String,
}

impl BodyPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `when_first` was asked to pick from zero futures.
#[derive(Debug, Clone, Copy, Error)]
#[error("cannot select from an empty set of futures")]
pub struct EmptySelection;
