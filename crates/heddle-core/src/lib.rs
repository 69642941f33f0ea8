//! heddle-core
//!
//! A bounded thread-pool executor that decouples what to compute from
//! where and when it runs. Tasks carry a lifecycle state machine and
//! optional gates (dependencies, triggers, a time trigger); a fixed
//! pool of workers drains a shared cancellable FIFO and re-enqueues
//! tasks whose gates are not yet satisfied. A typed [`Future`] plus a
//! small set of combinators composes parallel computations on top.
//!
//! Module map:
//! - domain: ids and lifecycle states
//! - queue: the cancellable FIFO the workers drain
//! - task: state machine, gating, wait/cancel
//! - future: typed results and blocking retrieval
//! - executor: the worker pool and the combinators
//! - observability: status snapshots
//! - error: crate-level error types
//!
//! # Example
//!
//! ```
//! use heddle_core::Executor;
//!
//! let executor = Executor::new(2);
//! let doubled = executor.invoke(|| Ok(21 * 2));
//! assert_eq!(doubled.get().unwrap(), 42);
//! ```

pub mod domain;
pub mod error;
pub mod executor;
pub mod future;
pub mod observability;
pub mod queue;
pub mod task;

pub use domain::{TaskId, TaskState};
pub use error::{BodyPanic, BoxError, EmptySelection, FailureCause, TaskError};
pub use executor::{Executor, ExecutorBuilder};
pub use future::Future;
pub use observability::ExecutorStatus;
pub use queue::CancelQueue;
pub use task::{Task, TaskHandle};
