//! Stratus core transport and task-tracking primitives
//!
//! Mutating operations on this cloud are asynchronous server-side jobs: a
//! POST queues a task and returns its id, and the client polls the task to
//! a terminal state to learn the outcome. This crate provides the narrow
//! [`Transport`] seam the rest of the engine consumes, the reqwest-backed
//! implementation of it, the task-polling protocol, and the shared timing
//! configuration.
//!
//! Placement and workflow orchestration live in `stratus-compute`; chunked
//! object transfer lives in `stratus-storage`.

pub mod config;
pub mod error;
pub mod poll;
pub mod task;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-exports
pub use config::{EngineConfig, NotFoundPolicy};
pub use error::{CloudError, Result};
pub use poll::poll_until;
pub use task::{
    storage_task_id, submit_and_wait, task_id_from_response, wait_for_task, TaskStatus,
};
pub use transport::{HttpTransport, Transport};
