//! Placement and VM lifecycle workflows for the Stratus engine
//!
//! Builds on `stratus-cloud`'s transport and task tracking: placement picks
//! storage bins and resource pools off live listings, and the
//! [`Orchestrator`] drives the multi-step launch / resize / terminate /
//! capture workflows.

pub mod error;
pub mod model;
pub mod orchestrator;
pub mod placement;

// Re-exports
pub use error::{ComputeError, Result};
pub use model::{ComputeProduct, OsFamily, PowerState, VmRecord};
pub use orchestrator::{
    DiskChange, LaunchRequest, Orchestrator, ResizeRequest, DEFAULT_ROOT_DISK_KB,
};
pub use placement::{select_pool, select_storage};
