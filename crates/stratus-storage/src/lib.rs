//! Blob storage for the Stratus engine
//!
//! Two surfaces: the [`BlobCatalog`] for bin and object bookkeeping, and
//! the [`TransferClient`] for moving object bytes through the file
//! service's chunked sessions. Both ride the same task-tracking protocol
//! as the compute side, with the storage flavor of task ids.

pub mod blob;
pub mod error;
pub mod transfer;

mod protocol;

// Re-exports
pub use blob::{BlobCatalog, BlobEntry, StorageBin};
pub use error::{Result, StorageError};
pub use transfer::TransferClient;
