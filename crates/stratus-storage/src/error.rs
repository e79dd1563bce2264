//! Blob storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage not found: {0}")]
    StorageNotFound(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] stratus_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
