//! Compute workflow error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Virtual machine not found: {0}")]
    VmNotFound(String),

    #[error("No qualifying placement: {0}")]
    PlacementExhausted(String),

    #[error("Resource never became visible: {0}")]
    NeverMaterialized(String),

    #[error("VM {0} did not stop within the deadline")]
    StopDeadlineExceeded(String),

    #[error("Invalid product id: {0}")]
    InvalidProduct(String),

    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] stratus_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, ComputeError>;
