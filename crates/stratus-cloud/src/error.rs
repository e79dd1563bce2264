//! Engine error types

use thiserror::Error;

/// Errors surfaced by the transport and task layers
#[derive(Error, Debug)]
pub enum CloudError {
    /// Transport-level I/O failure (connection, TLS, timeout). Transient.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response that is not the clean "no such resource" signal.
    /// Status code, reason phrase and provider message are kept verbatim.
    #[error("API error {status} ({reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    /// Business-level not-found reported inside a task's error map.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other terminal task failure; carries the full error map.
    #[error("Task failed: {0}")]
    Task(String),

    /// A payload the engine must read was missing an expected field.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
