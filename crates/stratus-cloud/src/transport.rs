//! Authenticated HTTP transport
//!
//! The engine talks to the cloud through this narrow interface. `Ok(None)`
//! is the clean "no such resource" signal: an HTTP 404, or an HTTP 400 whose
//! body says the object could not be found. Everything else non-2xx becomes
//! a structured [`CloudError::Api`].

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Marker some 400 responses carry instead of a proper 404.
const NOT_FOUND_MARKER: &str = "could not be found";

/// Narrow request interface consumed by the engine.
///
/// Implementations must be safe to share across workflows; the engine never
/// stores per-request state in the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET returning the response body, or `None` for a missing resource.
    async fn get(&self, path: &str) -> Result<Option<String>>;

    /// POST a JSON body, returning the response body.
    async fn post(&self, path: &str, body: &str) -> Result<Option<String>>;

    /// DELETE, returning the response body.
    async fn delete(&self, path: &str) -> Result<Option<String>>;

    /// GET returning raw bytes; used by chunked downloads.
    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Error envelope the service wraps failures in.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "ResponseStatus")]
    response_status: Option<ResponseStatus>,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Pull the provider's message out of an error body, falling back to the
/// raw body when it is not the usual JSON envelope.
fn parse_error_message(body: &str) -> String {
    if body.trim_start().starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            if let Some(message) = envelope.response_status.and_then(|s| s.message) {
                return message;
            }
        }
    }
    body.to_string()
}

/// Classify a response into the engine's three outcomes: body, clean
/// not-found, or structured API error.
fn classify(status: u16, reason: &str, body: String) -> Result<Option<String>> {
    if status == 404 {
        return Ok(None);
    }
    if (200..300).contains(&status) {
        return Ok(Some(body));
    }
    if status == 400 && body.contains(NOT_FOUND_MARKER) {
        return Ok(None);
    }
    let message = if body.is_empty() {
        reason.to_string()
    } else {
        parse_error_message(&body)
    };
    Err(CloudError::Api {
        status,
        reason: reason.to_string(),
        message,
    })
}

/// reqwest-backed transport.
///
/// Holds the endpoint base and an opaque `Authorization` header value;
/// signature construction is the caller's concern.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    authorization: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            authorization: authorization.into(),
        }
    }

    /// Join the endpoint and resource path, tolerating slashes on either
    /// side and escaping spaces the service rejects.
    fn target(&self, resource: &str) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let joined = if resource.starts_with('/') {
            format!("{}{}", endpoint, resource)
        } else {
            format!("{}/{}", endpoint, resource)
        };
        joined.replace(' ', "%20")
    }

    fn request(&self, method: reqwest::Method, resource: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.target(resource))
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Accept", "application/json")
            .header("Authorization", &self.authorization)
    }

    async fn execute_text(&self, request: reqwest::RequestBuilder) -> Result<Option<String>> {
        let response = request.send().await?;
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), "response received");
        classify(status.as_u16(), &reason, body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Option<String>> {
        tracing::debug!(%path, "GET");
        self.execute_text(self.request(reqwest::Method::GET, path))
            .await
    }

    async fn post(&self, path: &str, body: &str) -> Result<Option<String>> {
        tracing::debug!(%path, body_len = body.len(), "POST");
        self.execute_text(
            self.request(reqwest::Method::POST, path)
                .body(body.to_string()),
        )
        .await
    }

    async fn delete(&self, path: &str) -> Result<Option<String>> {
        tracing::debug!(%path, "DELETE");
        self.execute_text(self.request(reqwest::Method::DELETE, path))
            .await
    }

    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        tracing::debug!(%path, "GET (bytes)");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 400 && body.contains(NOT_FOUND_MARKER) {
                return Ok(None);
            }
            return Err(CloudError::Api {
                status: status.as_u16(),
                reason,
                message: parse_error_message(&body),
            });
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}
