//! Scriptable in-memory transport for tests
//!
//! Enabled with the `mock` feature so downstream crates can drive the
//! engine against canned wire exchanges without a live endpoint.

use crate::error::{CloudError, Result};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One canned response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 2xx with this body.
    Body(String),
    /// The clean "no such resource" signal.
    Missing,
    /// A structured API error.
    Error {
        status: u16,
        reason: String,
        message: String,
    },
}

impl MockResponse {
    pub fn body(s: impl Into<String>) -> Self {
        MockResponse::Body(s.into())
    }
}

/// A request the mock observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    pub method: &'static str,
    pub path: String,
    pub body: String,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, VecDeque<MockResponse>>,
    bytes: HashMap<String, VecDeque<Vec<u8>>>,
    requests: Vec<MockRequest>,
}

/// Transport that replays scripted responses keyed by `METHOD path`.
///
/// Responses queue in order; the last one for a key is sticky, so a single
/// scripted status can answer a polling loop indefinitely.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(method: &str, path: &str) -> String {
        format!("{method} {path}")
    }

    pub fn on(&self, method: &'static str, path: &str, response: MockResponse) {
        let mut script = self.script.lock().unwrap();
        script
            .responses
            .entry(Self::key(method, path))
            .or_default()
            .push_back(response);
    }

    pub fn on_get(&self, path: &str, response: MockResponse) {
        self.on("GET", path, response);
    }

    pub fn on_post(&self, path: &str, response: MockResponse) {
        self.on("POST", path, response);
    }

    pub fn on_delete(&self, path: &str, response: MockResponse) {
        self.on("DELETE", path, response);
    }

    pub fn on_get_bytes(&self, path: &str, bytes: Vec<u8>) {
        let mut script = self.script.lock().unwrap();
        script
            .bytes
            .entry(Self::key("GET", path))
            .or_default()
            .push_back(bytes);
    }

    /// All requests observed, in order.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    /// How many times `METHOD path` was hit.
    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn respond(&self, method: &'static str, path: &str, body: String) -> Result<Option<String>> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(MockRequest {
            method,
            path: path.to_string(),
            body,
        });
        let queue = script
            .responses
            .get_mut(&Self::key(method, path))
            .unwrap_or_else(|| panic!("unscripted request: {method} {path}"));
        let response = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("script queue drained")
        };
        match response {
            MockResponse::Body(b) => Ok(Some(b)),
            MockResponse::Missing => Ok(None),
            MockResponse::Error {
                status,
                reason,
                message,
            } => Err(CloudError::Api {
                status,
                reason,
                message,
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<Option<String>> {
        self.respond("GET", path, String::new())
    }

    async fn post(&self, path: &str, body: &str) -> Result<Option<String>> {
        self.respond("POST", path, body.to_string())
    }

    async fn delete(&self, path: &str) -> Result<Option<String>> {
        self.respond("DELETE", path, String::new())
    }

    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(MockRequest {
            method: "GET",
            path: path.to_string(),
            body: String::new(),
        });
        let queue = script
            .bytes
            .get_mut(&Self::key("GET", path))
            .unwrap_or_else(|| panic!("unscripted byte request: GET {path}"));
        let bytes = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("byte script drained")
        };
        Ok(Some(bytes))
    }
}
