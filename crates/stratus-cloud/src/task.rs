//! Server-side job tracking
//!
//! Every mutating call on this cloud is queued as a task the client must
//! poll to a terminal state. The task status lives at `/TaskInfo/{id}`:
//! `State` 4 is success, 1 is failure, anything else is still pending.

use crate::config::{EngineConfig, NotFoundPolicy};
use crate::error::{CloudError, Result};
use crate::transport::Transport;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::time::sleep;

const STATE_FAILED: i32 = 1;
const STATE_SUCCEEDED: i32 = 4;

/// Task status payload as reported by the service.
#[derive(Debug, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "State")]
    pub state: i32,
    #[serde(rename = "Result")]
    pub result: Option<String>,
    #[serde(rename = "Errors", default)]
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "Headers")]
    headers: Option<SubmitHeaders>,
}

#[derive(Debug, Deserialize)]
struct SubmitHeaders {
    #[serde(rename = "MessageId")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageSubmitResponse {
    #[serde(rename = "QueuedMessageId")]
    queued_message_id: Option<String>,
}

/// Task id carried in a mutating call's response headers.
pub fn task_id_from_response(body: &str) -> Result<Option<String>> {
    let response: SubmitResponse = serde_json::from_str(body)?;
    Ok(response.headers.and_then(|h| h.message_id))
}

/// Task id carried by storage-service responses.
pub fn storage_task_id(body: &str) -> Result<Option<String>> {
    let response: StorageSubmitResponse = serde_json::from_str(body)?;
    Ok(response.queued_message_id)
}

/// Turn a failed task's error map into the engine error taxonomy.
///
/// A key containing "not found" is the service's way of reporting a
/// missing business object; everything else surfaces whole.
fn terminal_error(errors: &BTreeMap<String, String>) -> CloudError {
    for (key, value) in errors {
        if key.contains("not found") {
            return CloudError::NotFound(format!("{key}: {value}"));
        }
    }
    match serde_json::to_string(errors) {
        Ok(blob) => CloudError::Task(blob),
        Err(e) => CloudError::Task(e.to_string()),
    }
}

/// Poll a task until it reaches a terminal state, returning its result.
///
/// Polls on the fixed `poll_interval` with no overall deadline: a job the
/// service keeps reporting as pending keeps this future alive, which is an
/// accepted liveness risk for genuinely long server-side jobs. A task id
/// that stops resolving is handled per [`NotFoundPolicy`]; `Ok(None)` means
/// the task vanished without a terminal state.
pub async fn wait_for_task<T>(
    transport: &T,
    config: &EngineConfig,
    task_id: &str,
) -> Result<Option<String>>
where
    T: Transport + ?Sized,
{
    let mut missing_polls: u32 = 0;
    loop {
        sleep(config.poll_interval).await;
        let body = transport.get(&format!("/TaskInfo/{task_id}")).await?;
        let body = match body {
            Some(b) if !b.is_empty() => b,
            _ => match config.not_found_policy {
                NotFoundPolicy::ReturnImmediately => {
                    tracing::warn!(%task_id, "task not found, giving up");
                    return Ok(None);
                }
                NotFoundPolicy::RetryThenGiveUp { attempts } => {
                    if missing_polls >= attempts {
                        tracing::warn!(%task_id, attempts, "task never resolved, giving up");
                        return Ok(None);
                    }
                    missing_polls += 1;
                    tracing::debug!(%task_id, missing_polls, "task not found yet, retrying");
                    continue;
                }
            },
        };
        missing_polls = 0;

        let status: TaskStatus = serde_json::from_str(&body)?;
        match status.state {
            STATE_SUCCEEDED => return Ok(Some(status.result.unwrap_or_default())),
            STATE_FAILED => {
                let err = terminal_error(&status.errors);
                tracing::error!(%task_id, error = %err, "task failed");
                return Err(err);
            }
            other => {
                tracing::debug!(%task_id, state = other, "task still pending");
            }
        }
    }
}

/// POST a mutating call and wait out the task it queued.
///
/// Returns the task result, or `None` when the call succeeded without
/// reporting a task (the service does this for some no-op mutations).
pub async fn submit_and_wait<T>(
    transport: &T,
    config: &EngineConfig,
    path: &str,
    body: &str,
) -> Result<Option<String>>
where
    T: Transport + ?Sized,
{
    let response = transport.post(path, body).await?;
    let response = match response {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(None),
    };
    match task_id_from_response(&response)? {
        Some(task_id) => wait_for_task(transport, config, &task_id).await,
        None => Ok(None),
    }
}
