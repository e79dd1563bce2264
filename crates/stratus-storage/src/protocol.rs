//! Storage-service task plumbing
//!
//! Storage endpoints queue their tasks differently from compute: the task
//! id rides top-level as `QueuedMessageId` instead of in the response
//! headers.

use crate::error::Result;
use stratus_cloud::{storage_task_id, wait_for_task, EngineConfig, Transport};

/// POST a storage call and wait out the task it queued, when it queued one.
///
/// Returns the task result; `Ok(None)` when the response carried no task.
pub(crate) async fn submit_storage<T>(
    transport: &T,
    config: &EngineConfig,
    path: &str,
    body: &str,
) -> Result<Option<String>>
where
    T: Transport + ?Sized,
{
    let response = match transport.post(path, body).await? {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(None),
    };
    match storage_task_id(&response)? {
        Some(task_id) => Ok(wait_for_task(transport, config, &task_id).await?),
        None => {
            tracing::debug!(path, "storage call completed without a task");
            Ok(None)
        }
    }
}
