//! Chunked object transfer
//!
//! One live session per transfer, never reused. Chunks flow sequentially
//! from sequence 0 on a fixed size; there is no parallelism, resumability,
//! or checksumming. Any failure mid-session cancels it best-effort on the
//! server before surfacing.

use crate::error::{Result, StorageError};
use crate::protocol::submit_storage;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use stratus_cloud::{EngineConfig, Transport};
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Deserialize)]
struct FileTransferInfo {
    #[serde(rename = "FileTransferID")]
    transfer_id: Option<String>,
    #[serde(rename = "FileSizeBytes")]
    size_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BeginResponse {
    #[serde(rename = "FileTransfer")]
    file_transfer: Option<FileTransferInfo>,
    #[serde(rename = "FileTransferID")]
    transfer_id: Option<String>,
    #[serde(rename = "QueuedMessageId")]
    queued_message_id: Option<String>,
}

impl BeginResponse {
    fn transfer_id(&self) -> Option<&str> {
        self.file_transfer
            .as_ref()
            .and_then(|f| f.transfer_id.as_deref())
            .or(self.transfer_id.as_deref())
    }

    fn size_bytes(&self) -> Option<u64> {
        self.file_transfer.as_ref().and_then(|f| f.size_bytes)
    }
}

/// Uploads and downloads objects through the file service.
pub struct TransferClient<T: Transport> {
    transport: T,
    config: EngineConfig,
}

impl<T: Transport> TransferClient<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload `declared_size` bytes from `reader` to `file_path` in the
    /// given bin.
    pub async fn upload<R>(
        &self,
        storage_id: &str,
        file_path: &str,
        reader: &mut R,
        declared_size: u64,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let begin = json!({
            "Command": "BeginUpload",
            "StorageID": storage_id,
            "FilePath": file_path,
            "FileSizeBytes": declared_size,
        });
        let body = self
            .transport
            .post("/fileService", &begin.to_string())
            .await?
            .ok_or_else(|| {
                StorageError::TransferFailed(format!("upload session rejected for {file_path}"))
            })?;
        let begin: BeginResponse = serde_json::from_str(&body)?;
        let transfer_id = begin
            .transfer_id()
            .ok_or(StorageError::MissingField("FileTransferID"))?
            .to_string();
        tracing::debug!(%transfer_id, file_path, declared_size, "upload session open");

        if let Err(e) = self.push_and_complete(&transfer_id, reader).await {
            self.cancel(&transfer_id, "CancelUpload").await;
            return Err(StorageError::TransferFailed(format!(
                "upload of {file_path}: {e}"
            )));
        }
        tracing::info!(file_path, declared_size, "upload complete");
        Ok(())
    }

    async fn push_and_complete<R>(&self, transfer_id: &str, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = self.config.chunk_size;
        let mut buf = vec![0u8; chunk_size];
        let mut sequence: u64 = 0;
        loop {
            let n = fill(reader, &mut buf).await?;
            if n == 0 {
                break;
            }
            let payload = json!({
                "Sequence": sequence,
                "Data": BASE64.encode(&buf[..n]),
            });
            self.transport
                .post(&format!("/fileService/{transfer_id}"), &payload.to_string())
                .await?;
            sequence += 1;
            if n < chunk_size {
                break;
            }
        }
        // the completion task confirms server-side assembly
        submit_storage(
            &self.transport,
            &self.config,
            &format!("/fileService/{transfer_id}/CompleteUpload"),
            "",
        )
        .await?;
        Ok(())
    }

    /// Download `file_path` from the given bin. The server-reported size
    /// is authoritative; receiving any other total fails the transfer.
    pub async fn download(&self, storage_id: &str, file_path: &str) -> Result<Vec<u8>> {
        let begin = json!({
            "Command": "BeginDownload",
            "StorageID": storage_id,
            "FilePath": file_path,
        });
        let body = self
            .transport
            .post("/fileService", &begin.to_string())
            .await?
            .ok_or_else(|| StorageError::StorageNotFound(file_path.to_string()))?;
        let begin: BeginResponse = serde_json::from_str(&body)?;
        let transfer_id = begin
            .transfer_id()
            .ok_or(StorageError::MissingField("FileTransferID"))?
            .to_string();
        let expected = begin
            .size_bytes()
            .ok_or(StorageError::MissingField("FileSizeBytes"))?;
        if let Some(task_id) = &begin.queued_message_id {
            // the object is staged server-side before chunks are readable
            stratus_cloud::wait_for_task(&self.transport, &self.config, task_id).await?;
        }
        tracing::debug!(%transfer_id, file_path, expected, "download session open");

        match self.pull_and_complete(&transfer_id, expected).await {
            Ok(data) => {
                tracing::info!(file_path, bytes = data.len(), "download complete");
                Ok(data)
            }
            Err(e) => {
                self.cancel(&transfer_id, "CancelDownload").await;
                Err(StorageError::TransferFailed(format!(
                    "download of {file_path}: {e}"
                )))
            }
        }
    }

    async fn pull_and_complete(&self, transfer_id: &str, expected: u64) -> Result<Vec<u8>> {
        let chunk_size = self.config.chunk_size;
        let mut data = Vec::with_capacity(expected as usize);
        loop {
            let path = format!(
                "/fileService/{transfer_id}?Position={}&ChunkSize={chunk_size}",
                data.len()
            );
            match self.transport.get_bytes(&path).await? {
                Some(chunk) if !chunk.is_empty() => {
                    let short = chunk.len() < chunk_size;
                    data.extend_from_slice(&chunk);
                    if short {
                        break;
                    }
                }
                _ => break,
            }
        }
        if data.len() as u64 != expected {
            return Err(StorageError::TransferFailed(format!(
                "received {} bytes, server reported {expected}",
                data.len()
            )));
        }
        self.transport
            .post(&format!("/fileService/{transfer_id}/CompleteDownload"), "")
            .await?;
        Ok(data)
    }

    /// Best-effort session teardown; failures are logged, not surfaced.
    async fn cancel(&self, transfer_id: &str, verb: &str) {
        let path = format!("/fileService/{transfer_id}/{verb}");
        if let Err(e) = self.transport.post(&path, "").await {
            tracing::warn!(%transfer_id, verb, error = %e, "session cancel failed");
        }
    }
}

/// Read until `buf` is full or the reader hits EOF.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + Send,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
