//! Blob object catalog
//!
//! Storage bins are top-level containers; object-level listing goes
//! through the service's search task rather than a plain GET.

use crate::error::{Result, StorageError};
use crate::protocol::submit_storage;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use stratus_cloud::{EngineConfig, Transport};

#[derive(Debug, Clone, Deserialize)]
pub struct StorageBin {
    #[serde(rename = "StorageID")]
    pub storage_id: String,
    #[serde(rename = "CustomerDefinedName")]
    pub name: Option<String>,
    #[serde(rename = "RegionID")]
    pub region_id: Option<String>,
}

/// One object or directory inside a bin, as reported by a search task.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IsDirectory", default)]
    pub is_directory: bool,
    #[serde(rename = "Size")]
    pub size: Option<u64>,
    #[serde(rename = "LastModified")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Catalog operations over storage bins and the objects they hold.
pub struct BlobCatalog<T: Transport> {
    transport: T,
    config: EngineConfig,
}

impl<T: Transport> BlobCatalog<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn list_bins(&self) -> Result<Vec<StorageBin>> {
        match self
            .transport
            .get("/Storage?$filter=IsRemoved eq false")
            .await?
        {
            Some(body) if !body.is_empty() => Ok(serde_json::from_str(&body)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Resolve a bin by display name, case-insensitively.
    pub async fn find_storage(&self, name: &str) -> Result<StorageBin> {
        self.list_bins()
            .await?
            .into_iter()
            .find(|bin| {
                bin.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| StorageError::StorageNotFound(name.to_string()))
    }

    /// Search a bin for objects under `path` matching `pattern`. The
    /// listing is the search task's result payload.
    pub async fn search(
        &self,
        storage_id: &str,
        path: &str,
        pattern: &str,
    ) -> Result<Vec<BlobEntry>> {
        let payload = json!({
            "StorageID": storage_id,
            "Path": path,
            "Pattern": pattern,
        });
        let result = submit_storage(
            &self.transport,
            &self.config,
            "/Storage/StorageSearchFile",
            &payload.to_string(),
        )
        .await?
        .ok_or(StorageError::MissingField("search task result"))?;
        Ok(serde_json::from_str(&result)?)
    }

    pub async fn remove_object(&self, storage_id: &str, file_path: &str) -> Result<()> {
        let payload = json!({
            "StorageID": storage_id,
            "FilePath": file_path,
        });
        submit_storage(
            &self.transport,
            &self.config,
            "/Storage/DeleteFile",
            &payload.to_string(),
        )
        .await?;
        tracing::info!(storage_id, file_path, "object removed");
        Ok(())
    }

    pub async fn rename_bin(&self, storage_id: &str, new_name: &str) -> Result<()> {
        let payload = json!({
            "StorageID": storage_id,
            "CustomerDefinedName": new_name,
        });
        submit_storage(
            &self.transport,
            &self.config,
            "/Storage/RenameStorage",
            &payload.to_string(),
        )
        .await?;
        Ok(())
    }
}
