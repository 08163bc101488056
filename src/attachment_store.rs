// src/attachment_store.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::error::ExternalSyncError;

/// Public prefix under which stored files are addressed.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub stored_name: String,
    pub path: String,
    pub size: u64,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
    ) -> Result<StoredFile, ExternalSyncError>;

    async fn delete(&self, path: &str) -> Result<(), ExternalSyncError>;
}

/// Keeps uploads as plain files in one directory.
pub struct DiskAttachmentStore {
    root: PathBuf,
}

impl DiskAttachmentStore {
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Attachment store at {}", root.display());
        Ok(DiskAttachmentStore { root })
    }

    /// Only the final path component is used, so stored paths cannot
    /// escape the upload directory.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        Path::new(path)
            .file_name()
            .map(|name| self.root.join(name))
    }
}

fn stored_name_for(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}-{}{}", Utc::now().timestamp_millis(), Uuid::new_v4().simple(), ext)
}

#[async_trait]
impl AttachmentStore for DiskAttachmentStore {
    async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
    ) -> Result<StoredFile, ExternalSyncError> {
        let stored_name = stored_name_for(original_name);
        tokio::fs::write(self.root.join(&stored_name), bytes).await?;
        debug!(
            "Stored '{}' ({}, {} bytes) as {}",
            original_name,
            mime_type,
            bytes.len(),
            stored_name
        );
        Ok(StoredFile {
            path: format!("{}/{}", PUBLIC_PREFIX, stored_name),
            stored_name,
            size: bytes.len() as u64,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ExternalSyncError> {
        let Some(file) = self.resolve(path) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Attachment {} already gone", file.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
