use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{content_hash, object_path, parse_storage_ref, storage_ref_for};
use crate::app::ports::PhotoStore;
use crate::error::{AppError, Result};

/// Stores binaries under `<root>/sha256/ab/cd/<hex>`.
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PhotoStore for FsPhotoStore {
    async fn put(&self, bytes: &[u8], _content_type: &str) -> Result<String> {
        let hex = content_hash(bytes);
        let path = self.root.join(object_path(&hex));
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, bytes).await?;
            debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        Ok(storage_ref_for(&hex))
    }

    async fn get(&self, storage_ref: &str) -> Result<Vec<u8>> {
        let hex = parse_storage_ref(storage_ref)?;
        let path = self.root.join(object_path(hex));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("photo binary", storage_ref))
            }
            Err(e) => Err(e.into()),
        }
    }
}
