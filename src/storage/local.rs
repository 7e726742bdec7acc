//! Blob store over a local directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::storage::{sanitize_blob_name, BlobEntry, BlobObject, BlobPage, BlobStore, StoreError};

/// Stores each blob as a file named after it. Names starting with `.` are
/// reserved for in-progress writes and never listed.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), "Blob store ready");
        Ok(Self {
            root,
            public_prefix: "/uploads".to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, name: String, size: u64) -> BlobEntry {
        BlobEntry {
            url: format!("{}/{}", self.public_prefix, name),
            filename: name,
            size,
        }
    }

    fn not_found(name: &str, error: std::io::Error) -> StoreError {
        if error.kind() == ErrorKind::NotFound {
            StoreError::NotFound(name.to_string())
        } else {
            StoreError::Io(error)
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<BlobEntry, StoreError> {
        let name = sanitize_blob_name(name)?;
        let path = self.root.join(&name);
        // Unique per save so concurrent uploads of one name never share a file.
        let partial = self.root.join(format!(".{name}.{}.part", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&partial).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&partial, &path).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::debug!(filename = %name, size = bytes.len(), content_type, "Blob saved");
        Ok(self.entry(name, bytes.len() as u64))
    }

    async fn list(&self, page: usize, limit: usize) -> Result<BlobPage, StoreError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = item.metadata().await?;
            if metadata.is_file() {
                entries.push(self.entry(name, metadata.len()));
            }
        }
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));

        let total = entries.len();
        let start = page.saturating_sub(1).saturating_mul(limit);
        let items = entries.into_iter().skip(start).take(limit).collect();
        Ok(BlobPage { items, total })
    }

    async fn get(&self, name: &str) -> Result<BlobObject, StoreError> {
        let name = sanitize_blob_name(name)?;
        let path = self.root.join(&name);
        let file = fs::File::open(&path).await.map_err(|e| Self::not_found(&name, e))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(name));
        }
        Ok(BlobObject {
            entry: self.entry(name, metadata.len()),
            body: ReaderStream::new(file).boxed(),
        })
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let name = sanitize_blob_name(name)?;
        fs::remove_file(self.root.join(&name))
            .await
            .map_err(|e| Self::not_found(&name, e))?;
        tracing::debug!(filename = %name, "Blob deleted");
        Ok(())
    }
}
