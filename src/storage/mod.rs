//! Blob store collaborator.
//!
//! # Responsibilities
//! - Define the persistence contract used by the file endpoints
//! - Provide a local-directory implementation
//!
//! The streaming proxy never touches this module; list/upload/delete/download
//! are thin adapters in `http::files`.

pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

pub use local::LocalBlobStore;

/// Errors raised by a blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob name: {0:?}")]
    InvalidName(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listing entry for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobEntry {
    pub filename: String,
    /// Where clients can fetch the blob.
    pub url: String,
    pub size: u64,
}

/// One page of a listing plus the total number of blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPage {
    pub items: Vec<BlobEntry>,
    pub total: usize,
}

/// A blob opened for reading.
pub struct BlobObject {
    pub entry: BlobEntry,
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any existing blob.
    async fn save(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<BlobEntry, StoreError>;

    /// List blobs by name. `page` is 1-based.
    async fn list(&self, page: usize, limit: usize) -> Result<BlobPage, StoreError>;

    async fn get(&self, name: &str) -> Result<BlobObject, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize_blob_name(name: &str) -> Result<String, StoreError> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned = last.trim();
    if cleaned.is_empty()
        || cleaned == "."
        || cleaned == ".."
        || cleaned.starts_with('.')
        || cleaned.chars().any(char::is_control)
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_basename() {
        assert_eq!(sanitize_blob_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_blob_name("../../etc/report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_blob_name("C:\\tmp\\a b.pdf").unwrap(), "a b.pdf");
    }

    #[test]
    fn sanitize_rejects_unusable_names() {
        for name in ["", "  ", "..", "dir/", ".hidden", "bad\nname.pdf"] {
            assert!(
                matches!(sanitize_blob_name(name), Err(StoreError::InvalidName(_))),
                "name: {name:?}"
            );
        }
    }
}
