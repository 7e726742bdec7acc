//! File endpoints over the blob store.
//!
//! Thin adapters: parse query parameters, call [`BlobStore`], shape JSON.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::StorageConfig;
use crate::http::response;
use crate::observability::metrics;
use crate::proxy::filename::encode_header_filename;
use crate::storage::{BlobEntry, BlobStore, StoreError};

/// State shared by the file endpoints.
#[derive(Clone)]
pub struct FilesState {
    pub store: Arc<dyn BlobStore>,
    pub allowed_content_types: Vec<String>,
    pub default_page_size: usize,
}

impl FilesState {
    pub fn new(store: Arc<dyn BlobStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            default_page_size: config.default_page_size,
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        self.allowed_content_types.iter().any(|t| t == content_type)
    }

    /// "PDF" for `application/pdf`, joined for several types.
    fn allowed_label(&self) -> String {
        self.allowed_content_types
            .iter()
            .map(|t| t.rsplit('/').next().unwrap_or(t.as_str()).to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Routes for the file endpoints.
pub fn routes(state: FilesState) -> Router {
    Router::new()
        .route("/api/list", get(list_files))
        .route("/api/upload", post(upload_file))
        .route("/api/delete", delete(delete_file))
        .route("/api/download", get(download_file))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilenameParams {
    filename: Option<String>,
}

impl FilenameParams {
    fn filename(&self) -> Option<&str> {
        self.filename.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    current_page: usize,
    total_pages: usize,
    total_files: usize,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    files: Vec<BlobEntry>,
    pagination: Pagination,
}

/// Positive integer or the default, like a lenient `parseInt(x) || d`.
fn positive_or(value: Option<&str>, default: usize) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

async fn list_files(State(state): State<FilesState>, Query(params): Query<ListParams>) -> Response {
    let page = positive_or(params.page.as_deref(), 1);
    let limit = positive_or(params.limit.as_deref(), state.default_page_size);

    match state.store.list(page, limit).await {
        Ok(listing) => {
            metrics::record_storage_op("list", true);
            let total_pages = listing.total.div_ceil(limit);
            let body = ListResponse {
                files: listing.items,
                pagination: Pagination {
                    current_page: page,
                    total_pages,
                    total_files: listing.total,
                    has_more: page < total_pages,
                },
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(e) => {
            metrics::record_storage_op("list", false);
            tracing::error!(error = %e, "Error listing files");
            response::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Failed to list files", "error": e.to_string() }),
            )
        }
    }
}

async fn upload_file(
    State(state): State<FilesState>,
    Query(params): Query<FilenameParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(filename) = params.filename() else {
        return response::message(StatusCode::BAD_REQUEST, "filename query parameter is required");
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !state.accepts(&content_type) {
        let message = format!("Only {} files are allowed", state.allowed_label());
        return response::message(StatusCode::BAD_REQUEST, &message);
    }
    if body.is_empty() {
        return response::message(StatusCode::BAD_REQUEST, "File body is empty");
    }

    match state.store.save(filename, body, &content_type).await {
        Ok(entry) => {
            metrics::record_storage_op("save", true);
            tracing::info!(filename = %entry.filename, size = entry.size, "File uploaded");
            response::json(
                StatusCode::OK,
                json!({
                    "message": "File uploaded successfully!",
                    "filename": entry.filename,
                    "filepath": entry.url,
                }),
            )
        }
        Err(StoreError::InvalidName(_)) => {
            response::message(StatusCode::BAD_REQUEST, "Invalid filename")
        }
        Err(e) => {
            metrics::record_storage_op("save", false);
            tracing::error!(filename = %filename, error = %e, "Error uploading file");
            response::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Upload failed", "error": e.to_string() }),
            )
        }
    }
}

async fn delete_file(State(state): State<FilesState>, Query(params): Query<FilenameParams>) -> Response {
    let Some(filename) = params.filename() else {
        return response::message(StatusCode::BAD_REQUEST, "Filename parameter is required");
    };

    match state.store.delete(filename).await {
        Ok(()) => {
            metrics::record_storage_op("delete", true);
            tracing::info!(filename = %filename, "File deleted");
            response::message(StatusCode::OK, "File deleted successfully")
        }
        Err(StoreError::NotFound(_)) => response::json(
            StatusCode::NOT_FOUND,
            json!({ "message": "File not found", "filename": filename }),
        ),
        Err(StoreError::InvalidName(_)) => {
            response::message(StatusCode::BAD_REQUEST, "Invalid filename")
        }
        Err(e) => {
            metrics::record_storage_op("delete", false);
            tracing::error!(filename = %filename, error = %e, "Error deleting file");
            response::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "message": "Failed to delete file",
                    "error": e.to_string(),
                    "filename": filename,
                }),
            )
        }
    }
}

async fn download_file(State(state): State<FilesState>, Query(params): Query<FilenameParams>) -> Response {
    let Some(filename) = params.filename() else {
        return response::error(StatusCode::BAD_REQUEST, "Filename is required");
    };

    let object = match state.store.get(filename).await {
        Ok(object) => object,
        Err(StoreError::NotFound(_)) | Err(StoreError::InvalidName(_)) => {
            return response::error(StatusCode::NOT_FOUND, "File not found");
        }
        Err(e) => {
            metrics::record_storage_op("get", false);
            tracing::error!(filename = %filename, error = %e, "Error downloading file");
            return response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to download file");
        }
    };
    metrics::record_storage_op("get", true);

    let name = object.entry.filename;
    let content_type = if name.to_ascii_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    };
    let disposition = format!("attachment; filename*=UTF-8''{}", encode_header_filename(&name));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(object.entry.size));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    (StatusCode::OK, headers, Body::from_stream(object.body)).into_response()
}
