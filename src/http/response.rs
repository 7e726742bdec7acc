//! JSON response helpers for the file endpoints.
//!
//! The file endpoints answer with `{ "message": ... }` bodies while download
//! errors use `{ "error": ... }`; both shapes are kept for client compatibility.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// `{ "message": message }` with the given status.
pub fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// `{ "error": error }` with the given status.
pub fn error(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

/// Arbitrary JSON body with the given status.
pub fn json(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}
