//! Error taxonomy for the streaming proxy.
//!
//! Errors raised before response headers are committed become JSON bodies.
//! [`RelayError`] is raised after the commit and never becomes a body: it is
//! yielded by the outbound body stream, which makes the server abort the
//! connection instead of finishing the response.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Message returned for every failure detected before streaming starts.
pub const STREAM_FAILED: &str = "Failed to stream the file.";

/// Bad or missing input. No network I/O has been attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("fileUrl is required in the request body")]
    MissingUrl,
    #[error("fileUrl must be an absolute http(s) URL")]
    InvalidUrl,
    #[error("request body is not valid JSON")]
    MalformedBody,
}

/// Failure to obtain a usable upstream response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream connection failed after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream sent no response headers within {after:?} ({attempts} attempt(s))")]
    Timeout { attempts: u32, after: Duration },
    #[error("upstream fetch did not finish within {0:?}")]
    Deadline(Duration),
    #[error("upstream responded with status {status}")]
    Status { status: StatusCode },
    #[error("outbound connection limit reached")]
    Saturated,
}

impl FetchError {
    /// Metric label for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connect { .. } => "connect",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Deadline(_) => "deadline",
            FetchError::Status { .. } => "status",
            FetchError::Saturated => "saturated",
        }
    }
}

/// Errors that can still be reported to the client as JSON.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ProxyError {
    /// Status sent to the client. With `pass_through`, an upstream failure
    /// status is forwarded instead of 500.
    pub fn status(&self, pass_through: bool) -> StatusCode {
        match self {
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Fetch(FetchError::Saturated) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Fetch(FetchError::Status { status }) if pass_through => *status,
            ProxyError::Fetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Upstream details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::Validation(e) => e.to_string(),
            ProxyError::Fetch(_) => STREAM_FAILED.to_string(),
        }
    }

    pub fn into_json_response(self, pass_through: bool) -> Response {
        let status = self.status(pass_through);
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_json_response(false)
    }
}

/// Failure after response headers were committed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream stream failed: {0}")]
    Upstream(#[source] std::io::Error),
    #[error("upstream sent no data for {0:?}")]
    Stalled(Duration),
    #[error("upstream ended after {actual} of {expected} bytes")]
    LengthMismatch { expected: u64, actual: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ProxyError::from(ValidationError::MissingUrl);
        assert_eq!(err.status(false), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "fileUrl is required in the request body");
    }

    #[test]
    fn upstream_status_maps_to_500_unless_passed_through() {
        let err = ProxyError::from(FetchError::Status {
            status: StatusCode::NOT_FOUND,
        });
        assert_eq!(err.status(false), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.status(true), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), STREAM_FAILED);
    }

    #[test]
    fn header_timeout_is_a_plain_500() {
        let err = ProxyError::from(FetchError::Timeout {
            attempts: 3,
            after: Duration::from_secs(8),
        });
        assert_eq!(err.status(true), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), STREAM_FAILED);
    }

    #[test]
    fn saturation_is_service_unavailable() {
        let err = ProxyError::from(FetchError::Saturated);
        assert_eq!(err.status(true), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(FetchError::Saturated.kind(), "saturated");
    }
}
