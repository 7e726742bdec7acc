//! `POST /api/stream` endpoint.
//!
//! # State Machine
//! ```text
//! Validating ──400──▶ (json error)
//!     │
//! Fetching ──500/503──▶ (json error)
//!     │
//! Committing (status + headers fixed)
//!     │
//! Relaying ──▶ Done | Aborted (connection cut, no body)
//! ```
//!
//! Nothing is written to the client before Committing, so every earlier
//! failure can still be answered with JSON. After Committing, failures can
//! only be logged and surfaced as an abrupt close.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::Instrument;
use url::Url;

use crate::config::RelayConfig;
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::proxy::error::{FetchError, ProxyError, ValidationError};
use crate::proxy::fetcher::UpstreamFetcher;
use crate::proxy::filename::{encode_header_filename, resolve_filename, DEFAULT_FILENAME};
use crate::proxy::relay::{outbound_channel, FailureStage, RelayOutcome, StreamingRelay};

pub const X_FILENAME: HeaderName = HeaderName::from_static("x-filename");
pub const X_FILESIZE: HeaderName = HeaderName::from_static("x-filesize");

/// Request body of the proxy endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRequest {
    #[serde(rename = "fileUrl", default)]
    pub file_url: Option<String>,
}

/// Per-request phase, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPhase {
    Validating,
    Fetching,
    Committing,
    Relaying,
    Done,
    Aborted,
}

impl fmt::Display for ProxyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyPhase::Validating => "validating",
            ProxyPhase::Fetching => "fetching",
            ProxyPhase::Committing => "committing",
            ProxyPhase::Relaying => "relaying",
            ProxyPhase::Done => "done",
            ProxyPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Shared, read-only state of the proxy endpoint.
#[derive(Clone)]
pub struct ProxyState {
    pub fetcher: UpstreamFetcher,
    /// Whole fetch stage, permit wait and retries included.
    pub fetch_deadline: Duration,
    pub idle_timeout: Duration,
    pub pass_through_status: bool,
}

impl ProxyState {
    pub fn new(fetcher: UpstreamFetcher, config: &RelayConfig) -> Self {
        Self {
            fetcher,
            fetch_deadline: Duration::from_secs(config.timeouts.request_secs),
            idle_timeout: Duration::from_secs(config.upstream.idle_timeout_secs),
            pass_through_status: config.upstream.pass_through_status,
        }
    }
}

/// Check the request and return the target URL. Performs no I/O.
pub fn validate(request: &ProxyRequest) -> Result<Url, ValidationError> {
    let raw = request
        .file_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingUrl)?;

    let url = Url::parse(raw).map_err(|_| ValidationError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::InvalidUrl);
    }
    Ok(url)
}

fn reject(rejection: &JsonRejection) -> ValidationError {
    match rejection {
        // Mirrors a form post with no JSON at all: there is no fileUrl.
        JsonRejection::MissingJsonContentType(_) => ValidationError::MissingUrl,
        _ => ValidationError::MalformedBody,
    }
}

pub async fn stream_handler(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = request_id(&headers);

    let url = match payload
        .map_err(|rejection| reject(&rejection))
        .and_then(|Json(request)| validate(&request))
    {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                phase = %ProxyPhase::Validating,
                error = %e,
                "Rejected stream request"
            );
            metrics::record_stream_outcome("rejected", 0, started);
            return ProxyError::from(e).into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        phase = %ProxyPhase::Fetching,
        url = %url,
        "Fetching upstream file"
    );

    let fetched = tokio::time::timeout(state.fetch_deadline, state.fetcher.fetch(&url))
        .await
        .unwrap_or_else(|_| Err(FetchError::Deadline(state.fetch_deadline)));

    let upstream = match fetched {
        Ok(upstream) => upstream,
        Err(e) => {
            let stage = match e {
                FetchError::Status { .. } => FailureStage::Headers,
                _ => FailureStage::Connect,
            };
            tracing::error!(
                request_id = %request_id,
                phase = %ProxyPhase::Fetching,
                url = %url,
                stage = stage.as_str(),
                error = %e,
                "Upstream fetch failed"
            );
            metrics::record_upstream_failure(e.kind());
            metrics::record_stream_outcome(stage.as_str(), 0, started);
            return ProxyError::from(e).into_json_response(state.pass_through_status);
        }
    };

    let filename = resolve_filename(&upstream.headers, url.as_str());
    let content_length = upstream.content_length();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    response_headers.insert(
        X_FILENAME,
        HeaderValue::from_str(&encode_header_filename(&filename.name))
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FILENAME)),
    );
    response_headers.insert(X_FILESIZE, HeaderValue::from(content_length.unwrap_or(0)));
    if let Some(len) = content_length {
        response_headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }

    tracing::info!(
        request_id = %request_id,
        phase = %ProxyPhase::Committing,
        filename = %filename.name,
        filename_source = filename.source.as_str(),
        content_length = ?content_length,
        "Streaming upstream file"
    );

    let (sink, body) = outbound_channel();
    let relay = StreamingRelay::new(state.idle_timeout, content_length);
    let span = tracing::info_span!("relay", request_id = %request_id, phase = %ProxyPhase::Relaying);

    tokio::spawn(
        async move {
            metrics::stream_started();
            let outcome = relay.run(upstream.into_body(), sink).await;
            metrics::stream_finished();
            log_outcome(&outcome, started);
        }
        .instrument(span),
    );

    (StatusCode::OK, response_headers, body).into_response()
}

fn log_outcome(outcome: &RelayOutcome, started: Instant) {
    if outcome.completed {
        tracing::info!(
            phase = %ProxyPhase::Done,
            bytes = outcome.bytes_transferred,
            elapsed = ?started.elapsed(),
            "Stream finished"
        );
        metrics::record_stream_outcome("completed", outcome.bytes_transferred, started);
    } else {
        tracing::warn!(
            phase = %ProxyPhase::Aborted,
            bytes = outcome.bytes_transferred,
            stage = outcome.failure_stage.as_str(),
            elapsed = ?started.elapsed(),
            "Stream aborted"
        );
        metrics::record_stream_outcome(outcome.failure_stage.as_str(), outcome.bytes_transferred, started);
    }
}
