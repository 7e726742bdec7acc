//! Chunked relay from the upstream body to the client response.
//!
//! # Data Flow
//! ```text
//! upstream ByteStream ──next()──▶ StreamingRelay ──send()──▶ mpsc(1) ──▶ axum Body ──▶ client
//! ```
//!
//! The outbound side is a channel with room for a single chunk. `send()` only
//! completes once hyper has pulled the previous chunk, so a slow client stops
//! the relay from reading upstream and memory stays bounded to one chunk in
//! flight plus the one being written.
//!
//! Ending the channel cleanly finalizes the body. Pushing an `Err` into it
//! makes hyper abort the connection without a terminating chunk, which is the
//! only honest signal once the status line has been sent.

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::proxy::error::RelayError;

/// Sending half of the outbound body.
pub type BodySender = mpsc::Sender<Result<Bytes, RelayError>>;

/// Create the outbound body and the sender that feeds it.
pub fn outbound_channel() -> (BodySender, Body) {
    let (tx, rx) = mpsc::channel(1);
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (tx, Body::from_stream(body))
}

/// Stage at which a proxied transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    None,
    /// Upstream could not be reached.
    Connect,
    /// Upstream answered with a failure status.
    Headers,
    /// Upstream failed after headers were committed downstream.
    MidStream,
    /// The client went away during the transfer.
    Downstream,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::None => "none",
            FailureStage::Connect => "connect",
            FailureStage::Headers => "headers",
            FailureStage::MidStream => "mid_stream",
            FailureStage::Downstream => "downstream",
        }
    }
}

/// Result of one relay, used for logging and metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Bytes accepted by the outbound channel.
    pub bytes_transferred: u64,
    pub completed: bool,
    pub failure_stage: FailureStage,
}

impl RelayOutcome {
    fn completed(bytes_transferred: u64) -> Self {
        Self {
            bytes_transferred,
            completed: true,
            failure_stage: FailureStage::None,
        }
    }

    pub fn failed(bytes_transferred: u64, failure_stage: FailureStage) -> Self {
        Self {
            bytes_transferred,
            completed: false,
            failure_stage,
        }
    }
}

/// Copies one upstream body to one outbound channel.
#[derive(Debug, Clone)]
pub struct StreamingRelay {
    idle_timeout: Duration,
    expected_len: Option<u64>,
}

impl StreamingRelay {
    pub fn new(idle_timeout: Duration, expected_len: Option<u64>) -> Self {
        Self {
            idle_timeout,
            expected_len,
        }
    }

    /// Copy until the upstream ends, fails, stalls, or the client leaves.
    ///
    /// Response status and headers must already be committed by the caller.
    pub async fn run<S>(&self, mut upstream: S, sink: BodySender) -> RelayOutcome
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
    {
        let mut bytes: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => {
                    tracing::debug!(bytes, "Client disconnected, dropping upstream");
                    return RelayOutcome::failed(bytes, FailureStage::Downstream);
                }
                next = tokio::time::timeout(self.idle_timeout, upstream.next()) => next,
            };

            match next {
                Ok(Some(Ok(chunk))) => {
                    let len = chunk.len() as u64;
                    if sink.send(Ok(chunk)).await.is_err() {
                        tracing::debug!(bytes, "Client disconnected, dropping upstream");
                        return RelayOutcome::failed(bytes, FailureStage::Downstream);
                    }
                    bytes += len;
                }
                Ok(Some(Err(e))) => {
                    return self.abort(&sink, bytes, RelayError::Upstream(e)).await;
                }
                Ok(None) => {
                    if let Some(expected) = self.expected_len {
                        if expected != bytes {
                            let error = RelayError::LengthMismatch {
                                expected,
                                actual: bytes,
                            };
                            return self.abort(&sink, bytes, error).await;
                        }
                    }
                    return RelayOutcome::completed(bytes);
                }
                Err(_) => {
                    let error = RelayError::Stalled(self.idle_timeout);
                    return self.abort(&sink, bytes, error).await;
                }
            }
        }
    }

    async fn abort(&self, sink: &BodySender, bytes: u64, error: RelayError) -> RelayOutcome {
        tracing::warn!(bytes, error = %error, "Upstream failed mid-stream, aborting response");
        // Err if the client is already gone; the connection is closing either way.
        let _ = sink.send(Err(error)).await;
        RelayOutcome::failed(bytes, FailureStage::MidStream)
    }
}
