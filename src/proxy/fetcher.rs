//! Outbound fetch of the remote file.
//!
//! # Responsibilities
//! - Issue the GET with the configured outbound headers
//! - Retry connect-stage failures per [`RetryPolicy`]
//! - Give each attempt a deadline for the response headers
//! - Reject non-2xx answers without reading their bodies
//! - Bound concurrent outbound streams with a semaphore
//!
//! The returned [`UpstreamResponse`] owns an unread body stream. The semaphore
//! permit travels with that stream and is released when it is dropped, so the
//! bound covers the whole transfer, not just the connect.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH};
use reqwest::{redirect, Client, StatusCode};
use tokio::sync::Semaphore;
use url::Url;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::proxy::error::FetchError;
use crate::resilience::retries::is_retryable;
use crate::resilience::RetryPolicy;

/// Upstream body: a finite, non-restartable sequence of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Error building the outbound client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum FetcherBuildError {
    #[error("invalid outbound header {name}")]
    InvalidHeader { name: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A successful upstream answer whose body has not been consumed.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: ByteStream,
}

impl UpstreamResponse {
    pub fn new<S, E>(status: StatusCode, headers: HeaderMap, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            status,
            headers,
            body: body.map(|chunk| chunk.map_err(io::Error::other)).boxed(),
        }
    }

    /// Declared body length, if the upstream sent a parseable one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Hand the body over to the relay.
    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Fetches remote files for the proxy. Cheap to clone.
#[derive(Clone)]
pub struct UpstreamFetcher {
    client: Client,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    permit_timeout: Duration,
    header_timeout: Duration,
}

impl UpstreamFetcher {
    pub fn new(config: &UpstreamConfig, retry: RetryPolicy) -> Result<Self, FetcherBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&config.accept)
                .map_err(|_| FetcherBuildError::InvalidHeader { name: "accept".into() })?,
        );
        for (name, value) in &config.extra_headers {
            let invalid = || FetcherBuildError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            retry,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            permit_timeout: connect_timeout,
            header_timeout: Duration::from_secs(config.header_timeout_secs),
        })
    }

    /// Outbound stream slots currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Open a streamed GET against `url`.
    pub async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, FetchError> {
        let permit = match tokio::time::timeout(
            self.permit_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                tracing::warn!(url = %url, "No outbound connection slot available");
                return Err(FetchError::Saturated);
            }
        };

        let mut attempts = 0;
        loop {
            attempts += 1;

            let sent = tokio::time::timeout(self.header_timeout, self.client.get(url.clone()).send()).await;
            let failure = match sent {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if !status.is_success() {
                        // Dropping the response discards the body unread.
                        return Err(FetchError::Status { status });
                    }

                    tracing::debug!(
                        url = %url,
                        status = %status,
                        attempt = attempts,
                        "Upstream response received"
                    );

                    let headers = response.headers().clone();
                    let body = response.bytes_stream().map(move |chunk| {
                        let _slot = &permit;
                        chunk
                    });
                    return Ok(UpstreamResponse::new(status, headers, body));
                }
                Ok(Err(e)) if is_retryable(&e) => FetchError::Connect { attempts, source: e },
                Ok(Err(e)) => return Err(FetchError::Connect { attempts, source: e }),
                Err(_) => FetchError::Timeout {
                    attempts,
                    after: self.header_timeout,
                },
            };

            if !self.retry.should_retry(attempts) {
                return Err(failure);
            }

            let delay = self.retry.delay(attempts);
            tracing::warn!(
                url = %url,
                attempt = attempts,
                delay = ?delay,
                error = %failure,
                "Upstream fetch attempt failed, retrying"
            );
            metrics::record_upstream_retry();
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use futures_util::stream;

    #[test]
    fn rejects_invalid_extra_header() {
        let mut config = UpstreamConfig::default();
        config.extra_headers.insert("bad header".into(), "x".into());
        let err = UpstreamFetcher::new(&config, RetryPolicy::none()).err().unwrap();
        assert!(matches!(err, FetcherBuildError::InvalidHeader { name } if name == "bad header"));
    }

    #[test]
    fn permits_follow_config() {
        let mut config = UpstreamConfig::default();
        config.max_connections = 7;
        let fetcher = UpstreamFetcher::new(&config, RetryPolicy::new(&RetryConfig::default())).unwrap();
        assert_eq!(fetcher.available_permits(), 7);
    }

    #[test]
    fn content_length_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        let body = stream::empty::<Result<Bytes, io::Error>>();
        let response = UpstreamResponse::new(StatusCode::OK, headers, body);
        assert_eq!(response.content_length(), Some(1024));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        let body = stream::empty::<Result<Bytes, io::Error>>();
        let response = UpstreamResponse::new(StatusCode::OK, headers, body);
        assert_eq!(response.content_length(), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = UpstreamConfig::default();
        let retry = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 10,
        });
        let fetcher = UpstreamFetcher::new(&config, retry).unwrap();
        let url = Url::parse(&format!("http://{addr}/file.pdf")).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect { attempts: 2, .. }));
        assert_eq!(fetcher.available_permits(), config.max_connections);
    }

    #[tokio::test]
    async fn silent_upstream_times_out_each_attempt() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = UpstreamConfig::default();
        config.header_timeout_secs = 1;
        let retry = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 10,
        });
        let fetcher = UpstreamFetcher::new(&config, retry).unwrap();
        let url = Url::parse(&format!("http://{addr}/slow.pdf")).unwrap();

        let started = std::time::Instant::now();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { attempts: 2, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(fetcher.available_permits(), config.max_connections);
    }
}
