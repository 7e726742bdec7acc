//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeouts, limits)
//! - Build the upstream fetcher and blob store from config
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::files::{self, FilesState};
use crate::http::request::UuidRequestId;
use crate::proxy::fetcher::{FetcherBuildError, UpstreamFetcher};
use crate::proxy::handler::{stream_handler, ProxyState};
use crate::resilience::RetryPolicy;
use crate::storage::{BlobStore, LocalBlobStore, StoreError};

/// Error building or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("upstream client: {0}")]
    Fetcher(#[from] FetcherBuildError),
    #[error("blob store: {0}")]
    Storage(#[from] StoreError),
    #[error("server I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the file relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The blob store is a directory under `storage.root` when storage is
    /// enabled.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let store: Option<Arc<dyn BlobStore>> = if config.storage.enabled {
            Some(Arc::new(LocalBlobStore::open(&config.storage.root)?))
        } else {
            None
        };
        Self::with_store(config, store)
    }

    /// Create a server around an existing blob store.
    pub fn with_store(config: RelayConfig, store: Option<Arc<dyn BlobStore>>) -> Result<Self, ServerError> {
        let retry = RetryPolicy::new(&config.retries);
        let fetcher = UpstreamFetcher::new(&config.upstream, retry)?;
        let proxy_state = Arc::new(ProxyState::new(fetcher, &config));
        let files_state = store.map(|store| FilesState::new(store, &config.storage));

        let router = build_router(&config, proxy_state, files_state);
        Ok(Self { router, config })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            storage = self.config.storage.enabled,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the Axum router with all middleware layers.
///
/// The proxy route enforces its own fetch deadline so that a slow upstream
/// still gets a JSON answer; the generic timeout only guards the file routes.
pub fn build_router(config: &RelayConfig, proxy: Arc<ProxyState>, files: Option<FilesState>) -> Router {
    let mut router = Router::new()
        .route("/api/stream", post(stream_handler))
        .with_state(proxy);

    if let Some(files) = files {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        router = router.merge(
            files::routes(files)
                // Bounds time-to-headers only; downloads stream past it.
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)),
        );
    }

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(middleware::from_fn_with_state(
            Arc::new(Semaphore::new(config.listener.max_connections)),
            limit_in_flight,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// Hold a slot for each in-flight request until its response head is ready.
///
/// Waits when the limit is reached instead of rejecting, so bursts queue up.
async fn limit_in_flight(
    State(slots): State<Arc<Semaphore>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let _permit = match slots.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response(),
    };
    next.run(request).await
}
