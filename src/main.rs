//! File relay service.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     FILE RELAY                        │
//!                     │                                                       │
//!   POST /api/stream  │  ┌─────────┐   ┌──────────┐   ┌──────────────┐       │
//!   ──────────────────┼─▶│  http   │──▶│  proxy   │──▶│   fetcher    │───────┼──▶ Upstream
//!                     │  │ server  │   │ handler  │   │ retry/bound  │       │    origin
//!                     │  └─────────┘   └────┬─────┘   └──────┬───────┘       │
//!                     │                     │ filename       │ body stream   │
//!   200 + bytes       │                ┌────▼─────┐          │               │
//!   ◀─────────────────┼────────────────│  relay   │◀─────────┘               │
//!                     │                └──────────┘                          │
//!                     │                                                       │
//!   /api/list|upload  │  ┌──────────┐   ┌────────────────────┐              │
//!   /delete|download  ├─▶│  files   │──▶│ storage (BlobStore) │              │
//!                     │  └──────────┘   └────────────────────┘              │
//!                     │                                                       │
//!                     │   config · observability · resilience · lifecycle     │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use file_relay::config::validation::validate_config;
use file_relay::config::{load_config, ConfigError, RelayConfig};
use file_relay::lifecycle::signals::spawn_signal_handler;
use file_relay::observability::{logging, metrics};
use file_relay::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "file-relay")]
#[command(about = "Stores PDF files and streams remote files to clients", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability)?;
    tracing::info!("file-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        user_agent = %config.upstream.user_agent,
        max_upstream_connections = config.upstream.max_connections,
        retry_attempts = config.retries.max_attempts,
        storage_root = %config.storage.root,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
