//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the file relay service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, inbound limits).
    pub listener: ListenerConfig,

    /// Outbound fetch settings for the streaming proxy.
    pub upstream: UpstreamConfig,

    /// Connect-stage retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Blob store settings for the file endpoints.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 1024,
        }
    }
}

/// Outbound request settings used by the upstream fetcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// User-Agent sent to origins. Many origins reject requests without one.
    pub user_agent: String,

    /// Accept header sent to origins.
    pub accept: String,

    /// Additional headers injected into every outbound request.
    pub extra_headers: BTreeMap<String, String>,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for one fetch attempt to receive response headers, connect
    /// included, in seconds.
    pub header_timeout_secs: u64,

    /// Maximum time to wait for the next body chunk before the relay gives up.
    pub idle_timeout_secs: u64,

    /// Maximum concurrent outbound streams across all requests.
    pub max_connections: usize,

    /// Maximum redirects followed per fetch.
    pub max_redirects: usize,

    /// Forward the upstream failure status instead of answering 500.
    pub pass_through_status: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: "Make/production".to_string(),
            accept: "application/json, text/plain, */*".to_string(),
            extra_headers: BTreeMap::new(),
            connect_timeout_secs: 5,
            header_timeout_secs: 8,
            idle_timeout_secs: 60,
            max_connections: 64,
            max_redirects: 10,
            pass_through_status: false,
        }
    }
}

/// Retry configuration. Applies to the connect stage only.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds. Equal to the base for a fixed delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 500,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce response headers, in seconds.
    /// Streaming bodies are not subject to this limit.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Blob store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Mount the list/upload/delete/download endpoints.
    pub enabled: bool,

    /// Directory holding uploaded files.
    pub root: String,

    /// Content types accepted by the upload endpoint.
    pub allowed_content_types: Vec<String>,

    /// Page size used when the client does not send `limit`.
    pub default_page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: "public/uploads".to_string(),
            allowed_content_types: vec!["application/pdf".to_string()],
            default_page_size: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes (bounds uploads).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [upstream]
            user_agent = "relay-test/1.0"

            [upstream.extra_headers]
            "X-Api-Key" = "secret"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.user_agent, "relay-test/1.0");
        assert_eq!(config.upstream.extra_headers.get("X-Api-Key").unwrap(), "secret");
        assert_eq!(config.upstream.max_connections, 64);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.retries.max_attempts, 3);
    }

    #[test]
    fn empty_document_is_default() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert!(config.storage.enabled);
        assert_eq!(config.storage.allowed_content_types, vec!["application/pdf"]);
        assert!(!config.upstream.pass_through_status);
    }
}
