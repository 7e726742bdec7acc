//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot work
//! (unparseable addresses, zero limits, header names reqwest would reject).
//! All problems are collected so an operator can fix a file in one pass.

use std::fmt;
use std::net::SocketAddr;

use reqwest::header::{HeaderName, HeaderValue};

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration, returning every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    let upstream = &config.upstream;
    if upstream.max_connections == 0 {
        errors.push(ValidationError::new("upstream.max_connections", "must be greater than 0"));
    }
    if upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be greater than 0"));
    }
    if upstream.header_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.header_timeout_secs", "must be greater than 0"));
    }
    if upstream.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.idle_timeout_secs", "must be greater than 0"));
    }
    if HeaderValue::from_str(&upstream.user_agent).is_err() {
        errors.push(ValidationError::new("upstream.user_agent", "not a valid header value"));
    }
    if HeaderValue::from_str(&upstream.accept).is_err() {
        errors.push(ValidationError::new("upstream.accept", "not a valid header value"));
    }
    for (name, value) in &upstream.extra_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("upstream.extra_headers.{name}"),
                "not a valid header name",
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("upstream.extra_headers.{name}"),
                "not a valid header value",
            ));
        }
    }

    if config.retries.enabled {
        if config.retries.max_attempts == 0 {
            errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
        }
        if config.retries.base_delay_ms > config.retries.max_delay_ms {
            errors.push(ValidationError::new(
                "retries.base_delay_ms",
                "must not exceed retries.max_delay_ms",
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    } else if upstream.header_timeout_secs > 0 {
        let budget_ms = fetch_budget_ms(config);
        let deadline_ms = config.timeouts.request_secs.saturating_mul(1000);
        if budget_ms > deadline_ms {
            errors.push(ValidationError::new(
                "retries.max_attempts",
                format!(
                    "worst-case fetch time {budget_ms}ms exceeds timeouts.request_secs ({deadline_ms}ms)"
                ),
            ));
        }
    }

    if config.storage.enabled {
        if config.storage.root.trim().is_empty() {
            errors.push(ValidationError::new("storage.root", "must not be empty"));
        }
        if config.storage.default_page_size == 0 {
            errors.push(ValidationError::new("storage.default_page_size", "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Worst case for every fetch attempt timing out, delays and jitter included.
pub fn fetch_budget_ms(config: &RelayConfig) -> u64 {
    let attempts = if config.retries.enabled {
        u64::from(config.retries.max_attempts.max(1))
    } else {
        1
    };
    let per_attempt = config.upstream.header_timeout_secs.saturating_mul(1000);
    let delay = config.retries.max_delay_ms.saturating_add(config.retries.max_delay_ms / 10);
    attempts
        .saturating_mul(per_attempt)
        .saturating_add((attempts - 1).saturating_mul(delay))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.max_connections = 0;
        config.upstream.extra_headers.insert("bad header".into(), "ok".into());
        config.retries.base_delay_ms = 1000;
        config.retries.max_delay_ms = 10;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.max_connections",
                "upstream.extra_headers.bad header",
                "retries.base_delay_ms",
            ]
        );
    }

    #[test]
    fn default_retry_budget_fits_request_deadline() {
        let config = RelayConfig::default();
        assert!(fetch_budget_ms(&config) <= config.timeouts.request_secs * 1000);
    }

    #[test]
    fn retry_budget_beyond_request_deadline_is_rejected() {
        let mut config = RelayConfig::default();
        config.upstream.header_timeout_secs = 10;
        config.timeouts.request_secs = 30;

        // 3 x 10s plus two delays of up to 550ms
        assert_eq!(fetch_budget_ms(&config), 31_100);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retries.max_attempts");

        config.retries.enabled = false;
        assert_eq!(fetch_budget_ms(&config), 10_000);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn disabled_sections_are_not_checked() {
        let mut config = RelayConfig::default();
        config.retries.enabled = false;
        config.retries.max_attempts = 0;
        config.storage.enabled = false;
        config.storage.root = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
