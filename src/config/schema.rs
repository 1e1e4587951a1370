//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream origin every admitted request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Admission control policy.
    pub rate_limit: RateLimitConfig,

    /// Shared counter store connection.
    pub store: StoreConfig,

    /// Inbound request deadlines.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7654").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7654".to_string(),
        }
    }
}

/// Upstream origin and outbound client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origin URL (scheme, authority, optional base path).
    pub origin: String,

    /// Time allowed until the upstream response head arrives, in seconds.
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle pooled connections kept per upstream host.
    pub max_idle_per_host: usize,

    /// Maximum concurrent upstream exchanges.
    pub max_in_flight: usize,

    /// Callers allowed to wait for an in-flight slot before failing fast.
    pub queue_depth: usize,

    /// How long a queued caller waits for a slot, in milliseconds.
    pub queue_timeout_ms: u64,

    /// Append the client address to `X-Forwarded-For`.
    pub add_forwarded_for: bool,

    /// Single bounded retry on connection failures.
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
            max_idle_per_host: 64,
            max_in_flight: 512,
            queue_depth: 1024,
            queue_timeout_ms: 1000,
            add_forwarded_for: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable the single retry.
    pub enabled: bool,

    /// Base delay before the retry in milliseconds (jitter is added).
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backoff_ms: 100,
        }
    }
}

/// Behavior when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Admit every request while the store is down.
    #[default]
    Open,
    /// Reject every request while the store is down.
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per identity per window.
    pub max_requests: u64,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Store outage behavior.
    pub failure_mode: FailureMode,

    /// Header carrying the client identity (first comma-separated entry).
    /// The peer address is used when unset or when the header is missing.
    pub identity_header: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
            failure_mode: FailureMode::Open,
            identity_header: None,
        }
    }
}

/// Counter store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Shared Redis instance.
    #[default]
    Redis,
    /// Process-local map; counts are not shared between instances.
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Store address as "host:port".
    pub address: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Database index.
    pub database: i64,

    /// Prefix prepended to every counter key.
    pub key_prefix: String,

    /// Deadline for a single store round-trip in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            address: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            database: 0,
            key_prefix: "limit:".to_string(),
            timeout_ms: 250,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for an inbound request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

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
