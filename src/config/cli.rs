//! Command-line and environment overrides.
//!
//! Every flag can also be set through its `LIMIT_GATEWAY_*` environment
//! variable. Values given here win over the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{FailureMode, GatewayConfig, LogFormat, StoreBackend};

#[derive(Debug, Parser)]
#[command(name = "limit-gateway")]
#[command(about = "Rate-limiting reverse proxy for a single upstream origin", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "LIMIT_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:7654.
    #[arg(long, env = "LIMIT_GATEWAY_LISTEN")]
    pub listen: Option<String>,

    /// Upstream origin URL.
    #[arg(long, env = "LIMIT_GATEWAY_UPSTREAM")]
    pub upstream: Option<String>,

    /// Upstream response timeout in seconds.
    #[arg(long, env = "LIMIT_GATEWAY_UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: Option<u64>,

    /// Counter store backend.
    #[arg(long, value_enum, env = "LIMIT_GATEWAY_STORE_BACKEND")]
    pub store_backend: Option<StoreBackendArg>,

    /// Counter store address as host:port.
    #[arg(long, env = "LIMIT_GATEWAY_STORE_ADDR")]
    pub store_addr: Option<String>,

    #[arg(long, env = "LIMIT_GATEWAY_STORE_USERNAME")]
    pub store_username: Option<String>,

    #[arg(long, env = "LIMIT_GATEWAY_STORE_PASSWORD", hide_env_values = true)]
    pub store_password: Option<String>,

    /// Requests admitted per identity per window.
    #[arg(long, env = "LIMIT_GATEWAY_MAX_REQUESTS")]
    pub max_requests: Option<u64>,

    /// Window length in seconds.
    #[arg(long, env = "LIMIT_GATEWAY_WINDOW_SECS")]
    pub window_secs: Option<u64>,

    /// Reject traffic while the counter store is unreachable.
    #[arg(long, env = "LIMIT_GATEWAY_FAIL_CLOSED")]
    pub fail_closed: bool,

    /// Header to read the client identity from.
    #[arg(long, env = "LIMIT_GATEWAY_IDENTITY_HEADER")]
    pub identity_header: Option<String>,

    #[arg(long, env = "LIMIT_GATEWAY_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "LIMIT_GATEWAY_LOG_FORMAT")]
    pub log_format: Option<LogFormatArg>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StoreBackendArg {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl Cli {
    /// Apply the given overrides on top of `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.origin = upstream.clone();
        }
        if let Some(secs) = self.upstream_timeout_secs {
            config.upstream.timeout_secs = secs;
        }
        if let Some(backend) = self.store_backend {
            config.store.backend = match backend {
                StoreBackendArg::Redis => StoreBackend::Redis,
                StoreBackendArg::Memory => StoreBackend::Memory,
            };
        }
        if let Some(addr) = &self.store_addr {
            config.store.address = addr.clone();
        }
        if let Some(username) = &self.store_username {
            config.store.username = Some(username.clone());
        }
        if let Some(password) = &self.store_password {
            config.store.password = Some(password.clone());
        }
        if let Some(max) = self.max_requests {
            config.rate_limit.max_requests = max;
        }
        if let Some(window) = self.window_secs {
            config.rate_limit.window_secs = window;
        }
        if self.fail_closed {
            config.rate_limit.failure_mode = FailureMode::Closed;
        }
        if let Some(header) = &self.identity_header {
            config.rate_limit.identity_header = Some(header.clone());
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = match format {
                LogFormatArg::Pretty => LogFormat::Pretty,
                LogFormatArg::Json => LogFormat::Json,
            };
        }
    }
}
