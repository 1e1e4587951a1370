//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the counter store, rate limiter and forwarder in dependency order
//! - Verify the store when the failure mode requires it
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Fail-closed gateways refuse to start without a reachable store;
//!   fail-open gateways start anyway and log the outage

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::config::{FailureMode, GatewayConfig, StoreBackend, StoreConfig};
use crate::http::forwarder::{ForwardError, Forwarder};
use crate::http::server::AppState;
use crate::security::{IdentityExtractor, RateLimitPolicy, RateLimiter};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore, RedisStoreConfig, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid rate limit policy: {0}")]
    Policy(#[from] ValidationError),

    #[error("counter store: {0}")]
    Store(#[from] StoreError),

    #[error("upstream: {0}")]
    Upstream(#[from] ForwardError),

    #[error("invalid identity header name: {0}")]
    IdentityHeader(String),
}

/// How often the in-memory store drops expired windows.
const MEMORY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Construct the configured counter store. No network traffic yet.
///
/// Must run inside the runtime: the memory backend spawns its purge task.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    Ok(match config.backend {
        StoreBackend::Redis => Arc::new(RedisCounterStore::new(RedisStoreConfig::from(config))?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory counter store; limits are per instance");
            let store = Arc::new(MemoryCounterStore::new());
            store.spawn_purger(MEMORY_PURGE_INTERVAL);
            store
        }
    })
}

/// Build all request-path handles from a validated config.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState, StartupError> {
    let store = build_store(&config.store)?;
    build_state_with_store(config, store).await
}

/// Same as [`build_state`] with an externally supplied store.
pub async fn build_state_with_store(
    config: &GatewayConfig,
    store: Arc<dyn CounterStore>,
) -> Result<AppState, StartupError> {
    let policy = RateLimitPolicy::from_config(config)?;
    let failure_mode = config.rate_limit.failure_mode;

    match (store.ping().await, failure_mode) {
        (Ok(()), _) => tracing::info!("Counter store reachable"),
        (Err(e), FailureMode::Closed) => {
            tracing::error!(error = %e, "Counter store unreachable and failure mode is closed");
            return Err(StartupError::Store(e));
        }
        (Err(e), FailureMode::Open) => {
            tracing::warn!(error = %e, "Counter store unreachable; admitting without limits until it recovers");
        }
    }

    let identity = match &config.rate_limit.identity_header {
        Some(name) => HeaderName::from_bytes(name.as_bytes())
            .map(IdentityExtractor::from_header)
            .map_err(|_| StartupError::IdentityHeader(name.clone()))?,
        None => IdentityExtractor::peer_address(),
    };

    let forwarder = Forwarder::new(&config.upstream)?;
    tracing::info!(
        origin = %forwarder.origin(),
        timeout_secs = config.upstream.timeout_secs,
        max_in_flight = config.upstream.max_in_flight,
        "Upstream client ready"
    );

    Ok(AppState {
        limiter: RateLimiter::new(store, policy, failure_mode),
        forwarder: Arc::new(forwarder),
        identity,
    })
}
