//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed upstream exchange may be repeated
//! - Compute the jittered delay before the single retry
//!
//! # Design Decisions
//! - At most one retry; retries amplify load on a struggling origin
//! - Only idempotent methods without a body (the body stream is consumed)
//! - Only connection failures; a timeout may already have reached the origin

use std::time::Duration;

use axum::http::Method;
use rand::Rng;

use crate::config::schema::RetryConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    enabled: bool,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Whether a request that failed to connect may be sent once more.
    pub fn should_retry(&self, method: &Method, has_body: bool, attempt: u32) -> bool {
        self.enabled && attempt == 1 && !has_body && is_idempotent(method)
    }

    /// Backoff plus up to 10% jitter.
    pub fn delay(&self) -> Duration {
        let base = self.backoff.as_millis() as u64;
        let jitter_range = base / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE | Method::TRACE
    )
}
