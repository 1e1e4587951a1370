//! Per-request error type.
//!
//! Every failure a request task can hit ends up here and is rendered by
//! `http::response`. None of these terminate the listener.

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::forwarder::ForwardError;
use crate::security::{ClientIdentity, Decision};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The identity used up its quota for the current window.
    #[error("rate limit exceeded for {identity}")]
    RateLimited {
        identity: ClientIdentity,
        decision: Decision,
    },

    /// The counter store failed and the failure mode did not absorb it.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The upstream could not be reached or did not answer in time.
    #[error(transparent)]
    Upstream(#[from] ForwardError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(ForwardError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(ForwardError::Saturated(_)) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Outcome label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::RateLimited { .. } => "rejected",
            GatewayError::Store(_) => "store_error",
            GatewayError::Upstream(_) => "upstream_error",
        }
    }
}
