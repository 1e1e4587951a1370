//! Per-request pipeline.
//!
//! ```text
//! Received → IdentityExtracted → LimitChecked ─┬→ Forwarding → Responded
//!                                              └→ Rejected
//! ```
//!
//! Rejected requests never reach the upstream. Each request counts exactly
//! once against its identity, whatever happens afterwards.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::http::request::{request_id, ProxiedRequest};
use crate::http::response::apply_quota_headers;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Catch-all handler: admit, forward, relay.
pub async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request_id(request.headers()).to_string();

    let identity = state.identity.extract(request.headers(), peer);

    let decision = match state.limiter.admit(&identity).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(request_id = %request_id, client = %identity, error = %e, "Admission check failed");
            return finish(&method, start, GatewayError::from(e));
        }
    };

    if !decision.allowed {
        tracing::info!(
            request_id = %request_id,
            client = %identity,
            count = decision.current_count,
            retry_after_secs = decision.retry_after_secs(),
            "Request rejected"
        );
        return finish(&method, start, GatewayError::RateLimited { identity, decision });
    }

    tracing::debug!(
        request_id = %request_id,
        client = %identity,
        method = %method,
        path = %request.uri().path(),
        count = decision.current_count,
        "Forwarding request"
    );

    let proxied = ProxiedRequest::from_inbound(request, peer);
    match state.forwarder.relay(proxied).await {
        Ok(upstream) => {
            let status = upstream.status;
            let mut response = upstream.into_response();
            apply_quota_headers(response.headers_mut(), &decision);
            metrics::record_request(method.as_str(), status.as_u16(), "forwarded", start);
            response
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, client = %identity, error = %e, "Upstream request failed");
            metrics::record_upstream_error(e.kind());
            finish(&method, start, GatewayError::from(e))
        }
    }
}

fn finish(method: &Method, start: Instant, error: GatewayError) -> Response {
    let outcome = error.outcome();
    let response = error.into_response();
    metrics::record_request(method.as_str(), response.status().as_u16(), outcome, start);
    response
}
