//! Request handling and transformation.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Capture the inbound request as a [`ProxiedRequest`] for forwarding
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is never buffered here; it streams to the upstream

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, Request};

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request ID, or "unknown" when the layer did not run.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// An inbound request on its way to the upstream.
#[derive(Debug)]
pub struct ProxiedRequest {
    pub method: Method,
    /// Original path and query, always starting with '/'.
    pub path_and_query: String,
    /// Inbound headers, hop-by-hop ones included; the forwarder strips them.
    pub headers: HeaderMap,
    pub body: Body,
    pub client_addr: IpAddr,
}

impl ProxiedRequest {
    pub fn from_inbound(request: Request<Body>, peer: SocketAddr) -> Self {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|pq| pq.starts_with('/'))
            .unwrap_or_else(|| "/".to_string());

        Self {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
            client_addr: peer.ip(),
        }
    }
}
