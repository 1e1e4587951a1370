//! Header manipulation for proxied exchanges.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip headers nominated by the `Connection` header
//! - Optionally append the client address to X-Forwarded-For
//!
//! # Design Decisions
//! - Everything not hop-by-hop passes through untouched and in order
//! - `Host` is rewritten by the outbound client from the origin URL

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Headers meaningful only for a single transport connection.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let nominated: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in nominated.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(PROXY_CONNECTION);
}

/// Prepare inbound request headers for the upstream.
pub fn outbound_request_headers(mut headers: HeaderMap) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers
}

/// Append `client` to X-Forwarded-For, keeping earlier hops.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    const XFF: HeaderName = HeaderName::from_static("x-forwarded-for");

    let previous: Vec<&str> = headers
        .get_all(&XFF)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let joined = if previous.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", previous.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(XFF, value);
    }
}

/// Whether the message declares a body.
pub fn declares_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}
