//! Client identity extraction.
//!
//! The identity is the counting key. It comes from the peer socket address,
//! or from a configured header when one is set and present. Clients behind
//! one address share a counter.

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName};

/// Opaque counting key. Equality is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a [`ClientIdentity`] for each request.
#[derive(Debug, Clone, Default)]
pub struct IdentityExtractor {
    header: Option<HeaderName>,
}

impl IdentityExtractor {
    /// Identify clients by peer address only.
    pub fn peer_address() -> Self {
        Self { header: None }
    }

    /// Prefer the first entry of `header`, falling back to the peer address.
    pub fn from_header(header: HeaderName) -> Self {
        Self { header: Some(header) }
    }

    pub fn extract(&self, headers: &HeaderMap, peer: SocketAddr) -> ClientIdentity {
        self.header
            .as_ref()
            .and_then(|name| headers.get(name))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ClientIdentity::new)
            .unwrap_or_else(|| ClientIdentity::new(peer.ip().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.1.2.3:55000".parse().unwrap()
    }

    #[test]
    fn uses_peer_ip_without_port() {
        let identity = IdentityExtractor::peer_address().extract(&HeaderMap::new(), peer());
        assert_eq!(identity.as_str(), "10.1.2.3");
    }

    #[test]
    fn header_first_entry_wins() {
        let extractor = IdentityExtractor::from_header(HeaderName::from_static("x-forwarded-for"));
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );

        assert_eq!(extractor.extract(&headers, peer()).as_str(), "203.0.113.9");
    }

    #[test]
    fn empty_or_missing_header_falls_back() {
        let extractor = IdentityExtractor::from_header(HeaderName::from_static("x-client-id"));
        assert_eq!(extractor.extract(&HeaderMap::new(), peer()).as_str(), "10.1.2.3");

        let mut headers = HeaderMap::new();
        headers.insert("x-client-id", HeaderValue::from_static("  "));
        assert_eq!(extractor.extract(&headers, peer()).as_str(), "10.1.2.3");
    }

    #[test]
    fn ipv6_peer() {
        let addr: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let identity = IdentityExtractor::default().extract(&HeaderMap::new(), addr);
        assert_eq!(identity.to_string(), "2001:db8::1");
    }
}
