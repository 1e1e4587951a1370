//! Outbound forwarding to the fixed upstream origin.
//!
//! # Responsibilities
//! - Build the target URL: origin plus the inbound path and query
//! - Copy method, headers (minus hop-by-hop) and body
//! - Bound the wait for the response head and the number of exchanges in flight
//! - Relay status, headers (minus hop-by-hop) and body bytes unchanged
//!
//! # Design Decisions
//! - One pooled client per process; no per-request connection setup
//! - Redirects are returned to the caller, never followed
//! - No content decoding; bodies stream through as opaque bytes
//! - The in-flight slot is released only when the response body finishes

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use futures_util::StreamExt;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::request::ProxiedRequest;
use crate::resilience::bulkhead::{Bulkhead, Rejected};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::{with_deadline, Elapsed};
use crate::security::headers::{
    append_forwarded_for, declares_body, outbound_request_headers, strip_hop_by_hop,
};

/// Errors raised while relaying to the upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("upstream unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("upstream saturated: {0}")]
    Saturated(#[from] Rejected),

    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ForwardError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Unavailable(_) => "unavailable",
            ForwardError::Saturated(_) => "saturated",
            ForwardError::InvalidTarget(_) => "invalid_target",
            ForwardError::Client(_) => "client",
        }
    }
}

/// An upstream response ready to be relayed.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Relays admitted requests to the upstream origin.
#[derive(Debug)]
pub struct Forwarder {
    client: reqwest::Client,
    origin: Url,
    timeout: Duration,
    bulkhead: Bulkhead,
    retry: RetryPolicy,
    add_forwarded_for: bool,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ForwardError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ForwardError::InvalidTarget(format!("{}: {e}", config.origin)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(ForwardError::Client)?;

        Ok(Self {
            client,
            origin,
            timeout: Duration::from_secs(config.timeout_secs),
            bulkhead: Bulkhead::new(
                config.max_in_flight,
                config.queue_depth,
                Duration::from_millis(config.queue_timeout_ms),
            ),
            retry: RetryPolicy::from_config(&config.retry),
            add_forwarded_for: config.add_forwarded_for,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Origin with the inbound path and query appended.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url, ForwardError> {
        let base = self.origin.as_str().trim_end_matches('/');
        let target = format!("{base}{path_and_query}");
        Url::parse(&target).map_err(|e| ForwardError::InvalidTarget(format!("{target}: {e}")))
    }

    /// Forward `request` and return the upstream response.
    pub async fn relay(&self, request: ProxiedRequest) -> Result<ProxiedResponse, ForwardError> {
        let slot = self.bulkhead.acquire().await?;

        let ProxiedRequest {
            method,
            path_and_query,
            headers,
            body,
            client_addr,
        } = request;

        let url = self.target_url(&path_and_query)?;
        let has_body = declares_body(&headers);
        let mut headers = outbound_request_headers(headers);
        if self.add_forwarded_for {
            append_forwarded_for(&mut headers, client_addr);
        }

        let mut body = has_body.then(|| reqwest::Body::wrap_stream(body.into_data_stream()));
        let mut attempt = 0;
        let mut response = loop {
            attempt += 1;
            let mut outbound = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = body.take() {
                outbound = outbound.body(body);
            }

            match with_deadline(self.timeout, outbound.send()).await {
                Ok(Ok(response)) => break response,
                Ok(Err(e)) if e.is_connect() && self.retry.should_retry(&method, has_body, attempt) => {
                    let delay = self.retry.delay();
                    tracing::info!(url = %url, attempt, delay = ?delay, error = %e, "Retrying after connect error");
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) if e.is_timeout() => return Err(ForwardError::Timeout(self.timeout)),
                Ok(Err(e)) => return Err(ForwardError::Unavailable(e)),
                Err(Elapsed(deadline)) => return Err(ForwardError::Timeout(deadline)),
            }
        };

        let status = response.status();
        let mut headers = std::mem::take(response.headers_mut());
        strip_hop_by_hop(&mut headers);

        // The slot travels with the body stream and is freed when it is dropped.
        let stream = response.bytes_stream().map(move |chunk| {
            let _slot = &slot;
            chunk
        });

        Ok(ProxiedResponse {
            status,
            headers,
            body: Body::from_stream(stream),
        })
    }
}
