//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay upstream responses with quota headers added
//! - Render gateway errors as JSON responses with the right status
//! - Render handler panics as 500
//!
//! # Design Decisions
//! - Upstream status, headers and body pass through unchanged
//! - Hop-by-hop headers were already stripped by the forwarder
//! - Upstream timeouts result in 504 Gateway Timeout

use std::any::Any;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::forwarder::ProxiedResponse;
use crate::security::Decision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// JSON body of every response the gateway produces itself.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            retry_after: None,
        }
    }

    fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

/// Expose the quota. Remaining is omitted when the store was not consulted.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    if let Some(remaining) = decision.remaining {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    }
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn json_response(status: StatusCode, body: ErrorBody) -> Response {
    let retry_after = body.retry_after;
    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after {
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::RateLimited { decision, .. } => {
                let secs = decision.retry_after_secs();
                let mut response =
                    json_response(status, ErrorBody::new("rate limit exceeded").retry_after(secs));
                apply_quota_headers(response.headers_mut(), &decision);
                response
            }
            GatewayError::Store(e) if status == StatusCode::SERVICE_UNAVAILABLE => {
                tracing::debug!(error = %e, "Rejecting while counter store is down");
                json_response(status, ErrorBody::new("rate limiter unavailable").retry_after(1))
            }
            GatewayError::Store(_) => json_response(status, ErrorBody::new("internal error")),
            GatewayError::Upstream(_) => {
                let body = match status {
                    StatusCode::GATEWAY_TIMEOUT => ErrorBody::new("upstream timed out"),
                    StatusCode::SERVICE_UNAVAILABLE => ErrorBody::new("upstream saturated").retry_after(1),
                    _ => ErrorBody::new("upstream unavailable"),
                };
                json_response(status, body)
            }
        }
    }
}

/// Response for a panicking handler; the panic stays inside its task.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    json_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new("internal error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ClientIdentity;
    use crate::store::StoreError;
    use axum::body::{to_bytes, Body};
    use std::time::Duration;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn rejected() -> Decision {
        Decision {
            allowed: false,
            retry_after: Duration::from_millis(59_400),
            current_count: 4,
            remaining: Some(0),
            limit: 3,
        }
    }

    #[tokio::test]
    async fn rate_limited_response() {
        let response = GatewayError::RateLimited {
            identity: ClientIdentity::new("A"),
            decision: rejected(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "60");
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            body_of(response).await,
            ErrorBody {
                error: "rate limit exceeded".into(),
                retry_after: Some(60)
            }
        );
    }

    #[tokio::test]
    async fn fail_closed_store_outage_is_503() {
        let response = GatewayError::from(StoreError::Unavailable("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[RETRY_AFTER], "1");
        assert_eq!(body_of(response).await.error, "rate limiter unavailable");
    }

    #[tokio::test]
    async fn panic_is_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await.error, "internal error");
    }

    #[test]
    fn proxied_response_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-upstream", HeaderValue::from_static("yes"));
        let response = ProxiedResponse {
            status: StatusCode::IM_A_TEAPOT,
            headers,
            body: Body::empty(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-upstream"], "yes");
    }

    #[test]
    fn unknown_remaining_is_omitted() {
        let mut headers = HeaderMap::new();
        let decision = Decision {
            allowed: true,
            retry_after: Duration::ZERO,
            current_count: 0,
            remaining: None,
            limit: 10,
        };
        apply_quota_headers(&mut headers, &decision);
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert!(!headers.contains_key("x-ratelimit-remaining"));
    }
}
