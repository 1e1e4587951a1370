//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, timeouts > 0)
//! - Validate addresses and the upstream origin
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    Address { field: &'static str, value: String },

    #[error("upstream.origin is invalid: {0}")]
    Origin(String),

    #[error("store.address must be host:port, got {0}")]
    StoreAddress(String),

    #[error("store.database must not be negative")]
    NegativeDatabase,

    #[error("timeouts.request_secs ({request_secs}) must exceed upstream.timeout_secs ({upstream_secs})")]
    RequestDeadline { request_secs: u64, upstream_secs: u64 },
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive = [
        ("rate_limit.max_requests", config.rate_limit.max_requests),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("upstream.max_in_flight", config.upstream.max_in_flight as u64),
        ("store.timeout_ms", config.store.timeout_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    // The request deadline must leave room for the upstream timeout to fire first.
    let (request_secs, upstream_secs) = (config.timeouts.request_secs, config.upstream.timeout_secs);
    if request_secs > 0 && upstream_secs > 0 && request_secs <= upstream_secs {
        errors.push(ValidationError::RequestDeadline { request_secs, upstream_secs });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if let Err(reason) = check_origin(&config.upstream.origin) {
        errors.push(ValidationError::Origin(reason));
    }

    if !is_host_port(&config.store.address) {
        errors.push(ValidationError::StoreAddress(config.store.address.clone()));
    }

    if config.store.database < 0 {
        errors.push(ValidationError::NegativeDatabase);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_origin(origin: &str) -> Result<(), String> {
    let url = Url::parse(origin).map_err(|e| format!("{origin}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{origin}: scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(format!("{origin}: missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(format!("{origin}: query and fragment are not allowed"));
    }
    Ok(())
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn zero_max_requests_is_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero { field: "rate_limit.max_requests" }]
        );
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.rate_limit.window_secs = 0;
        config.upstream.origin = "ftp://example.com".into();
        config.store.address = "localhost".into();
        config.listener.bind_address = "nope".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn request_deadline_must_exceed_upstream_timeout() {
        let mut config = GatewayConfig::default();
        config.upstream.timeout_secs = 3;
        config.timeouts.request_secs = 1;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::RequestDeadline { request_secs: 1, upstream_secs: 3 }])
        );

        config.timeouts.request_secs = 3;
        assert!(validate_config(&config).is_err());

        config.timeouts.request_secs = 4;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn origin_with_query_is_rejected() {
        assert!(check_origin("https://example.com/api?x=1").is_err());
        assert!(check_origin("https://example.com/api").is_ok());
        assert!(check_origin("not a url").is_err());
    }

    #[test]
    fn store_address_requires_port() {
        assert!(is_host_port("redis.internal:6379"));
        assert!(is_host_port("[::1]:6379"));
        assert!(!is_host_port("redis.internal"));
        assert!(!is_host_port(":6379"));
    }
}
