//! Fixed-window admission control.
//!
//! One atomic store increment per request. The pre-increment count decides
//! admission: the request is admitted while `count < max_requests`.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FailureMode, GatewayConfig};
use crate::config::validation::ValidationError;
use crate::observability::metrics;
use crate::security::identity::ClientIdentity;
use crate::store::{CounterStore, StoreError};

/// Requests allowed per identity per window. Read-only after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: NonZeroU64,
    window: Duration,
}

impl RateLimitPolicy {
    /// Build a policy, refusing values that would deny all traffic.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self, ValidationError> {
        let max_requests = NonZeroU64::new(max_requests).ok_or(ValidationError::Zero {
            field: "rate_limit.max_requests",
        })?;
        if window.is_zero() {
            return Err(ValidationError::Zero { field: "rate_limit.window_secs" });
        }
        Ok(Self { max_requests, window })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ValidationError> {
        Self::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        )
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests.get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Time until the window resets; zero when admitted.
    pub retry_after: Duration,
    /// Position of this request in the current window, starting at 1.
    /// Zero when the store could not be consulted.
    pub current_count: u64,
    /// Requests left in the window after this one; `None` when unknown.
    pub remaining: Option<u64>,
    pub limit: u64,
}

impl Decision {
    /// Retry-After value in whole seconds, rounded up, at least one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Admission controller shared by all request tasks.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: RateLimitPolicy,
    failure_mode: FailureMode,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy, failure_mode: FailureMode) -> Self {
        Self {
            store,
            policy,
            failure_mode,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Count this request and decide whether it may proceed.
    ///
    /// Store outages follow the configured [`FailureMode`]: `Open` admits with
    /// an unknown quota, `Closed` returns the error. Corrupt state always
    /// propagates.
    pub async fn admit(&self, identity: &ClientIdentity) -> Result<Decision, StoreError> {
        let limit = self.policy.max_requests();

        let window = match self.store.increment(identity.as_str(), self.policy.window).await {
            Ok(window) => window,
            Err(StoreError::Unavailable(reason)) if self.failure_mode == FailureMode::Open => {
                tracing::warn!(client = %identity, error = %reason, "Counter store unavailable; admitting without limit");
                metrics::record_store_error("unavailable");
                metrics::record_admission("fail_open");
                return Ok(Decision {
                    allowed: true,
                    retry_after: Duration::ZERO,
                    current_count: 0,
                    remaining: None,
                    limit,
                });
            }
            Err(e) => {
                metrics::record_store_error(e.kind());
                return Err(e);
            }
        };

        let allowed = window.count < limit;
        let current_count = window.count.saturating_add(1);
        let decision = Decision {
            allowed,
            retry_after: if allowed { Duration::ZERO } else { window.window_remaining },
            current_count,
            remaining: Some(limit.saturating_sub(current_count)),
            limit,
        };

        metrics::record_admission(if allowed { "allowed" } else { "rejected" });
        if !allowed {
            tracing::debug!(
                client = %identity,
                count = current_count,
                limit,
                retry_after_secs = decision.retry_after_secs(),
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCounterStore, WindowCount};
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment(&self, _: &str, _: Duration) -> Result<WindowCount, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct CorruptStore;

    #[async_trait]
    impl CounterStore for CorruptStore {
        async fn increment(&self, key: &str, _: Duration) -> Result<WindowCount, StoreError> {
            Err(StoreError::CorruptState { key: key.into(), detail: "bad reply".into() })
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn limiter(store: Arc<dyn CounterStore>, max: u64, mode: FailureMode) -> RateLimiter {
        let policy = RateLimitPolicy::new(max, Duration::from_secs(60)).unwrap();
        RateLimiter::new(store, policy, mode)
    }

    fn identity(s: &str) -> ClientIdentity {
        ClientIdentity::new(s)
    }

    #[test]
    fn zero_policy_is_refused() {
        assert!(RateLimitPolicy::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimitPolicy::new(1, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn nth_request_admitted_up_to_max() {
        let limiter = limiter(Arc::new(MemoryCounterStore::new()), 3, FailureMode::Open);
        let a = identity("A");

        for n in 1..=3 {
            let decision = limiter.admit(&a).await.unwrap();
            assert!(decision.allowed, "request {n} should be admitted");
            assert_eq!(decision.current_count, n);
            assert_eq!(decision.remaining, Some(3 - n));
            assert_eq!(decision.retry_after, Duration::ZERO);
        }

        let rejected = limiter.admit(&a).await.unwrap();
        assert!(!rejected.allowed);
        assert!(rejected.retry_after > Duration::ZERO);
        assert_eq!(rejected.remaining, Some(0));
        assert_eq!(rejected.retry_after_secs(), 60);
    }

    #[tokio::test]
    async fn identities_are_counted_separately() {
        let limiter = limiter(Arc::new(MemoryCounterStore::new()), 1, FailureMode::Open);

        assert!(limiter.admit(&identity("A")).await.unwrap().allowed);
        assert!(!limiter.admit(&identity("A")).await.unwrap().allowed);
        assert!(limiter.admit(&identity("B")).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_after_expiry() {
        let limiter = limiter(Arc::new(MemoryCounterStore::new()), 1, FailureMode::Open);
        let a = identity("A");

        assert!(limiter.admit(&a).await.unwrap().allowed);
        assert!(!limiter.admit(&a).await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        let decision = limiter.admit(&a).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.current_count, 1);
    }

    #[tokio::test]
    async fn fail_open_admits_when_store_is_down() {
        let limiter = limiter(Arc::new(DownStore), 1, FailureMode::Open);

        for _ in 0..5 {
            let decision = limiter.admit(&identity("A")).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, None);
        }
    }

    #[tokio::test]
    async fn fail_closed_propagates_outage() {
        let limiter = limiter(Arc::new(DownStore), 1, FailureMode::Closed);
        let err = limiter.admit(&identity("A")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn corrupt_state_propagates_even_when_open() {
        let limiter = limiter(Arc::new(CorruptStore), 1, FailureMode::Open);
        let err = limiter.admit(&identity("A")).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptState { .. }));
    }

    #[test]
    fn retry_after_rounds_up() {
        let mut decision = Decision {
            allowed: false,
            retry_after: Duration::from_millis(1500),
            current_count: 4,
            remaining: Some(0),
            limit: 3,
        };
        assert_eq!(decision.retry_after_secs(), 2);

        decision.retry_after = Duration::from_millis(10);
        assert_eq!(decision.retry_after_secs(), 1);

        decision.retry_after = Duration::ZERO;
        assert_eq!(decision.retry_after_secs(), 1);
    }
}
