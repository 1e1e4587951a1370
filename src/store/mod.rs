//! Shared counter store subsystem.
//!
//! # Data Flow
//! ```text
//! RateLimiter.admit(identity)
//!     → CounterStore::increment(key, window)   (one atomic unit)
//!         redis_store.rs : Lua script: INCR, PEXPIRE on creation, PTTL
//!         memory.rs : per-key entry lock in a concurrent map
//!     → WindowCount { count (pre-increment), window_remaining }
//! ```
//!
//! # Design Decisions
//! - The store is the only owner of counter state; nothing else writes keys
//! - Counters expire through TTL, never through explicit deletion
//! - Returning the pre-increment count tells the caller whether this request
//!   is the one that crosses the limit

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCounterStore;
pub use self::redis_store::{RedisCounterStore, RedisStoreConfig};

/// Snapshot returned by a single atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Count seen before this increment. Zero for the first request of a window.
    pub count: u64,
    /// Time left until the window resets.
    pub window_remaining: Duration,
}

/// Errors raised by counter store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network failure or deadline exceeded talking to the store.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something that is not a counter.
    #[error("corrupt counter state for key {key}: {detail}")]
    CorruptState { key: String, detail: String },

    /// The configured address cannot be turned into a connection target.
    #[error("invalid counter store address: {0}")]
    InvalidAddress(String),
}

impl StoreError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "unavailable",
            StoreError::CorruptState { .. } => "corrupt_state",
            StoreError::InvalidAddress(_) => "invalid_address",
        }
    }
}

/// Atomic fixed-window counter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key`, creating it with a `window` TTL when
    /// absent, and return the pre-increment count.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
