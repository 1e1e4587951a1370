//! Process-local counter store.
//!
//! Counts are not shared between gateway instances. Used for single-instance
//! deployments and as the substitutable store in tests.
//!
//! Expired windows are only reset when their key comes back, so a background
//! task started by [`MemoryCounterStore::spawn_purger`] drops the rest.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::store::{CounterStore, StoreError, WindowCount};

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u64,
    expires_at: Instant,
}

/// In-memory fixed-window counters keyed by identity.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, WindowEntry>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop expired windows.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.retain(|_, entry| entry.expires_at > now);
    }

    /// Purge expired windows every `every` until the store is dropped.
    pub fn spawn_purger(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let before = store.len();
                store.purge_expired();
                let purged = before.saturating_sub(store.len());
                if purged > 0 {
                    tracing::debug!(purged, remaining = store.len(), "Purged expired windows");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();

        // The entry guard holds the shard lock for the whole read-modify-write.
        let (previous, expires_at) = {
            let mut entry = self
                .windows
                .entry(key.to_string())
                .or_insert(WindowEntry { count: 0, expires_at: now + window });

            if entry.expires_at <= now {
                *entry = WindowEntry { count: 0, expires_at: now + window };
            }

            let previous = entry.count;
            entry.count = previous.saturating_add(1);
            (previous, entry.expires_at)
        };

        Ok(WindowCount {
            count: previous,
            window_remaining: expires_at.saturating_duration_since(now),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
