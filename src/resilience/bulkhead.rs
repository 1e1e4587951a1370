//! Bounded concurrency with a bounded wait queue.
//!
//! Callers beyond `max_in_flight` wait for a slot; callers beyond
//! `queue_depth` waiters fail immediately. A slot is held by an owned permit
//! until it is dropped, so it can travel with a streamed response body.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// No slot could be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("wait queue is full")]
    QueueFull,
    #[error("no slot freed up within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug)]
pub struct Bulkhead {
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    queue_depth: usize,
    queue_timeout: Duration,
}

/// Decrements the waiter count when the waiting caller leaves, however it leaves.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Bulkhead {
    pub fn new(max_in_flight: usize, queue_depth: usize, queue_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight)),
            waiting: AtomicUsize::new(0),
            queue_depth,
            queue_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, Rejected> {
        if let Ok(permit) = self.slots.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let waiters = self.waiting.fetch_add(1, Ordering::SeqCst);
        let _guard = WaitingGuard(&self.waiting);
        if waiters >= self.queue_depth {
            return Err(Rejected::QueueFull);
        }

        match tokio::time::timeout(self.queue_timeout, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed; treat it like a full queue if it ever is.
            Ok(Err(_)) => Err(Rejected::QueueFull),
            Err(_) => Err(Rejected::TimedOut(self.queue_timeout)),
        }
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
