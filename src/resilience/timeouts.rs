//! Timeout enforcement.
//!
//! Every outbound call has a deadline. Elapsed deadlines are a distinct error
//! so the gateway can answer 504 instead of 502.

use std::future::Future;
use std::time::Duration;

/// The wrapped future did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Run `future` with a deadline. The future is dropped (cancelled) on expiry.
pub async fn with_deadline<F: Future>(deadline: Duration, future: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| Elapsed(deadline))
}
