//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → bulkhead.rs (bounded in-flight slots, bounded wait queue)
//!     → timeouts.rs (deadline until the response head arrives)
//!     → On connect failure: retries.rs (single jittered retry, if enabled)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent requests without a body
//! - Saturation fails fast instead of queueing without bound

pub mod bulkhead;
pub mod retries;
pub mod timeouts;
