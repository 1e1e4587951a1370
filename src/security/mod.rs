//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (derive the counting key)
//!     → rate_limit.rs (fixed-window admission against the counter store)
//!     → headers.rs (strip hop-by-hop, optional X-Forwarded-For)
//!     → Pass to forwarder
//! ```
//!
//! # Design Decisions
//! - Admission happens before any upstream resources are committed
//! - Store outages follow an explicit fail-open / fail-closed policy
//! - No trust in client input beyond the configured identity header

pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use identity::{ClientIdentity, IdentityExtractor};
pub use rate_limit::{Decision, RateLimitPolicy, RateLimiter};
