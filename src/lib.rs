//! Rate-limiting reverse proxy.
//!
//! Every inbound request is attributed to a client identity, counted against
//! a fixed-window quota held in a shared counter store, and either rejected
//! with 429 or forwarded to a single upstream origin.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use store::{CounterStore, StoreError};
