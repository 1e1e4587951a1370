//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → gateway.rs (identity → admission → forward)
//!     → request.rs (inbound request → proxied request)
//!     → forwarder.rs (upstream call, streamed both ways)
//!     → response.rs (quota headers, error bodies)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Single catch-all route; every path goes to the same upstream origin
//! - Bodies are streamed, never buffered
//! - Request ID generated if not present (X-Request-ID header)

pub mod forwarder;
pub mod gateway;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{ForwardError, Forwarder};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
