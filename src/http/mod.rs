//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit)
//!     → request.rs (request ID generation, caller IP)
//!     → proxy::Balancer (allowlist, claim, queue, forward)
//!     → response.rs (error mapping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{resolve_caller_ip, RequestIdGenerator, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
