//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (caller IP allowlist)
//!     → headers.rs (X-Forwarded-For / X-Real-IP, hop-by-hop stripping)
//!     → Pass to forwarder
//! ```
//!
//! # Design Decisions
//! - Fail closed: a caller outside a non-empty allowlist is rejected
//! - Denied requests are never queued or retried

pub mod access_control;
pub mod headers;

pub use access_control::AccessList;
