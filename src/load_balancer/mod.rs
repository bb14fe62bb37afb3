//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request admitted
//!     → registry.rs (scan pool in order, claim first live + idle backend)
//!     → BackendClaim handed to the forwarder
//!     → claim dropped → backend released → queued work woken
//!
//! Availability prober
//!     → registry.rs (set_alive, claims untouched)
//! ```
//!
//! # Design Decisions
//! - One backend serves one request at a time (exclusive claim)
//! - First match in pool order; no weighting or rotation
//! - Liveness and claim flags share a single lock
//! - Release is tied to `Drop` so it cannot be skipped or doubled

pub mod backend;
pub mod registry;

pub use backend::{AddressError, Backend, BackendAddress, BackendId};
pub use registry::{BackendClaim, BackendStatus, ServerRegistry};
