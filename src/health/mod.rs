//! Backend availability subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs)
//!     → TCP dial to every backend, concurrently
//!     → ServerRegistry::set_alive
//!     → revival wakes queued requests
//! ```
//!
//! # Design Decisions
//! - A single successful dial marks a backend alive; no thresholds
//! - Probing never touches claims; a claimed backend can go down mid-request
//! - Backends start alive until the first probe says otherwise

pub mod active;

pub use active::AvailabilityProber;
