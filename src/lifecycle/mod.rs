//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → stop accepting, prober and retry worker exit
//!     → in-flight connections drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task holds its own receiver
//! - Queued requests still waiting at shutdown are answered with 503

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
