//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → edge server drains, health monitor and reload loop exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
