//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward attempt:
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On connection-level failure: retries.rs (check if retryable)
//!     → backoff.rs (jittered delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Retries only for GET/HEAD without a body
//! - Retries never reuse a destination already tried by the request

pub mod backoff;
pub mod retries;
pub mod timeouts;
