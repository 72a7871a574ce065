//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap destination calls with a per-attempt deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

/// The attempt did not finish within its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("attempt timed out after {0:?}")]
pub struct AttemptTimedOut(pub Duration);

/// Run `fut` with a deadline. The future is dropped when the deadline passes.
pub async fn with_deadline<F: Future>(limit: Duration, fut: F) -> Result<F::Output, AttemptTimedOut> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AttemptTimedOut(limit))
}
