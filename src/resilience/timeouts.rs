//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each connection phase with its own deadline
//! - Enforce connect timeout, header/body timeout, idle timeout
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors and name their phase

use std::future::Future;
use std::time::Duration;

use crate::error::{Phase, ProxyError, Result};

/// Run `fut` under a deadline, mapping expiry to [`ProxyError::Timeout`].
pub async fn with_deadline<T, F>(phase: Phase, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::Timeout { phase, after }),
    }
}
