// src/best_effort.rs

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::warn;

/// Runs a side effect whose failure must not affect the caller.
///
/// Exactly one attempt is made, bounded by `limit`. Errors and timeouts are
/// logged and collapse to `None`.
pub async fn attempt<T, E, F>(what: impl Display, limit: Duration, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{} failed: {}", what, e);
            None
        }
        Err(_) => {
            warn!("{} timed out after {:?}", what, limit);
            None
        }
    }
}
