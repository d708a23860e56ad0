//! Timeout guards for async tests.
//!
//! A pipeline that never finishes shows up as a hung test run. These
//! helpers turn that into a panic naming the limit that was exceeded.

use std::future::Future;
use std::time::Duration;

/// Limit used by [`with_default_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, panicking if it is still pending after `limit`.
///
/// # Panics
///
/// Panics when `limit` elapses first.
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(output) => output,
        Err(_) => panic!("Test timed out after {limit:?}"),
    }
}

/// Await `future` with [`DEFAULT_TIMEOUT`].
///
/// # Panics
///
/// Panics when the default limit elapses first.
pub async fn with_default_timeout<T, F>(future: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout(DEFAULT_TIMEOUT, future).await
}
