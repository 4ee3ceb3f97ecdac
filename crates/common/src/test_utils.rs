//! Test utilities for usb-reset-check
//!
//! Helpers shared by the test suites of every crate.
//!
//! # Example
//!
//! ```
//! use common::test_utils::ms;
//! use std::time::Duration;
//!
//! assert_eq!(ms(250), Duration::from_millis(250));
//! ```

use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Guard for tests running a whole session under paused time
///
/// Virtual time advances freely there, so the guard must exceed the longest
/// scaled budget a test uses.
pub const SESSION_TEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shorthand for `Duration::from_millis`
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Extension for awaiting a future under a test timeout
pub trait TestTimeout: Future + Sized {
    /// Await `self`, panicking if it takes longer than `duration`
    fn within(self, duration: Duration) -> impl Future<Output = Self::Output> {
        async move {
            match with_timeout(duration, self).await {
                Ok(output) => output,
                Err(e) => panic!("{}", e),
            }
        }
    }
}

impl<F: Future> TestTimeout for F {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_within_returns_output() {
        let value = async { "done" }.within(DEFAULT_TEST_TIMEOUT).await;
        assert_eq!(value, "done");
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "Test timed out")]
    async fn test_within_panics_on_timeout() {
        tokio::time::sleep(Duration::from_secs(10))
            .within(Duration::from_secs(1))
            .await;
    }

    #[test]
    fn test_ms() {
        assert_eq!(ms(1500), Duration::from_secs_f64(1.5));
    }
}
