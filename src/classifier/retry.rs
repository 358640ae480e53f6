//! Bounded fixed-delay retry for classification calls
//!
//! Every attempt is a fresh request. Transient failures (network errors,
//! non-2xx answers, malformed bodies) are retried until the attempt budget
//! runs out. Exhausted transport failures surface as
//! [`IndicatorError::ClassificationUnavailable`]; a body that is still
//! malformed on the last attempt keeps its
//! [`IndicatorError::ClassificationParse`] error.

use crate::error::{IndicatorError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

pub async fn retry_fixed<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                if matches!(err, IndicatorError::ClassificationParse(_)) {
                    return Err(err);
                }
                return Err(IndicatorError::ClassificationUnavailable {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "{}: transient failure, retrying in {}ms",
                    label,
                    policy.delay.as_millis()
                );
                attempt += 1;
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_fixed(policy(), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(IndicatorError::Api("503".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_transport_failures_are_unavailable() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_fixed(policy(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IndicatorError::Api("502 bad gateway".into()))
        })
        .await;

        match result {
            Err(IndicatorError::ClassificationUnavailable { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("502"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_body_keeps_parse_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_fixed(policy(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IndicatorError::ClassificationParse("not json".into()))
        })
        .await;

        assert!(matches!(result, Err(IndicatorError::ClassificationParse(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_fixed(policy(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IndicatorError::Config("missing key".into()))
        })
        .await;

        assert!(matches!(result, Err(IndicatorError::Config(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
