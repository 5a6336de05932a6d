use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the zero-based `attempt` failed: `base * 2^attempt`.
    pub fn delay_after(&self, attempt: u8) -> TokioDuration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt as u32));
        TokioDuration::from_millis(delay)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.maxAttempts must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Runs `call` until it succeeds, returns an error `should_retry` rejects, or
/// the policy runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    should_retry: P,
    mut call: F,
) -> Result<T, InfraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InfraError>>,
    P: Fn(&InfraError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                let delay = policy.delay_after(attempt);
                debug!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "retrying after transient failure"
                );
                sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(error) => {
                if attempt > 0 {
                    warn!(operation, attempts = attempt + 1, %error, "giving up after retries");
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u8) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(0), TokioDuration::from_millis(1_000));
        assert_eq!(policy.delay_after(1), TokioDuration::from_millis(2_000));
        assert_eq!(policy.delay_after(2), TokioDuration::from_millis(4_000));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay_ms: 10,
        };
        assert!(policy.validate().is_err());
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(&fast_policy(3), "test", InfraError::is_transient, || {
            let counter = Arc::clone(&counter);
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    Err(InfraError::Network("connection reset".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.expect("second attempt succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), InfraError> =
            retry_with_backoff(&fast_policy(3), "test", InfraError::is_transient, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InfraError::Network("down".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(InfraError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), InfraError> =
            retry_with_backoff(&fast_policy(5), "test", InfraError::is_transient, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InfraError::HttpStatus {
                        status: 401,
                        message: "unauthorized".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(InfraError::HttpStatus { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
