use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

/// Re-runs a whole unit of work while it fails with a retryable conflict.
///
/// `operation` must open its own transaction on every call so that a retry
/// re-reads current state. Any non-retryable error is returned immediately.
pub async fn with_conflict_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        "Operation succeeded after {} attempts", attempts
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !error.is_retryable() {
                    if error.is_retryable() {
                        metrics::counter!("stateset_db.conflict_retry.exhausted", 1);
                        warn!(
                            operation = operation_name,
                            "Operation failed after {} attempts: {}", attempts, error
                        );
                    }
                    return Err(error);
                }

                metrics::counter!("stateset_db.conflict_retry.attempt", 1);
                warn!(
                    operation = operation_name,
                    "Attempt {} lost a version race: {}. Retrying in {:?}...",
                    attempts,
                    error,
                    delay
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_concurrent_modification_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_conflict_retry(&fast(), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ServiceError::ConcurrentModification(Uuid::nil()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_conflict_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::ConcurrentModification(Uuid::nil()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::ConcurrentModification(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_business_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_conflict_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Conflict("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
