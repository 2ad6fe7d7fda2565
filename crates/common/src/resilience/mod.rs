//! Deadlines and retries for external calls
//!
//! Every call to the model, the embedding service, the document index and
//! the structured store goes through [`with_deadline`], so each one carries
//! an explicit timeout and shows up in the external call metrics.

use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::{future::retry_notify, ExponentialBackoff};
use std::future::Future;
use std::time::{Duration, Instant};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Run `fut` with a deadline. Expiry drops the future, which aborts the
/// underlying I/O, and yields `ExternalTimeout`.
pub async fn with_deadline<T, F>(service: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, fut).await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(result) => {
            metrics::record_external_call(service, elapsed, false);
            result
        }
        Err(_) => {
            metrics::record_external_call(service, elapsed, true);
            tracing::warn!(
                service = service,
                timeout_ms = timeout.as_millis() as u64,
                "External call timed out"
            );
            Err(AppError::ExternalTimeout {
                service: service.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Retry `operation` with exponential backoff (100ms, 200ms, 400ms, ...).
/// Timeouts are returned immediately, the caller's deadline has already
/// been spent.
pub async fn retry_with_backoff<T, F, Fut>(
    operation: &str,
    max_retries: u32,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = ExponentialBackoff {
        current_interval: INITIAL_RETRY_DELAY,
        initial_interval: INITIAL_RETRY_DELAY,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempt: u32 = 0;

    retry_notify(
        policy,
        || {
            attempt += 1;
            let exhausted = attempt > max_retries;
            let fut = attempt_fn();
            async move {
                fut.await.map_err(|e| {
                    if exhausted || e.is_timeout() {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            }
        },
        |e: AppError, delay: Duration| {
            tracing::warn!(
                operation = operation,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Request failed, retrying"
            );
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_deadline_expires() {
        let result: Result<()> = with_deadline("document_index", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::ExternalTimeout { service, timeout_ms }) => {
                assert_eq!(service, "document_index");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let value = with_deadline("store", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let value = retry_with_backoff("generate", 3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::GenerationUnavailable { message: "busy".into() })
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("embed", 1, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::EmbeddingError { message: "down".into() })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeouts_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("generate", 5, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::GenerationTimeout { timeout_ms: 1 })
        })
        .await;

        assert!(matches!(result, Err(AppError::GenerationTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
