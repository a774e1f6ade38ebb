//! Bounded retry with exponential backoff around device calls.
//!
//! Each try runs under its own timeout; an elapsed timeout is a transient
//! [`AdapterError`]. Transient errors are retried until `max_attempts` tries
//! have been made; permanent errors end the call at once.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use crate::adapter::{AdapterError, AdapterOp};
use crate::config::RetryConfig;

fn policy(config: &RetryConfig) -> backoff::ExponentialBackoff {
    // non-finite or shrinking multipliers fall back to a constant interval
    let multiplier = if config.multiplier.is_finite() && config.multiplier >= 1.0 {
        config.multiplier
    } else {
        1.0
    };
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
        .with_multiplier(multiplier)
        .with_max_interval(Duration::from_millis(config.max_backoff_ms))
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None)
        .build()
}

/// One try under `limit`.
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    device: &str,
    op: AdapterOp,
    call: Fut,
) -> Result<T, AdapterError>
where
    Fut: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::transient(
            device,
            op,
            format!("timed out after {:.3}s", limit.as_secs_f64()),
        )),
    }
}

/// Run `call` with timeout and bounded exponential backoff.
pub async fn retry_call<T, F, Fut>(
    config: &RetryConfig,
    limit: Duration,
    device: &str,
    op: AdapterOp,
    mut call: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let tries = AtomicU32::new(0);
    let operation = || {
        let attempt = tries.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = with_timeout(limit, device, op, call());
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    Err(backoff::Error::transient(err))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        }
    };
    backoff::future::retry_notify(policy(config), operation, |err: AdapterError, wait: Duration| {
        tracing::warn!(
            device,
            operation = %op,
            error = %err,
            wait_ms = wait.as_millis() as u64,
            "transient device error, retrying"
        );
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::retry_call;
    use crate::adapter::{AdapterError, AdapterOp};
    use crate::config::RetryConfig;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_call(&fast(3), Duration::from_secs(1), "fw1", AdapterOp::Push, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::transient("fw1", AdapterOp::Push, "busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.expect("third try succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_call(&fast(3), Duration::from_secs(1), "fw1", AdapterOp::Push, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AdapterError::transient("fw1", AdapterOp::Push, "busy")) }
            })
            .await;
        assert!(result.expect_err("exhausted").is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_call(&fast(5), Duration::from_secs(1), "fw1", AdapterOp::Commit, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AdapterError::permanent("fw1", AdapterOp::Commit, "denied")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_call(&fast(2), Duration::from_millis(5), "fw1", AdapterOp::Validate, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;
        let err = result.expect_err("timed out");
        assert!(err.is_transient());
        assert!(err.message.contains("timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unusable_multiplier_and_unbounded_limit_still_retry() {
        let mut config = fast(3);
        config.multiplier = f64::NAN;
        let calls = AtomicU32::new(0);
        let result = retry_call(&config, Duration::MAX, "fw1", AdapterOp::Fetch, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AdapterError::transient("fw1", AdapterOp::Fetch, "busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.expect("second try succeeds"), 1);
    }
}
