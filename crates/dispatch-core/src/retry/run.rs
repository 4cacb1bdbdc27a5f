//! Retry loop: run an async operation until success or the policy says stop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::classify::Retryable;
use super::error::BlockingCallError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `op` until it succeeds or the retry policy says to stop, using the
/// error's own `Retryable` classification.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    run_with_retry_if(policy, E::is_transient, op).await
}

/// Runs `op` until it succeeds or the retry policy says to stop.
///
/// Errors rejected by `is_retriable` are returned immediately with no delay.
/// On retriable failure, sleeps for the backoff duration then tries again;
/// once the attempts are spent, the last attempt's error is returned.
pub async fn run_with_retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retriable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let operation = policy.label.as_deref().unwrap_or("operation");
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        let retriable = is_retriable(&err);
        match policy.decide(attempt, retriable) {
            RetryDecision::NoRetry => {
                if retriable {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        "failed after {} attempts: {}",
                        attempt + 1,
                        err
                    );
                } else {
                    tracing::debug!(operation, "non-retriable error: {}", err);
                }
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt {}/{} failed: {} (retrying in {:.1}s)",
                    attempt + 1,
                    max_attempts,
                    err,
                    delay.as_secs_f64()
                );
                drop(err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Runs a synchronous call on tokio's blocking pool with the same retry
/// semantics, so the async scheduler is not stalled while it blocks.
///
/// A blocking call cannot be interrupted: if the returned future is dropped
/// mid-attempt, the call keeps running on the pool and its result is discarded.
pub async fn run_blocking_with_retry<T, E, F>(
    policy: &RetryPolicy,
    f: F,
) -> Result<T, BlockingCallError<E>>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Retryable + fmt::Display + Send + 'static,
{
    let f = Arc::new(f);
    run_with_retry(policy, || {
        let f = Arc::clone(&f);
        async move {
            match tokio::task::spawn_blocking(move || (*f)()).await {
                Ok(result) => result.map_err(BlockingCallError::Call),
                Err(join) => Err(BlockingCallError::Join(join)),
            }
        }
    })
    .await
}
