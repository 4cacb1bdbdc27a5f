//! Wrap an async function so every call goes through a retry policy.

use std::fmt;
use std::future::Future;

use super::classify::Retryable;
use super::policy::RetryPolicy;
use super::run::run_with_retry;

/// An async function bundled with the retry policy applied to each call.
///
/// Built with [`with_retry`]. Multi-argument functions take a tuple.
#[derive(Debug, Clone)]
pub struct Retrying<F> {
    policy: RetryPolicy,
    func: F,
}

/// Wraps `func` so that [`Retrying::call`] retries it under `policy`.
///
/// When the policy has no label, log lines are labelled with the function's
/// own name (e.g. `fetch_balance`).
pub fn with_retry<F>(policy: RetryPolicy, func: F) -> Retrying<F> {
    let policy = match policy.label {
        Some(_) => policy,
        None => policy.with_label(function_name::<F>()),
    };
    Retrying { policy, func }
}

impl<F> Retrying<F> {
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls the wrapped function with `arg`, retrying transient failures.
    /// `arg` is cloned for each attempt.
    pub async fn call<A, T, E, Fut>(&self, arg: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        run_with_retry(&self.policy, || (self.func)(arg.clone())).await
    }
}

/// Last path segment of the type name, without generic arguments.
/// For a function item this is the function's name; closures yield `{{closure}}`.
fn function_name<F>() -> &'static str {
    let full = std::any::type_name::<F>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    static BALANCE_CALLS: AtomicU32 = AtomicU32::new(0);

    async fn fetch_balance(account: String) -> Result<u64, io::Error> {
        if BALANCE_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "rst"));
        }
        Ok(account.len() as u64)
    }

    #[tokio::test(start_paused = true)]
    async fn wrapped_function_is_retried_and_labelled() {
        let policy = RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(50));
        let wrapped = with_retry(policy, fetch_balance);
        assert_eq!(wrapped.policy().label.as_deref(), Some("fetch_balance"));

        let balance = wrapped.call("0xabc".to_string()).await.unwrap();
        assert_eq!(balance, 5);
        assert_eq!(BALANCE_CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn explicit_label_is_kept() {
        let policy = RetryPolicy::default().with_label("redeem");
        let wrapped = with_retry(policy, fetch_balance);
        assert_eq!(wrapped.policy().label.as_deref(), Some("redeem"));
    }

    #[tokio::test(start_paused = true)]
    async fn tuple_arguments() {
        let place = |(market, size): (&'static str, u32)| async move {
            if size == 0 {
                Err(io::Error::new(io::ErrorKind::InvalidInput, "zero size"))
            } else {
                Ok(format!("{market}:{size}"))
            }
        };
        let wrapped = with_retry(RetryPolicy::default(), place);
        assert_eq!(wrapped.call(("btc-15m", 3)).await.unwrap(), "btc-15m:3");
        assert!(wrapped.call(("btc-15m", 0)).await.is_err());
    }
}
