use rand::Rng;
use std::time::Duration;

/// High-level classification of an error for retry purposes.
///
/// This intentionally stays generic; callers map socket errors, client
/// timeouts or their own error enums into these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read/overall deadline).
    Timeout,
    /// Network-level failure (connection refused/reset, broken pipe, etc.).
    Connection,
    /// Any other I/O failure.
    Io,
    /// Structural error such as malformed input (never retried).
    Other,
}

impl ErrorKind {
    /// Whether an error of this kind is likely to succeed when retried.
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Capped exponential backoff policy with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on backoff delay (applied before jitter).
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
    /// Operation name used in log lines.
    pub label: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
            label: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry `retry_index` (0 = first retry), without jitter:
    /// `min(base_delay * 2^retry_index, max_delay)`. Overflow saturates to `max_delay`.
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let raw = 2u32
            .checked_pow(retry_index)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        raw.min(self.max_delay)
    }

    /// Decide what to do after attempt `attempt` (0-based) failed.
    ///
    /// Returns `RetryDecision::NoRetry` for non-retriable errors and once the
    /// retry budget is spent.
    pub fn decide(&self, attempt: u32, retriable: bool) -> RetryDecision {
        if !retriable || attempt >= self.max_retries {
            return RetryDecision::NoRetry;
        }
        let delay = self.backoff_delay(attempt);
        if self.jitter {
            RetryDecision::RetryAfter(apply_jitter(delay))
        } else {
            RetryDecision::RetryAfter(delay)
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
    delay.mul_f64(factor)
}
