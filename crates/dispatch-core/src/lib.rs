//! Fault-tolerant dispatch primitives: a circuit breaker, a retry policy with
//! exponential backoff, and a bounded-concurrency batch launcher.

pub mod breaker;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod retry;

pub use breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState};
pub use launcher::{BatchResult, ConcurrentLauncher, LaunchError, LaunchResult, LauncherConfig, WorkUnit};
pub use retry::{run_with_retry, with_retry, RetryPolicy, Retryable};
