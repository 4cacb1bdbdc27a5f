//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, connection
//! failures, generic I/O) and capped exponential backoff so that callers
//! wrapping a remote call share one consistent policy. The loop itself is
//! async; a blocking adapter and a function wrapper sit on top of it.

mod classify;
mod error;
mod policy;
mod run;
mod wrap;

pub use classify::{classify_io_error, Retryable};
pub use error::BlockingCallError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_blocking_with_retry, run_with_retry, run_with_retry_if};
pub use wrap::{with_retry, Retrying};
