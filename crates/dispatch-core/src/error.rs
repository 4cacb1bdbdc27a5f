//! Construction-time validation errors shared by the dispatch components.

use thiserror::Error;

/// A component was configured with values it cannot run with.
///
/// Returned by the constructors so bad settings fail fast instead of on
/// first use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be >= 1")]
    FailureThreshold,
    #[error("half_open_max_calls must be >= 1")]
    HalfOpenMaxCalls,
    #[error("max_concurrency must be >= 1")]
    MaxConcurrency,
    #[error("max_concurrency must be <= {max} (got {value})")]
    MaxConcurrencyTooLarge { value: usize, max: usize },
    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidSeconds { field: &'static str, value: f64 },
}
