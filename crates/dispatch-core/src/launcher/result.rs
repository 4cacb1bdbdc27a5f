//! Per-unit and per-batch launch outcomes.

use std::time::Duration;

use thiserror::Error;

/// Why a unit did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// The worker did not finish within the per-task timeout and was cancelled.
    #[error("timeout ({:.3}s) launching {id}", .after.as_secs_f64())]
    Timeout { id: String, after: Duration },
    /// The worker returned an error.
    #[error("{0}")]
    Failed(String),
    /// The worker panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
    /// The unit was cancelled before completing (admission gate closed or task aborted).
    #[error("worker was cancelled before completing")]
    Aborted,
}

/// Result of a single unit's launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchResult {
    pub id: String,
    pub success: bool,
    /// Wall-clock time from submission (including admission wait) to outcome.
    pub elapsed: Duration,
    pub error: Option<LaunchError>,
}

impl LaunchResult {
    pub fn ok(id: String, elapsed: Duration) -> Self {
        Self {
            id,
            success: true,
            elapsed,
            error: None,
        }
    }

    pub fn failed(id: String, elapsed: Duration, error: LaunchError) -> Self {
        Self {
            id,
            success: false,
            elapsed,
            error: Some(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(LaunchError::Timeout { .. }))
    }
}

/// Aggregated result of one batch. `results[i]` belongs to the i-th submitted unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub results: Vec<LaunchResult>,
}

impl BatchResult {
    /// Build a batch from ordered per-unit results; counts are derived from them.
    pub fn from_results(results: Vec<LaunchResult>, elapsed: Duration) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            elapsed,
            results,
        }
    }

    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &LaunchResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
