use std::time::Duration;

use thiserror::Error;

use crate::retry::{ErrorKind, Retryable};

/// A call was rejected without running because the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is OPEN; retry in {:.1}s", .remaining.as_secs_f64())]
pub struct CircuitOpenError {
    pub name: String,
    /// Time left until a probe is allowed (zero when probes are saturated).
    pub remaining: Duration,
}

/// Error returned by [`CircuitBreaker::call`](super::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Admission denied; the operation never ran.
    #[error(transparent)]
    Open(#[from] CircuitOpenError),
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open(_) => None,
        }
    }
}

/// A rejection is never retried here; the breaker already decided.
impl<E: Retryable> Retryable for BreakerError<E> {
    fn error_kind(&self) -> ErrorKind {
        match self {
            BreakerError::Open(_) => ErrorKind::Other,
            BreakerError::Inner(e) => e.error_kind(),
        }
    }
}
