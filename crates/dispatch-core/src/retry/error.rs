//! Error type for blocking calls run on the blocking pool.

use thiserror::Error;
use tokio::task::JoinError;

use super::classify::Retryable;
use super::policy::ErrorKind;

/// Error returned by `run_blocking_with_retry`.
#[derive(Debug, Error)]
pub enum BlockingCallError<E> {
    /// The blocking call ran and returned an error.
    #[error("{0}")]
    Call(E),
    /// The blocking task panicked or was cancelled by runtime shutdown. Not retried.
    #[error("blocking call did not complete: {0}")]
    Join(#[from] JoinError),
}

impl<E> BlockingCallError<E> {
    /// The call's own error, if it got that far.
    pub fn into_call_error(self) -> Option<E> {
        match self {
            BlockingCallError::Call(e) => Some(e),
            BlockingCallError::Join(_) => None,
        }
    }
}

impl<E: Retryable> Retryable for BlockingCallError<E> {
    fn error_kind(&self) -> ErrorKind {
        match self {
            BlockingCallError::Call(e) => e.error_kind(),
            BlockingCallError::Join(_) => ErrorKind::Other,
        }
    }
}
