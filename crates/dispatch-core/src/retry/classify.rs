//! Classify errors into retry policy error kinds.

use std::io;

use tokio::time::error::Elapsed;

use super::policy::ErrorKind;

/// Errors that know their own retry classification.
///
/// `run_with_retry` uses `is_transient` as its default classifier; use
/// `run_with_retry_if` to supply a different predicate.
pub trait Retryable {
    fn error_kind(&self) -> ErrorKind;

    fn is_transient(&self) -> bool {
        self.error_kind().is_transient()
    }
}

/// Classify an I/O error for retry decisions.
pub fn classify_io_error(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => ErrorKind::Connection,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::Unsupported => {
            ErrorKind::Other
        }
        _ => ErrorKind::Io,
    }
}

impl Retryable for io::Error {
    fn error_kind(&self) -> ErrorKind {
        classify_io_error(self)
    }
}

impl Retryable for Elapsed {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }
}

/// Walks the cause chain; the first I/O error or elapsed deadline decides.
impl Retryable for anyhow::Error {
    fn error_kind(&self) -> ErrorKind {
        for cause in self.chain() {
            if let Some(e) = cause.downcast_ref::<io::Error>() {
                return classify_io_error(e);
            }
            if cause.downcast_ref::<Elapsed>().is_some() {
                return ErrorKind::Timeout;
            }
        }
        ErrorKind::Other
    }
}
