//! Circuit breaker for a shared remote dependency.
//!
//! # States
//! - Closed: calls pass through
//! - Open: dependency assumed down, calls fail fast with [`CircuitOpenError`]
//! - HalfOpen: a limited number of probe calls test whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     failure_threshold consecutive failures
//! Open     → HalfOpen: first call attempted after recovery_timeout
//! HalfOpen → Closed:   probe succeeds
//! HalfOpen → Open:     probe fails (cooldown restarts)
//! ```
//!
//! There is no timer: `state()` derives HalfOpen from the time of the last
//! failure, and the stored state only moves when a call is attempted.

mod circuit;
mod config;
mod error;
mod inner;

pub use circuit::{CircuitBreaker, StateObserver};
pub use config::CircuitBreakerConfig;
pub use error::{BreakerError, CircuitOpenError};
pub use inner::{BreakerStats, CircuitState};

#[cfg(test)]
mod tests;
