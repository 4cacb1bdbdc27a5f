//! The breaker itself: admission, outcome recording and transitions.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConfigError;

use super::config::CircuitBreakerConfig;
use super::error::{BreakerError, CircuitOpenError};
use super::inner::{Admission, BreakerStats, CircuitState, Inner};

/// Callback fired once per state transition with `(name, old, new)`.
///
/// Runs after the breaker's lock is released, so it may read the breaker
/// (`state()`, `stats()`). Under concurrent callers, notifications for
/// back-to-back transitions can arrive out of order. A panic inside it is
/// caught and logged.
pub type StateObserver = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// `(old, new)` state pair of one transition.
type Transition = (CircuitState, CircuitState);

/// Circuit breaker guarding one remote dependency.
///
/// Admission decisions and counter updates happen under one mutex; the wrapped
/// operation runs outside it so slow I/O never blocks other callers.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    observer: Option<StateObserver>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("inner", &self.inner)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Hands a probe slot back if the call's future is dropped before finishing.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl ProbeGuard<'_> {
    fn disarm(&mut self) {
        self.admission = None;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission @ Admission::Probe { .. }) = self.admission {
            self.breaker.release_probe(admission);
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state. Fails if the config is invalid.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::default()),
            observer: None,
        })
    }

    /// Attach a transition observer. See [`StateObserver`] for when it runs.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Reads HalfOpen once an open circuit's cooldown elapsed,
    /// even before any call has moved the stored state.
    pub fn state(&self) -> CircuitState {
        self.lock().effective_state(&self.config, Instant::now())
    }

    /// Consecutive failures since the last success or reset.
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Successful calls since the last reset.
    pub fn success_count(&self) -> u64 {
        self.lock().success_count
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        let state = inner.effective_state(&self.config, Instant::now());
        inner.snapshot(&self.name, state)
    }

    /// Force the circuit Closed and zero every counter.
    pub fn reset(&self) {
        let changed = {
            let mut inner = self.lock();
            inner.clear();
            self.transition(&mut inner, CircuitState::Closed)
        };
        tracing::info!(breaker = %self.name, "circuit manually reset to closed");
        self.notify(changed);
    }

    /// Run `op` through the breaker.
    ///
    /// Returns `BreakerError::Open` without running `op` when the circuit is
    /// open (or all probe slots are taken), otherwise the operation's own
    /// result with its error wrapped in `BreakerError::Inner`.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            admission: Some(admission),
        };
        let outcome = op().await;
        guard.disarm();
        match outcome {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(admission, &e);
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing user-supplied runs under the lock, and a poisoned guard
        // still holds internally valid counters.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let (admitted, changed) = {
            let mut inner = self.lock();
            self.admit_locked(&mut inner, Instant::now())
        };
        self.notify(changed);
        admitted
    }

    fn admit_locked(
        &self,
        inner: &mut Inner,
        now: Instant,
    ) -> (Result<Admission, CircuitOpenError>, Option<Transition>) {
        inner.total_calls += 1;

        match inner.effective_state(&self.config, now) {
            CircuitState::Closed => (Ok(Admission::Normal), None),
            CircuitState::Open => {
                inner.total_blocked += 1;
                let remaining = inner.remaining_cooldown(&self.config, now);
                tracing::debug!(breaker = %self.name, ?remaining, "call blocked, circuit open");
                let err = CircuitOpenError {
                    name: self.name.clone(),
                    remaining,
                };
                (Err(err), None)
            }
            CircuitState::HalfOpen => {
                if inner.state == CircuitState::HalfOpen
                    && inner.half_open_in_flight >= self.config.half_open_max_calls
                {
                    inner.total_blocked += 1;
                    tracing::debug!(breaker = %self.name, "call blocked, probe already in flight");
                    let err = CircuitOpenError {
                        name: self.name.clone(),
                        remaining: Duration::ZERO,
                    };
                    return (Err(err), None);
                }
                let mut changed = None;
                if inner.state != CircuitState::HalfOpen {
                    inner.probe_generation = inner.probe_generation.wrapping_add(1);
                    inner.half_open_in_flight = 0;
                    changed = self.transition(inner, CircuitState::HalfOpen);
                }
                inner.half_open_in_flight += 1;
                let probe = Admission::Probe {
                    generation: inner.probe_generation,
                };
                (Ok(probe), changed)
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let changed = {
            let mut inner = self.lock();
            inner.total_successes += 1;
            inner.success_count += 1;
            inner.consecutive_failures = 0;

            if inner.is_current_probe(admission) {
                inner.half_open_in_flight = 0;
                tracing::info!(breaker = %self.name, "probe succeeded, circuit closed");
                self.transition(&mut inner, CircuitState::Closed)
            } else {
                None
            }
        };
        self.notify(changed);
    }

    fn record_failure<E: fmt::Display>(&self, admission: Admission, err: &E) {
        let changed = {
            let mut inner = self.lock();
            inner.total_failures += 1;
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            inner.last_failure_at = Some(Instant::now());

            let state = inner.state;
            match state {
                CircuitState::HalfOpen => {
                    inner.half_open_in_flight = 0;
                    let probe = matches!(admission, Admission::Probe { .. });
                    tracing::warn!(
                        breaker = %self.name,
                        probe,
                        "probe failed ({}), re-opening for {:.0}s",
                        err,
                        self.config.recovery_timeout.as_secs_f64()
                    );
                    self.transition(&mut inner, CircuitState::Open)
                }
                CircuitState::Closed
                    if inner.consecutive_failures >= self.config.failure_threshold =>
                {
                    tracing::warn!(
                        breaker = %self.name,
                        "{} consecutive failures ({}), opening for {:.0}s",
                        inner.consecutive_failures,
                        err,
                        self.config.recovery_timeout.as_secs_f64()
                    );
                    self.transition(&mut inner, CircuitState::Open)
                }
                _ => None,
            }
        };
        self.notify(changed);
    }

    fn release_probe(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.is_current_probe(admission) {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            tracing::debug!(breaker = %self.name, "probe cancelled, slot released");
        }
    }

    /// Move the stored state; returns `(old, new)` if it actually changed.
    fn transition(&self, inner: &mut Inner, new_state: CircuitState) -> Option<Transition> {
        let old_state = inner.state;
        if old_state == new_state {
            return None;
        }
        inner.state = new_state;
        tracing::info!(breaker = %self.name, from = %old_state, to = %new_state, "circuit state change");
        Some((old_state, new_state))
    }

    /// Fire the observer for a transition. Must be called with the lock released.
    fn notify(&self, changed: Option<Transition>) {
        let (Some((old_state, new_state)), Some(observer)) = (changed, &self.observer) else {
            return;
        };
        let fired = panic::catch_unwind(AssertUnwindSafe(|| {
            observer(&self.name, old_state, new_state)
        }));
        if fired.is_err() {
            tracing::error!(breaker = %self.name, "state change observer panicked");
        }
    }
}
