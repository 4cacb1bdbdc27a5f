//! Breaker state and counters guarded by the breaker's mutex.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::config::CircuitBreakerConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls flow through.
    #[default]
    Closed,
    /// Failures exceeded the threshold, calls are blocked.
    Open,
    /// Cooldown elapsed, probe calls test whether the dependency recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_blocked: u64,
    pub total_successes: u64,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Admission {
    Normal,
    /// Half-open probe; `generation` identifies the half-open episode.
    Probe { generation: u64 },
}

#[derive(Debug, Default)]
pub(super) struct Inner {
    /// Stored state; may still read Open after the cooldown until a call arrives.
    pub(super) state: CircuitState,
    pub(super) consecutive_failures: u32,
    pub(super) success_count: u64,
    pub(super) last_failure_at: Option<Instant>,
    pub(super) half_open_in_flight: u32,
    /// Bumped each time a half-open episode starts (and on reset).
    pub(super) probe_generation: u64,
    pub(super) total_calls: u64,
    pub(super) total_successes: u64,
    pub(super) total_failures: u64,
    pub(super) total_blocked: u64,
}

impl Inner {
    fn cooldown_elapsed(&self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.last_failure_at {
            Some(at) => now.saturating_duration_since(at) >= config.recovery_timeout,
            None => true,
        }
    }

    /// State as callers see it: Open reads as HalfOpen once the cooldown elapsed.
    pub(super) fn effective_state(&self, config: &CircuitBreakerConfig, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open && self.cooldown_elapsed(config, now) {
            CircuitState::HalfOpen
        } else {
            self.state
        }
    }

    /// Cooldown left before a probe is allowed, floored at zero.
    pub(super) fn remaining_cooldown(&self, config: &CircuitBreakerConfig, now: Instant) -> Duration {
        match self.last_failure_at {
            Some(at) => config
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }

    /// Zero every counter; bumping the generation makes in-flight probes stale.
    pub(super) fn clear(&mut self) {
        let generation = self.probe_generation.wrapping_add(1);
        let state = self.state;
        *self = Inner {
            state,
            probe_generation: generation,
            ..Inner::default()
        };
    }

    pub(super) fn is_current_probe(&self, admission: Admission) -> bool {
        match admission {
            Admission::Probe { generation } => {
                self.state == CircuitState::HalfOpen && generation == self.probe_generation
            }
            Admission::Normal => false,
        }
    }

    pub(super) fn snapshot(&self, name: &str, state: CircuitState) -> BreakerStats {
        BreakerStats {
            name: name.to_string(),
            state,
            failure_count: self.consecutive_failures,
            total_calls: self.total_calls,
            total_failures: self.total_failures,
            total_blocked: self.total_blocked,
            total_successes: self.total_successes,
        }
    }
}
