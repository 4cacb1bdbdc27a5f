use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::*;
use crate::error::ConfigError;
use crate::retry::{run_with_retry, RetryPolicy};

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new("test", CircuitBreakerConfig::new(3, Duration::from_millis(500))).unwrap()
}

async fn succeed(cb: &CircuitBreaker) -> Result<&'static str, BreakerError<io::Error>> {
    cb.call(|| async { Ok("ok") }).await
}

async fn fail(cb: &CircuitBreaker) -> Result<&'static str, BreakerError<io::Error>> {
    cb.call(|| async { Err(io::Error::new(io::ErrorKind::ConnectionRefused, "api down")) })
        .await
}

async fn trip(cb: &CircuitBreaker) {
    for _ in 0..cb.config().failure_threshold {
        assert!(matches!(fail(cb).await, Err(BreakerError::Inner(_))));
    }
}

#[tokio::test]
async fn starts_closed_and_success_stays_closed() {
    let cb = breaker();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(succeed(&cb).await.unwrap(), "ok");
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let cb = breaker();
    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.failure_count(), 2);
    assert_eq!(cb.state(), CircuitState::Closed);
    succeed(&cb).await.unwrap();
    assert_eq!(cb.failure_count(), 0);
    // Two more failures must not trip a threshold of three.
    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn opens_after_threshold_and_recovers_through_probe() {
    let cb = breaker();
    trip(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    let err = succeed(&cb).await.unwrap_err();
    let BreakerError::Open(open) = err else {
        panic!("expected circuit open error");
    };
    assert_eq!(open.name, "test");
    assert!(open.remaining > Duration::ZERO);
    assert!(open.remaining <= Duration::from_millis(500));
    assert!(open.to_string().contains("OPEN"));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    assert_eq!(succeed(&cb).await.unwrap(), "ok");
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn never_half_open_before_recovery_timeout() {
    let cb = breaker();
    trip(&cb).await;
    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(cb.state(), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn probe_failure_reopens_and_restarts_cooldown() {
    let cb = breaker();
    trip(&cb).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(matches!(fail(&cb).await, Err(BreakerError::Inner(_))));
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cb.state(), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn single_probe_failure_reopens_despite_high_threshold() {
    let cb = CircuitBreaker::new("high", CircuitBreakerConfig::new(5, Duration::from_millis(100)))
        .unwrap();
    trip(&cb).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(succeed(&cb).await.unwrap_err().is_open());
}

#[tokio::test(start_paused = true)]
async fn concurrent_probes_beyond_limit_are_rejected() {
    let cb = breaker();
    trip(&cb).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let probe = cb.call(|| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, io::Error>(1)
    });
    let second = async {
        tokio::task::yield_now().await;
        cb.call(|| async { Ok::<_, io::Error>(2) }).await
    };
    let (first, second) = tokio::join!(probe, second);

    assert_eq!(first.unwrap(), 1);
    match second {
        Err(BreakerError::Open(open)) => assert_eq!(open.remaining, Duration::ZERO),
        other => panic!("expected rejection, got {:?}", other.map_err(|e| e.to_string())),
    }
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn multiple_probe_slots() {
    let cb = CircuitBreaker::new(
        "multi",
        CircuitBreakerConfig::new(1, Duration::from_millis(50)).with_half_open_max_calls(2),
    )
    .unwrap();
    fail(&cb).await.unwrap_err();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let slow = || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, io::Error>(())
    };
    let third = async {
        tokio::task::yield_now().await;
        cb.call(|| async { Ok::<_, io::Error>(()) }).await
    };
    let (a, b, c) = tokio::join!(cb.call(slow), cb.call(slow), third);
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(c.unwrap_err().is_open());
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_probe_releases_its_slot() {
    let cb = breaker();
    trip(&cb).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, io::Error>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    assert_eq!(succeed(&cb).await.unwrap(), "ok");
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test]
async fn stats_tracking() {
    let cb = breaker();
    succeed(&cb).await.unwrap();
    succeed(&cb).await.unwrap();
    fail(&cb).await.unwrap_err();

    let stats = cb.stats();
    assert_eq!(stats.name, "test");
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.total_calls, 3);
    assert_eq!(stats.total_successes, 2);
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.total_blocked, 0);
    assert_eq!(cb.success_count(), 2);
}

#[tokio::test]
async fn blocked_calls_are_counted() {
    let cb = breaker();
    trip(&cb).await;
    succeed(&cb).await.unwrap_err();

    let stats = cb.stats();
    assert_eq!(stats.total_blocked, 1);
    assert_eq!(stats.total_calls, 4);
    assert_eq!(stats.state, CircuitState::Open);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let cb = breaker();
    trip(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    cb.reset();
    let first = cb.stats();
    cb.reset();
    cb.reset();
    assert_eq!(cb.stats(), first);
    assert_eq!(first.state, CircuitState::Closed);
    assert_eq!(first.failure_count, 0);
    assert_eq!(first.total_calls, 0);
    assert_eq!(first.total_blocked, 0);

    assert_eq!(succeed(&cb).await.unwrap(), "ok");
}

#[tokio::test(start_paused = true)]
async fn observer_fires_once_per_transition() {
    let seen: Arc<Mutex<Vec<(String, CircuitState, CircuitState)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let cb = CircuitBreaker::new("cb-test", CircuitBreakerConfig::new(2, Duration::from_millis(300)))
        .unwrap()
        .with_observer(move |name, old, new| {
            sink.lock().unwrap().push((name.to_string(), old, new));
        });

    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[("cb-test".to_string(), CircuitState::Closed, CircuitState::Open)]
    );

    // Reading the lazily computed state is not a transition.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert_eq!(seen.lock().unwrap().len(), 1);

    succeed(&cb).await.unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!((seen[1].1, seen[1].2), (CircuitState::Open, CircuitState::HalfOpen));
    assert_eq!((seen[2].1, seen[2].2), (CircuitState::HalfOpen, CircuitState::Closed));
}

#[tokio::test]
async fn observer_can_read_the_breaker_it_watches() {
    let seen: Arc<Mutex<Vec<BreakerStats>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let cb = Arc::new_cyclic(|me: &Weak<CircuitBreaker>| {
        let me = me.clone();
        CircuitBreaker::new("alerting", CircuitBreakerConfig::new(1, Duration::from_secs(60)))
            .unwrap()
            .with_observer(move |_, _, _| {
                if let Some(cb) = me.upgrade() {
                    sink.lock().unwrap().push(cb.stats());
                }
            })
    });

    fail(&cb).await.unwrap_err();
    cb.reset();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].state, CircuitState::Open);
    assert_eq!(seen[0].total_failures, 1);
    assert_eq!(seen[1].state, CircuitState::Closed);
    assert_eq!(seen[1].total_calls, 0);
}

#[tokio::test]
async fn panicking_observer_does_not_corrupt_state() {
    let cb = CircuitBreaker::new("boom", CircuitBreakerConfig::new(1, Duration::from_secs(60)))
        .unwrap()
        .with_observer(|_, _, _| panic!("observer bug"));

    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(succeed(&cb).await.unwrap_err().is_open());
    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(succeed(&cb).await.unwrap(), "ok");
}

#[test]
fn invalid_config_is_rejected() {
    let zero_threshold = CircuitBreakerConfig::new(0, Duration::from_secs(1));
    assert_eq!(
        CircuitBreaker::new("x", zero_threshold).unwrap_err(),
        ConfigError::FailureThreshold
    );
    let zero_probes = CircuitBreakerConfig::default().with_half_open_max_calls(0);
    assert_eq!(
        CircuitBreaker::new("x", zero_probes).unwrap_err(),
        ConfigError::HalfOpenMaxCalls
    );
}

#[tokio::test]
async fn outer_retry_does_not_retry_a_rejection() {
    let cb = breaker();
    trip(&cb).await;
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));

    let out = run_with_retry(&policy, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        succeed(&cb)
    })
    .await;

    let err = out.unwrap_err();
    assert!(err.is_open());
    assert!(err.into_inner().is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(cb.stats().total_blocked, 1);
}

#[tokio::test(start_paused = true)]
async fn outer_retry_retries_transient_inner_errors() {
    let cb = CircuitBreaker::new("outer", CircuitBreakerConfig::new(10, Duration::from_secs(60))).unwrap();
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));

    let out = run_with_retry(&policy, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        fail(&cb)
    })
    .await;

    let err = out.unwrap_err().into_inner().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(cb.failure_count(), 4);
    assert_eq!(cb.state(), CircuitState::Closed);
}
