//! Launch a batch of units with a per-batch admission gate.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::error::ConfigError;

use super::result::{BatchResult, LaunchError, LaunchResult};
use super::unit::WorkUnit;

/// Launcher settings. Read-only once the launcher is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Maximum number of workers running at once.
    pub max_concurrency: usize,
    /// Per-worker deadline, counted from admission. `None` = no timeout.
    pub per_task_timeout: Option<Duration>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            per_task_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Runs many independent workers with bounded parallelism.
///
/// Reusable across batches; each call to [`launch`](Self::launch) gets its
/// own admission gate.
#[derive(Debug, Clone)]
pub struct ConcurrentLauncher {
    config: LauncherConfig,
}

impl LauncherConfig {
    /// `max_concurrency` must fit the admission gate: `1..=Semaphore::MAX_PERMITS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < 1 {
            return Err(ConfigError::MaxConcurrency);
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::MaxConcurrencyTooLarge {
                value: self.max_concurrency,
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(())
    }
}

impl ConcurrentLauncher {
    pub fn new(config: LauncherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Run `start` once per unit and report every outcome in input order.
    ///
    /// Each unit runs in its own task, so an error, panic or timeout in one
    /// unit never disturbs the others. A timed-out worker is dropped, which
    /// cancels it at its next await point.
    pub async fn launch<U, F, Fut, E>(
        &self,
        units: impl IntoIterator<Item = U>,
        start: F,
    ) -> BatchResult
    where
        U: WorkUnit + Send + 'static,
        F: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let units: Vec<U> = units.into_iter().collect();
        if units.is_empty() {
            return BatchResult::default();
        }

        let batch_start = Instant::now();
        let gate = Arc::new(Semaphore::new(self.config.max_concurrency));
        let start = Arc::new(start);
        let mut ids = Vec::with_capacity(units.len());
        let mut pending = HashMap::with_capacity(units.len());
        // Dropping the set aborts every unit still running.
        let mut tasks = JoinSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            let id = unit.id();
            let submitted = Instant::now();
            let handle = tasks.spawn(launch_one(
                id.clone(),
                unit,
                Arc::clone(&gate),
                Arc::clone(&start),
                self.config.per_task_timeout,
                submitted,
            ));
            pending.insert(handle.id(), (index, submitted));
            ids.push(id);
        }

        // Collected in completion order so a panic is timed when it happens,
        // then slotted back into input order.
        let mut slots: Vec<Option<LaunchResult>> = vec![None; ids.len()];
        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, result)) => (task_id, Ok(result)),
                Err(err) => (err.id(), Err(err)),
            };
            let Some((index, submitted)) = pending.remove(&task_id) else {
                continue;
            };
            slots[index] = Some(match outcome {
                Ok(result) => result,
                Err(err) => join_failure(ids[index].clone(), submitted.elapsed(), err),
            });
        }

        let results = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| LaunchResult::failed(id, Duration::ZERO, LaunchError::Aborted))
            })
            .collect();

        let batch = BatchResult::from_results(results, batch_start.elapsed());
        tracing::info!(
            succeeded = batch.succeeded,
            failed = batch.failed,
            elapsed_ms = batch.elapsed.as_millis() as u64,
            "launch complete: {}/{} ok, {} failed, {:.0}ms total",
            batch.succeeded,
            batch.total,
            batch.failed,
            batch.elapsed.as_secs_f64() * 1000.0
        );
        batch
    }
}

async fn launch_one<U, F, Fut, E>(
    id: String,
    unit: U,
    gate: Arc<Semaphore>,
    start: Arc<F>,
    timeout: Option<Duration>,
    submitted: Instant,
) -> LaunchResult
where
    F: Fn(U) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    let outcome = {
        let Ok(_permit) = gate.acquire().await else {
            return LaunchResult::failed(id, submitted.elapsed(), LaunchError::Aborted);
        };
        let work = (*start)(unit);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(done) => done.map_err(|e| LaunchError::Failed(e.to_string())),
                Err(_) => Err(LaunchError::Timeout {
                    id: id.clone(),
                    after: limit,
                }),
            },
            None => work.await.map_err(|e| LaunchError::Failed(e.to_string())),
        }
        // permit released here, before the outcome is recorded
    };

    let elapsed = submitted.elapsed();
    match outcome {
        Ok(()) => {
            tracing::debug!(unit = %id, elapsed_ms = elapsed.as_millis() as u64, "launched");
            LaunchResult::ok(id, elapsed)
        }
        Err(err) => {
            tracing::warn!(unit = %id, elapsed_ms = elapsed.as_millis() as u64, "launch failed: {}", err);
            LaunchResult::failed(id, elapsed, err)
        }
    }
}

/// A unit task that never produced a result: it panicked or was aborted.
fn join_failure(id: String, elapsed: Duration, err: JoinError) -> LaunchResult {
    let error = if err.is_panic() {
        LaunchError::Panicked(panic_message(err.into_panic()))
    } else {
        LaunchError::Aborted
    };
    tracing::error!(unit = %id, "launch task did not complete: {}", error);
    LaunchResult::failed(id, elapsed, error)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(msg) => (*msg).to_string(),
            None => "unknown panic".to_string(),
        },
    }
}
