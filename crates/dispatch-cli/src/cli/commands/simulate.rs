//! `dispatch simulate` – run a synthetic batch through retry, breaker and launcher.

use anyhow::{ensure, Result};
use clap::Args;
use dispatch_core::breaker::{BreakerStats, CircuitBreaker};
use dispatch_core::config::DispatchConfig;
use dispatch_core::launcher::{BatchResult, ConcurrentLauncher};
use dispatch_core::retry::run_with_retry;
use rand::Rng;
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of units in the batch.
    #[arg(long, default_value = "20", value_name = "N")]
    pub units: usize,
    /// Maximum units running at once (overrides launcher.max_concurrency).
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
    /// Per-unit timeout in milliseconds; 0 disables it (overrides launcher.per_task_timeout_secs).
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
    /// Probability (0..=1) that a single remote call fails.
    #[arg(long, default_value = "0.3", value_name = "P")]
    pub failure_rate: f64,
    /// Latency of each simulated remote call.
    #[arg(long, default_value = "50", value_name = "MS")]
    pub latency_ms: u64,
    /// Print the batch and breaker stats as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Stand-in for a remote dependency that refuses a fraction of connections.
#[derive(Debug, Clone, Copy)]
struct FlakyRemote {
    failure_rate: f64,
    latency: Duration,
}

impl FlakyRemote {
    async fn call(&self, id: &str) -> io::Result<()> {
        tokio::time::sleep(self.latency).await;
        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{id}: connection refused"),
            ));
        }
        Ok(())
    }
}

pub async fn run_simulate(cfg: &DispatchConfig, args: &SimulateArgs) -> Result<()> {
    let (batch, stats) = simulate_batch(cfg, args).await?;
    if args.json {
        print_json(&batch, &stats)?;
    } else {
        print_table(&batch, &stats);
    }
    Ok(())
}

async fn simulate_batch(
    cfg: &DispatchConfig,
    args: &SimulateArgs,
) -> Result<(BatchResult, BreakerStats)> {
    ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "--failure-rate must be between 0 and 1 (got {})",
        args.failure_rate
    );

    let mut launcher_cfg = cfg.launcher.to_config()?;
    if let Some(n) = args.concurrency {
        launcher_cfg.max_concurrency = n;
    }
    if let Some(ms) = args.timeout_ms {
        launcher_cfg.per_task_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    let launcher = ConcurrentLauncher::new(launcher_cfg)?;
    let policy = cfg.retry.to_policy()?.with_label("remote call");

    let mut breaker = CircuitBreaker::new("remote", cfg.breaker.to_config()?)?;
    if !args.json {
        breaker = breaker.with_observer(|name, from, to| {
            eprintln!("circuit '{name}': {from} -> {to}");
        });
    }
    let breaker = Arc::new(breaker);

    let remote = FlakyRemote {
        failure_rate: args.failure_rate,
        latency: Duration::from_millis(args.latency_ms),
    };
    let units: Vec<String> = (1..=args.units).map(|i| format!("unit-{i:03}")).collect();
    tracing::info!(
        units = units.len(),
        failure_rate = args.failure_rate,
        "starting simulated batch"
    );

    let shared = Arc::clone(&breaker);
    let batch = launcher
        .launch(units, move |id: String| {
            let breaker = Arc::clone(&shared);
            let policy = policy.clone();
            async move {
                breaker
                    .call(|| run_with_retry(&policy, || remote.call(&id)))
                    .await
            }
        })
        .await;

    Ok((batch, breaker.stats()))
}

fn print_table(batch: &BatchResult, stats: &BreakerStats) {
    println!("{:<10} {:<8} {:>10} {}", "UNIT", "STATUS", "ELAPSED", "ERROR");
    for r in &batch.results {
        let status = if r.success {
            "ok"
        } else if r.is_timeout() {
            "timeout"
        } else {
            "failed"
        };
        let error = r.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
        println!(
            "{:<10} {:<8} {:>8}ms {}",
            r.id,
            status,
            r.elapsed.as_millis(),
            error
        );
    }
    println!();
    println!(
        "batch: {}/{} succeeded, {} failed in {:.2}s",
        batch.succeeded,
        batch.total,
        batch.failed,
        batch.elapsed.as_secs_f64()
    );
    println!(
        "breaker '{}': state={} calls={} successes={} failures={} blocked={}",
        stats.name,
        stats.state,
        stats.total_calls,
        stats.total_successes,
        stats.total_failures,
        stats.total_blocked
    );
}

fn print_json(batch: &BatchResult, stats: &BreakerStats) -> Result<()> {
    let results: Vec<_> = batch
        .results
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "success": r.success,
                "elapsed_ms": r.elapsed.as_millis() as u64,
                "error": r.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    let out = json!({
        "total": batch.total,
        "succeeded": batch.succeeded,
        "failed": batch.failed,
        "elapsed_ms": batch.elapsed.as_millis() as u64,
        "results": results,
        "breaker": serde_json::to_value(stats)?,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
