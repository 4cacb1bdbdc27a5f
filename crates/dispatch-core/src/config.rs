use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::launcher::LauncherConfig;
use crate::retry::RetryPolicy;

/// Circuit breaker thresholds (`[breaker]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a probe is allowed.
    pub recovery_timeout_secs: f64,
    /// Concurrent probe calls allowed while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60.0,
            half_open_max_calls: 1,
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> Result<CircuitBreakerConfig, ConfigError> {
        let config = CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: secs("breaker.recovery_timeout_secs", self.recovery_timeout_secs)?,
            half_open_max_calls: self.half_open_max_calls,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Retry policy parameters (`[retry]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: f64,
    /// Randomize each delay within [50%, 100%].
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30.0,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.max_retries,
            secs("retry.base_delay_secs", self.base_delay_secs)?,
            secs("retry.max_delay_secs", self.max_delay_secs)?,
        )
        .with_jitter(self.jitter))
    }
}

/// Concurrent launcher parameters (`[launcher]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Maximum workers running at once.
    pub max_concurrency: usize,
    /// Per-worker timeout in seconds; omit for no timeout.
    pub per_task_timeout_secs: Option<f64>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            per_task_timeout_secs: Some(30.0),
        }
    }
}

impl LauncherSettings {
    pub fn to_config(&self) -> Result<LauncherConfig, ConfigError> {
        let per_task_timeout = self
            .per_task_timeout_secs
            .map(|s| secs("launcher.per_task_timeout_secs", s))
            .transpose()?;
        let config = LauncherConfig {
            max_concurrency: self.max_concurrency,
            per_task_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Global configuration loaded from `~/.config/dispatch/config.toml`.
///
/// Every section and every field has a default, so a file only needs the
/// settings it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub launcher: LauncherSettings,
}

impl DispatchConfig {
    /// Check every section converts into a valid component config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breaker.to_config()?;
        self.retry.to_policy()?;
        self.launcher.to_config()?;
        Ok(())
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { field, value })
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dispatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load and validate configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<DispatchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: DispatchConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DispatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DispatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}
