//! `dispatch config` – print the effective configuration.

use anyhow::Result;
use dispatch_core::config::DispatchConfig;
use std::path::Path;

pub fn run_config(cfg: &DispatchConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
