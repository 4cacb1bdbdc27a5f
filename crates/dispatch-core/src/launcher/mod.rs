//! Bounded concurrent launcher.
//!
//! Runs one worker per work unit with at most `max_concurrency` workers in
//! flight, an optional per-worker timeout, and per-unit failure isolation.
//! Every outcome (success, error, timeout, panic) is folded into a
//! [`BatchResult`]; launching a batch never fails.

mod result;
mod run;
mod unit;

pub use result::{BatchResult, LaunchError, LaunchResult};
pub use run::{ConcurrentLauncher, LauncherConfig};
pub use unit::WorkUnit;
