//! In-process stand-in for a remote dependency with scriptable failures.
//!
//! Every call sleeps for the configured latency, then fails with a
//! connection error while the service is down or while the calling unit
//! has not yet used up its scripted failures.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FlakyService {
    latency: Duration,
    /// Failures each id sees before its calls start succeeding.
    fail_first: u32,
    down: AtomicBool,
    calls: AtomicU32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FlakyService {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call(&self, id: &str) -> io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(id.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        tokio::time::sleep(self.latency).await;

        if self.down.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "service down"));
        }
        if attempt <= self.fail_first {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("{id}: connection reset (attempt {attempt})"),
            ));
        }
        Ok(format!("{id}: done"))
    }
}
