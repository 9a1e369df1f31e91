//! Timeout configuration.
//!
//! A process-wide default seeds `Config::default()`. Transports copy the
//! duration when they are built, so changing the default later never reaches
//! a transport that already exists. Code that needs a specific budget should
//! build a `Config` explicitly instead of touching the global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Budget used when nothing has called `set_default_timeout`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static DEFAULT_TIMEOUT_NANOS: AtomicU64 = AtomicU64::new(30_000_000_000);

/// Replace the process-wide default timeout.
pub fn set_default_timeout(timeout: Duration) {
    let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
    DEFAULT_TIMEOUT_NANOS.store(nanos, Ordering::Relaxed);
}

pub fn default_timeout() -> Duration {
    Duration::from_nanos(DEFAULT_TIMEOUT_NANOS.load(Ordering::Relaxed))
}

/// Settings read once when a client's transport is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Total budget for dialing plus waiting for response headers.
    pub timeout: Duration,
}

impl Config {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}
