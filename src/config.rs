//! Engine configuration.

use std::time::Duration;

/// Environment variable overriding [`EngineConfig::transfer_timeout`], in
/// milliseconds.
pub const TRANSFER_TIMEOUT_ENV: &str = "WALLET_TRANSFER_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one transfer attempt, storage round-trips included.
    pub transfer_timeout: Duration,
}

impl EngineConfig {
    pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Apply a raw millisecond value, as read from [`TRANSFER_TIMEOUT_ENV`].
    /// Returns `None` for anything that is not a positive integer.
    pub fn with_timeout_millis(self, raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Some(self.with_transfer_timeout(Duration::from_millis(ms))),
            _ => None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Self::DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}
