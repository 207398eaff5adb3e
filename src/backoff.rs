//! Reconnect backoff for replacement workers.

use crate::config::BackoffConfig;
use std::time::Duration;

/// Population-wide exponential backoff.
///
/// The first failure after healthy streaming is replaced immediately.
/// Each further consecutive failure doubles the delay, starting at
/// `initial` and capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Delay before the next replacement; advances the failure streak.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.failures {
            0 => Duration::ZERO,
            n => {
                let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
                self.config
                    .initial
                    .saturating_mul(factor)
                    .min(self.config.max)
            }
        };
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// A worker streamed successfully; forget the failure streak.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
