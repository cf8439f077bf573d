use std::time::{Duration, Instant};

/// Tracks when the manual data source last delivered a sample.
///
/// `last_update == None` means nothing has arrived since the last reset,
/// which is never treated as a timeout.
#[derive(Debug, Clone)]
pub struct StalenessWatchdog {
    last_update: Option<Instant>,
    timeout: Duration,
}

impl StalenessWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { last_update: None, timeout }
    }

    pub fn record_update(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    /// Strictly greater than `timeout`; hitting it exactly is still fresh.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_update {
            Some(t) => now.saturating_duration_since(t) > self.timeout,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_update = None;
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_update.map(|t| now.saturating_duration_since(t))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
