//! Activity bookkeeping for start/stop hysteresis

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Remembers the most recent moment the proxy was reachable or in use
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    last_activity: Option<DateTime<Utc>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Time since the last activity; timestamps ahead of `now` count as zero
    fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_activity
            .map(|last| (now - last).to_std().unwrap_or(Duration::ZERO))
    }

    /// True when activity was recorded less than `threshold_minutes` ago
    pub fn is_within_activity_window(&self, now: DateTime<Utc>, threshold_minutes: u64) -> bool {
        let window = Duration::from_secs(threshold_minutes.saturating_mul(60));
        self.elapsed(now).is_some_and(|elapsed| elapsed < window)
    }

    /// True when activity was recorded more than `idle_timeout` ago
    pub fn is_idle_beyond(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        self.elapsed(now).is_some_and(|elapsed| elapsed > idle_timeout)
    }
}
