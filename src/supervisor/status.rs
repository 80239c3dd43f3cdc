use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MonitorConfig;

/// Snapshot of the supervisor consumed by the `status` command and any
/// administrative front end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Supervisor believes the proxy is running
    pub active: bool,
    /// Current lifecycle phase
    pub state: String,
    /// Result of the most recent probe
    pub observed_active: bool,
    pub last_activity: Option<DateTime<Utc>>,
    /// Successful starts since the supervisor came up
    pub activity_count: u64,
    pub consecutive_start_failures: u32,
    pub config: MonitorConfig,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_expected_keys() {
        let report = StatusReport {
            active: false,
            state: "stopped".to_string(),
            observed_active: false,
            last_activity: None,
            activity_count: 0,
            consecutive_start_failures: 0,
            config: MonitorConfig::default(),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&report).unwrap();
        for key in ["active", "last_activity", "activity_count", "config", "timestamp"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert!(value["last_activity"].is_null());
        assert_eq!(value["config"]["proxy_port"], 1083);
    }
}
