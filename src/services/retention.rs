//! Log retention
//!
//! The daily rolling appender names files `proxy-monitor.log.YYYY-MM-DD`.
//! Cleanup removes those whose embedded date falls outside the retention
//! window and leaves every other file alone.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// File name prefix shared with the rolling appender
pub const LOG_FILE_PREFIX: &str = "proxy-monitor.log";

/// Directory holding rolled log files
pub fn log_dir() -> PathBuf {
    std::env::var("PROXY_MONITOR_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

/// Date embedded in a rolled log file name
fn log_file_date(file_name: &str) -> Option<NaiveDate> {
    let suffix = file_name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
}

/// Delete rolled logs older than `retention_days` relative to `today`.
///
/// Returns the number of files removed. A missing directory removes nothing.
pub fn cleanup_old_logs(dir: &Path, retention_days: u64, today: NaiveDate) -> Result<usize> {
    if !dir.exists() {
        debug!("Log directory {} does not exist, nothing to clean", dir.display());
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(date) = file_name.to_str().and_then(log_file_date) else {
            continue;
        };

        // Future-dated files have a negative age and are kept
        let Ok(age_days) = u64::try_from((today - date).num_days()) else {
            continue;
        };
        if age_days <= retention_days {
            continue;
        }

        let path = entry.path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed old log file {} ({} days old)", path.display(), age_days);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove old log file {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"line\n").unwrap();
    }

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("proxy-monitor.log.2026-10-01"),
            NaiveDate::from_ymd_opt(2026, 10, 1)
        );
        assert_eq!(log_file_date("proxy-monitor.log"), None);
        assert_eq!(log_file_date("proxy-monitor.log.yesterday"), None);
        assert_eq!(log_file_date("other.log.2026-10-01"), None);
    }

    #[test]
    fn test_cleanup_removes_only_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "proxy-monitor.log.2026-10-19");
        touch(dir.path(), "proxy-monitor.log.2026-10-12");
        touch(dir.path(), "proxy-monitor.log.2026-10-11");
        touch(dir.path(), "proxy-monitor.log.2026-09-01");
        touch(dir.path(), "notes.txt");

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let removed = cleanup_old_logs(dir.path(), 7, today).unwrap();

        assert_eq!(removed, 2);
        assert!(dir.path().join("proxy-monitor.log.2026-10-19").exists());
        assert!(dir.path().join("proxy-monitor.log.2026-10-12").exists());
        assert!(!dir.path().join("proxy-monitor.log.2026-10-11").exists());
        assert!(!dir.path().join("proxy-monitor.log.2026-09-01").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_of_missing_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let removed = cleanup_old_logs(&dir.path().join("absent"), 7, today).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "proxy-monitor.log.2026-10-19");
        touch(dir.path(), "proxy-monitor.log.2001-01-01");

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let removed = cleanup_old_logs(dir.path(), u64::MAX, today).unwrap();

        assert_eq!(removed, 0);
        assert!(dir.path().join("proxy-monitor.log.2026-10-19").exists());
        assert!(dir.path().join("proxy-monitor.log.2001-01-01").exists());
    }

    #[test]
    fn test_future_dated_log_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "proxy-monitor.log.2026-12-01");

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), 0, today).unwrap(), 0);
        assert!(dir.path().join("proxy-monitor.log.2026-12-01").exists());
    }
}
