use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};

/// Default location of the persisted configuration document
pub const DEFAULT_CONFIG_FILE: &str = "proxy_config.json";

/// Prefix for runtime overrides (PROXY_MONITOR_IDLE_TIMEOUT, etc.)
const ENV_PREFIX: &str = "PROXY_MONITOR";

/// Upper bound on every configured duration (30 days)
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Monitor configuration, persisted as a flat JSON document.
///
/// Durations are whole seconds except `activity_threshold`, which is minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Host of the managed proxy
    pub proxy_host: String,
    /// Port of the managed proxy
    pub proxy_port: u16,
    /// How long a started proxy may take to become reachable
    pub startup_timeout: u64,
    /// Inactivity after which a running proxy is stopped
    pub idle_timeout: u64,
    /// Seconds between supervisor ticks
    pub health_check_interval: u64,
    /// Minutes within which recorded activity justifies a start
    pub activity_threshold: u64,
    /// Restart the proxy when it dies outside our control
    pub auto_restart: bool,
    /// Days of log files to keep
    pub log_retention_days: u64,
    /// Master switch for all automatic transitions
    pub monitoring_enabled: bool,
    /// Bound on one lifecycle command invocation
    pub command_timeout: u64,
    /// Bound on one health probe
    pub probe_timeout: u64,
    /// Delay between verification probes after a start
    pub startup_poll_interval: u64,
    /// Lifecycle command, invoked as `<script> start|stop`
    pub lifecycle_script: PathBuf,
    /// Successful starts between log cleanups
    pub cleanup_every: u64,
    /// Consecutive failed starts before automatic starts are suspended (0 = never)
    pub max_start_failures: u32,
    /// Pid file written by the running monitor
    pub pid_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proxy_host: "192.168.31.147".to_string(),
            proxy_port: 1083,
            startup_timeout: 60,
            idle_timeout: 300,
            health_check_interval: 30,
            activity_threshold: 5,
            auto_restart: true,
            log_retention_days: 7,
            monitoring_enabled: true,
            command_timeout: 120,
            probe_timeout: 5,
            startup_poll_interval: 5,
            lifecycle_script: PathBuf::from("./scripts/on_demand_proxy.sh"),
            cleanup_every: 100,
            max_start_failures: 0,
            pid_file: PathBuf::from("proxy-monitor.pid"),
        }
    }
}

/// Address of the managed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// URL used for reachability probes
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl MonitorConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.proxy_host.clone(), self.proxy_port)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_secs(self.startup_poll_interval)
    }

    /// Builder seeded with every default so partial documents are backfilled
    fn builder_with_defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        let d = Self::default();

        Config::builder()
            .set_default("proxy_host", d.proxy_host.clone())?
            .set_default("proxy_port", i64::from(d.proxy_port))?
            .set_default("startup_timeout", d.startup_timeout as i64)?
            .set_default("idle_timeout", d.idle_timeout as i64)?
            .set_default("health_check_interval", d.health_check_interval as i64)?
            .set_default("activity_threshold", d.activity_threshold as i64)?
            .set_default("auto_restart", d.auto_restart)?
            .set_default("log_retention_days", d.log_retention_days as i64)?
            .set_default("monitoring_enabled", d.monitoring_enabled)?
            .set_default("command_timeout", d.command_timeout as i64)?
            .set_default("probe_timeout", d.probe_timeout as i64)?
            .set_default("startup_poll_interval", d.startup_poll_interval as i64)?
            .set_default(
                "lifecycle_script",
                d.lifecycle_script.to_string_lossy().into_owned(),
            )?
            .set_default("cleanup_every", d.cleanup_every as i64)?
            .set_default("max_start_failures", i64::from(d.max_start_failures))?
            .set_default("pid_file", d.pid_file.to_string_lossy().into_owned())
    }

    /// Read the persisted document merged over the defaults.
    ///
    /// A missing file yields the defaults; a malformed or invalid one is an error.
    pub fn read_persisted<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config: Self = Self::builder_with_defaults()?
            .add_source(
                File::new(&path.to_string_lossy(), FileFormat::Json).required(false),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(MonitorError::InvalidConfig)?;
        Ok(config)
    }

    /// Write the canonical form of this configuration
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;
        debug!("Persisted configuration to {}", path.display());
        Ok(())
    }

    /// Load configuration for a run.
    ///
    /// Never fails: an unusable document falls back to the defaults. The merged
    /// result is written back so the file always shows every key. Environment
    /// overrides apply afterwards and are not persisted.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let config = match Self::read_persisted(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Could not load configuration from {}, using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        };

        if let Err(e) = config.persist(path) {
            warn!("Could not persist configuration to {}: {}", path.display(), e);
        }

        config.with_env_overrides()
    }

    /// Layer `PROXY_MONITOR_*` variables over this configuration
    pub fn with_env_overrides(self) -> Self {
        let layered = Config::try_from(&self)
            .and_then(|base| {
                Config::builder()
                    .add_source(base)
                    .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
                    .build()
            })
            .and_then(|c| c.try_deserialize::<Self>());

        match layered {
            Ok(config) => match config.validate() {
                Ok(()) => {
                    if config != self {
                        info!("Applied {}_* environment overrides", ENV_PREFIX);
                    }
                    config
                }
                Err(errors) => {
                    warn!("Ignoring invalid environment overrides: {}", errors.join("; "));
                    self
                }
            },
            Err(e) => {
                warn!("Ignoring unreadable environment overrides: {}", e);
                self
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let durations = [
            ("startup_timeout", self.startup_timeout),
            ("idle_timeout", self.idle_timeout),
            ("health_check_interval", self.health_check_interval),
            ("activity_threshold", self.activity_threshold),
            ("command_timeout", self.command_timeout),
            ("probe_timeout", self.probe_timeout),
            ("startup_poll_interval", self.startup_poll_interval),
        ];
        for (name, value) in durations {
            if value == 0 {
                errors.push(format!("{name} must be positive"));
            }
        }

        let in_seconds = [
            ("startup_timeout", self.startup_timeout),
            ("idle_timeout", self.idle_timeout),
            ("health_check_interval", self.health_check_interval),
            ("activity_threshold", self.activity_threshold.saturating_mul(60)),
            ("command_timeout", self.command_timeout),
            ("probe_timeout", self.probe_timeout),
            ("startup_poll_interval", self.startup_poll_interval),
        ];
        for (name, secs) in in_seconds {
            if secs > MAX_DURATION_SECS {
                errors.push(format!("{name} must not exceed {MAX_DURATION_SECS}s"));
            }
        }

        if self.cleanup_every == 0 {
            errors.push("cleanup_every must be positive".to_string());
        }

        if self.proxy_host.trim().is_empty() {
            errors.push("proxy_host must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");

        let config = MonitorConfig::load_or_init(&path);
        assert_eq!(config, MonitorConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_document_is_backfilled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");
        std::fs::write(&path, r#"{"proxy_port": 2080, "auto_restart": false}"#).unwrap();

        let config = MonitorConfig::load_or_init(&path);

        let expected = MonitorConfig {
            proxy_port: 2080,
            auto_restart: false,
            ..MonitorConfig::default()
        };
        assert_eq!(config, expected);
    }

    #[test]
    fn test_repersist_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");
        std::fs::write(&path, r#"{"idle_timeout": 900, "proxy_host": "10.0.0.2"}"#).unwrap();

        let first = MonitorConfig::load_or_init(&path);
        let first_text = std::fs::read_to_string(&path).unwrap();

        let second = MonitorConfig::load_or_init(&path);
        let second_text = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_text, second_text);

        let on_disk: MonitorConfig = serde_json::from_str(&first_text).unwrap();
        assert_eq!(on_disk, first);
    }

    #[test]
    fn test_malformed_document_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(MonitorConfig::read_persisted(&path).is_err());
        assert_eq!(MonitorConfig::load_or_init(&path), MonitorConfig::default());
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");
        std::fs::write(&path, r#"{"idle_timeout": 0}"#).unwrap();

        match MonitorConfig::read_persisted(&path) {
            Err(MonitorError::InvalidConfig(errors)) => {
                assert!(errors.iter().any(|e| e.contains("idle_timeout")));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
        assert_eq!(MonitorConfig::load_or_init(&path), MonitorConfig::default());
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let config = MonitorConfig {
            startup_timeout: u64::MAX,
            activity_threshold: MAX_DURATION_SECS,
            ..MonitorConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("startup_timeout")));
        assert!(errors.iter().any(|e| e.contains("activity_threshold")));

        let at_limit = MonitorConfig {
            idle_timeout: MAX_DURATION_SECS,
            ..MonitorConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint::new("127.0.0.1", 1083);
        assert_eq!(endpoint.url(), "http://127.0.0.1:1083/");
        assert_eq!(endpoint.to_string(), "127.0.0.1:1083");
    }
}
