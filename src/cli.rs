//! Command line surface
//!
//! proxy-monitor start   - run the monitoring loop
//! proxy-monitor stop    - signal a running monitor to exit
//! proxy-monitor status  - print a status report
//! proxy-monitor test    - check configuration, endpoint and lifecycle script
//! proxy-monitor config  - write the merged configuration file

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{MonitorConfig, DEFAULT_CONFIG_FILE};
use crate::coordination::{install_signal_handlers, GracefulShutdown};
use crate::services::health::{HealthProbe, HttpProbe};
use crate::supervisor::{Supervisor, SupervisorLoop};

#[derive(Parser)]
#[command(name = "proxy-monitor")]
#[command(version)]
#[command(about = "On-demand proxy supervisor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, env = "PROXY_MONITOR_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the monitoring loop until interrupted
    Start,
    /// Stop a running monitor (the proxy itself is left alone)
    Stop,
    /// Print a status report as JSON
    Status,
    /// Check configuration, endpoint and lifecycle script
    Test,
    /// Write the merged configuration file and print it
    Config,
}

/// Run the supervisor loop in the foreground
pub async fn run_monitor(config_path: &Path) -> Result<()> {
    let config = MonitorConfig::load_or_init(config_path);
    let pid_file = config.pid_file.clone();

    if let Some(pid) = read_pid(&pid_file) {
        if is_process_running(pid) && pid != std::process::id() {
            bail!(
                "a monitor is already running (PID: {}, pid file: {})",
                pid,
                pid_file.display()
            );
        }
        warn!("Removing stale pid file {}", pid_file.display());
    }
    fs::write(&pid_file, std::process::id().to_string())
        .with_context(|| format!("Failed to write pid file {}", pid_file.display()))?;

    let shutdown = Arc::new(GracefulShutdown::new());
    install_signal_handlers(shutdown.clone());

    let result = async {
        let supervisor = Supervisor::from_config(config)?;
        let (runner, _handle) = SupervisorLoop::new(supervisor, shutdown.token());
        runner.run().await;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = fs::remove_file(&pid_file) {
        warn!("Failed to remove pid file {}: {}", pid_file.display(), e);
    }
    result
}

/// Signal a running monitor to exit
pub fn stop_monitor(config_path: &Path) -> Result<()> {
    let config = MonitorConfig::load_or_init(config_path);
    let pid_file = &config.pid_file;

    let Some(pid) = read_pid(pid_file) else {
        println!("\x1b[33m⚠ Monitor is not running\x1b[0m");
        return Ok(());
    };

    if !is_process_running(pid) {
        let _ = fs::remove_file(pid_file);
        println!("\x1b[33m⚠ Monitor is not running (removed stale pid file)\x1b[0m");
        return Ok(());
    }

    println!("Stopping monitor (PID: {}) with SIGTERM...", pid);

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .with_context(|| format!("Failed to signal PID {pid}"))?;
        println!("\x1b[32m✓ Stop signal sent\x1b[0m");
    }

    #[cfg(not(unix))]
    {
        println!("\x1b[33m⚠ Signal handling not supported on this platform\x1b[0m");
        println!("  Manually stop process with PID: {}", pid);
    }

    Ok(())
}

/// Probe once from a cold supervisor and print the status report
pub async fn show_status(config_path: &Path) -> Result<()> {
    let config = MonitorConfig::load_or_init(config_path);
    let pid_file = config.pid_file.clone();

    let mut supervisor = Supervisor::from_config(config)?;
    let now = Utc::now();
    supervisor.observe(now).await;

    let report = supervisor.status_report(now);
    println!("{}", serde_json::to_string_pretty(&report)?);

    match read_pid(&pid_file) {
        Some(pid) if is_process_running(pid) => eprintln!("monitor: running (PID: {pid})"),
        _ => eprintln!("monitor: not running"),
    }
    Ok(())
}

/// Sanity-check the setup without changing anything
pub async fn test_setup(config_path: &Path) -> Result<()> {
    let config = MonitorConfig::load_or_init(config_path);

    println!("Configuration: {}", config_path.display());
    println!("  endpoint:            {}", config.endpoint());
    println!("  lifecycle script:    {}", config.lifecycle_script.display());
    println!("  idle timeout:        {}s", config.idle_timeout);
    println!("  activity threshold:  {}min", config.activity_threshold);
    println!("  check interval:      {}s", config.health_check_interval);
    println!("  auto restart:        {}", config.auto_restart);
    println!("  monitoring enabled:  {}", config.monitoring_enabled);

    let probe = HttpProbe::new()?;
    let outcome = probe
        .probe(&config.endpoint(), config.probe_timeout())
        .await;
    println!("\nProbe {}: {}", config.endpoint(), outcome);

    let script = &config.lifecycle_script;
    if !script.is_file() {
        bail!("lifecycle script {} not found", script.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = fs::metadata(script)?.permissions().mode();
        if mode & 0o111 == 0 {
            bail!("lifecycle script {} is not executable", script.display());
        }
    }

    println!("Lifecycle script {}: ok", script.display());
    info!("Setup check passed");
    Ok(())
}

/// Merge, persist and print the configuration document
pub fn write_config(config_path: &Path) -> Result<()> {
    MonitorConfig::load_or_init(config_path);
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    println!("Configuration file written: {}\n", config_path.display());
    println!("{}", content.trim_end());
    Ok(())
}

/// Pid from the pid file. Zero and values outside the positive `pid_t` range
/// are rejected, since `kill` treats them as process groups.
fn read_pid(pid_file: &Path) -> Option<u32> {
    let pid: u32 = fs::read_to_string(pid_file).ok()?.trim().parse().ok()?;
    (pid > 0 && i32::try_from(pid).is_ok()).then_some(pid)
}

fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["proxy-monitor", "status"]).unwrap();
        assert_eq!(cli.command, Commands::Status);

        let cli = Cli::try_parse_from(["proxy-monitor", "--config", "/tmp/p.json", "start"]).unwrap();
        assert_eq!(cli.command, Commands::Start);
        assert_eq!(cli.config, PathBuf::from("/tmp/p.json"));
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["proxy-monitor"]).is_err());
    }

    #[test]
    fn test_write_config_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_config.json");

        write_config(&path).unwrap();

        let on_disk: MonitorConfig =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, MonitorConfig::default());
    }

    #[test]
    fn test_read_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");
        assert_eq!(read_pid(&path), None);

        fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(&path), Some(4242));

        fs::write(&path, "garbage").unwrap();
        assert_eq!(read_pid(&path), None);
    }

    #[test]
    fn test_read_pid_rejects_group_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        for corrupt in ["0", "-1", "2147483648", "4294967295"] {
            fs::write(&path, corrupt).unwrap();
            assert_eq!(read_pid(&path), None, "accepted {corrupt}");
        }

        fs::write(&path, "2147483647").unwrap();
        assert_eq!(read_pid(&path), Some(2147483647));
    }

    #[cfg(unix)]
    #[test]
    fn test_own_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }
}
