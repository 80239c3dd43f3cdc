//! Lifecycle command runner
//!
//! Invokes the external proxy script with a single action token and a hard
//! execution bound. Every outcome, including spawn failures and timeouts, is
//! folded into a [`CommandResult`].

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Action token passed to the lifecycle script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    Stop,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one lifecycle command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandResult {
    /// Completed execution; success follows the exit code
    pub fn completed(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            success: exit_code == Some(0),
            stdout,
            stderr,
            exit_code,
            timed_out: false,
        }
    }

    /// The command could not be run at all
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            timed_out: false,
        }
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("command timed out after {}s", limit.as_secs_f64()),
            exit_code: None,
            timed_out: true,
        }
    }

    /// Best single-line description of a failure
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs lifecycle actions against the managed service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessController: Send + Sync {
    async fn execute(&self, action: LifecycleAction) -> CommandResult;
}

/// Controller that shells out to `<script> <action>`
#[derive(Debug, Clone)]
pub struct ScriptController {
    script: PathBuf,
    command_timeout: Duration,
}

impl ScriptController {
    pub fn new(script: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            script: script.into(),
            command_timeout,
        }
    }

    pub fn script(&self) -> &PathBuf {
        &self.script
    }
}

#[async_trait]
impl ProcessController for ScriptController {
    async fn execute(&self, action: LifecycleAction) -> CommandResult {
        info!(
            "Running lifecycle command: {} {} (timeout: {}s)",
            self.script.display(),
            action,
            self.command_timeout.as_secs()
        );

        let mut cmd = Command::new(&self.script);
        cmd.arg(action.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let result = match timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => CommandResult::completed(
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ),
            Ok(Err(e)) => {
                error!("Lifecycle command {} could not run: {}", action, e);
                CommandResult::failed(format!(
                    "failed to execute {}: {}",
                    self.script.display(),
                    e
                ))
            }
            Err(_) => {
                warn!(
                    "Lifecycle command {} timed out after {}s",
                    action,
                    self.command_timeout.as_secs()
                );
                CommandResult::timed_out(self.command_timeout)
            }
        };

        if result.success {
            debug!(
                "Lifecycle command {} succeeded in {}ms",
                action,
                started.elapsed().as_millis()
            );
        } else {
            error!(
                "Lifecycle command {} failed (exit: {:?}): {}",
                action,
                result.exit_code,
                result.diagnostic()
            );
        }

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("on_demand_proxy.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_successful_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"echo "proxy $1 ok""#);

        let controller = ScriptController::new(script, Duration::from_secs(5));
        let result = controller.execute(LifecycleAction::Start).await;

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "proxy start ok");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"echo "port in use" >&2; exit 3"#);

        let controller = ScriptController::new(script, Duration::from_secs(5));
        let result = controller.execute(LifecycleAction::Stop).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.diagnostic(), "port in use");
    }

    #[tokio::test]
    async fn test_timeout_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "sleep 10");

        let controller = ScriptController::new(script, Duration::from_millis(200));
        let started = Instant::now();
        let result = controller.execute(LifecycleAction::Start).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(!result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_missing_script_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            ScriptController::new(dir.path().join("absent.sh"), Duration::from_secs(1));

        let result = controller.execute(LifecycleAction::Start).await;

        assert!(!result.success);
        assert!(result.stderr.contains("failed to execute"));
    }
}
