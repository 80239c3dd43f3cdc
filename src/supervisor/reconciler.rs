//! Proxy lifecycle state machine
//!
//! One [`Supervisor::reconcile`] call is one tick: probe the proxy, reconcile
//! what was observed against what the supervisor believed, then apply the
//! idle/on-demand policy. Observation always runs before policy so decisions
//! are made against fresh reality.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::activity::ActivityTracker;
use super::notifier::{Alert, AlertLevel, LogNotifier, Notifier};
use super::status::StatusReport;
use crate::config::{Endpoint, MonitorConfig, MAX_DURATION_SECS};
use crate::error::Result;
use crate::services::controller::{LifecycleAction, ProcessController, ScriptController};
use crate::services::health::{HealthProbe, HttpProbe, ProbeOutcome};
use crate::services::retention;

/// Lifecycle phase of the managed proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// Not running as far as the supervisor knows
    Stopped,
    /// Start command issued, waiting for the proxy to answer
    Starting,
    /// Confirmed reachable
    Running,
    /// Died outside our control, automatic restart in progress
    StoppingExternal,
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorPhase::Stopped => write!(f, "stopped"),
            SupervisorPhase::Starting => write!(f, "starting"),
            SupervisorPhase::Running => write!(f, "running"),
            SupervisorPhase::StoppingExternal => write!(f, "stopping_external"),
        }
    }
}

/// Mutable supervisor state. Only [`Supervisor`] writes it.
#[derive(Debug, Clone)]
pub struct SupervisorState {
    pub phase: SupervisorPhase,
    /// Result of the most recent probe
    pub observed_active: bool,
    pub activity: ActivityTracker,
    /// Successful starts, paces log cleanup
    pub activity_count: u64,
    pub consecutive_start_failures: u32,
}

impl SupervisorState {
    fn cold() -> Self {
        Self {
            phase: SupervisorPhase::Stopped,
            observed_active: false,
            activity: ActivityTracker::new(),
            activity_count: 0,
            consecutive_start_failures: 0,
        }
    }

    /// Whether the supervisor wants the proxy up
    pub fn desired_active(&self) -> bool {
        self.phase == SupervisorPhase::Running
    }
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// `None` when monitoring is disabled
    pub probe: Option<ProbeOutcome>,
    pub commands: Vec<LifecycleAction>,
    pub phase_before: SupervisorPhase,
    pub phase_after: SupervisorPhase,
    pub logs_removed: usize,
}

impl TickReport {
    fn new(phase: SupervisorPhase) -> Self {
        Self {
            probe: None,
            commands: Vec::new(),
            phase_before: phase,
            phase_after: phase,
            logs_removed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOutcome {
    Started,
    Failed,
    Suspended,
}

/// On-demand proxy supervisor
pub struct Supervisor {
    config: MonitorConfig,
    endpoint: Endpoint,
    probe: Arc<dyn HealthProbe>,
    controller: Arc<dyn ProcessController>,
    notifier: Arc<dyn Notifier>,
    log_dir: PathBuf,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        controller: Arc<dyn ProcessController>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            endpoint: config.endpoint(),
            config,
            probe,
            controller,
            notifier,
            log_dir: retention::log_dir(),
            state: SupervisorState::cold(),
        }
    }

    /// Supervisor wired to the HTTP probe, the lifecycle script and log notifications
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        let probe = Arc::new(HttpProbe::new()?);
        let controller = Arc::new(ScriptController::new(
            config.lifecycle_script.clone(),
            config.command_timeout(),
        ));
        Ok(Self::new(config, probe, controller, Arc::new(LogNotifier)))
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.state.phase
    }

    /// Record an external activity signal
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.state.activity.record_activity(now);
        self.state.consecutive_start_failures = 0;
    }

    pub fn status_report(&self, now: DateTime<Utc>) -> StatusReport {
        StatusReport {
            active: self.state.desired_active(),
            state: self.state.phase.to_string(),
            observed_active: self.state.observed_active,
            last_activity: self.state.activity.last_activity(),
            activity_count: self.state.activity_count,
            consecutive_start_failures: self.state.consecutive_start_failures,
            config: self.config.clone(),
            timestamp: now,
        }
    }

    /// Probe-only refresh: adopts a reachable proxy, never issues commands
    pub async fn observe(&mut self, now: DateTime<Utc>) -> ProbeOutcome {
        let outcome = self.probe_once().await;
        if outcome.is_reachable() && self.state.phase == SupervisorPhase::Stopped {
            self.transition(SupervisorPhase::Running, "proxy reachable");
            self.state.activity.record_activity(now);
        }
        outcome
    }

    /// Remove rolled logs older than the retention window
    pub fn cleanup_logs(&self, today: NaiveDate) -> Result<usize> {
        retention::cleanup_old_logs(&self.log_dir, self.config.log_retention_days, today)
    }

    /// Run one reconciliation pass
    pub async fn reconcile(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::new(self.state.phase);

        if !self.config.monitoring_enabled {
            debug!("Monitoring disabled, skipping reconciliation");
            return Ok(report);
        }

        let outcome = self.probe_once().await;
        let reachable = outcome.is_reachable();
        report.probe = Some(outcome);
        let starts_before = self.state.activity_count;

        let died = self.reconcile_observation(now, reachable, &mut report).await;
        // A death tick already issued its single restart; policy waits for the next tick.
        if !died {
            self.apply_policy(now, &mut report).await;
        }

        if reachable && self.state.phase == SupervisorPhase::Running {
            self.state.activity.record_activity(now);
        }

        let starts = self.state.activity_count;
        if starts != starts_before && starts % self.config.cleanup_every == 0 {
            report.logs_removed = self.cleanup_logs(now.date_naive())?;
        }

        report.phase_after = self.state.phase;
        Ok(report)
    }

    /// Steps driven by the probe result. Returns true when an unexpected death was handled.
    async fn reconcile_observation(
        &mut self,
        now: DateTime<Utc>,
        reachable: bool,
        report: &mut TickReport,
    ) -> bool {
        match (self.state.phase, reachable) {
            (SupervisorPhase::Running, false) => {
                warn!("Proxy stopped unexpectedly ({})", self.endpoint);
                if self.config.auto_restart {
                    self.transition(SupervisorPhase::StoppingExternal, "unexpected death");
                    info!("Restarting proxy automatically");
                    if self.start_service(now, report).await == StartOutcome::Failed {
                        self.notify(AlertLevel::Error, "Automatic proxy restart failed")
                            .await;
                    }
                } else {
                    self.transition(SupervisorPhase::Stopped, "unexpected death, auto-restart off");
                    self.notify(AlertLevel::Warning, "Proxy stopped unexpectedly")
                        .await;
                }
                true
            }
            (SupervisorPhase::Stopped, true) => {
                info!("Proxy is reachable, adopting externally started service");
                self.transition(SupervisorPhase::Running, "started externally");
                self.state.activity.record_activity(now);
                false
            }
            _ => false,
        }
    }

    /// Idle shutdown and on-demand start
    async fn apply_policy(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        match self.state.phase {
            SupervisorPhase::Running
                if self
                    .state
                    .activity
                    .is_idle_beyond(now, self.config.idle_timeout()) =>
            {
                self.stop_service(report).await;
            }
            SupervisorPhase::Stopped
                if self
                    .state
                    .activity
                    .is_within_activity_window(now, self.config.activity_threshold) =>
            {
                info!("Recent activity detected, starting proxy on demand");
                self.start_service(now, report).await;
            }
            _ => {}
        }
    }

    async fn probe_once(&mut self) -> ProbeOutcome {
        let outcome = self
            .probe
            .probe(&self.endpoint, self.config.probe_timeout())
            .await;

        if let ProbeOutcome::ProbeError(reason) = &outcome {
            warn!("Health probe error, treating as unreachable: {}", reason);
        }

        self.state.observed_active = outcome.is_reachable();
        if self.state.observed_active {
            self.state.consecutive_start_failures = 0;
        }
        outcome
    }

    fn start_suspended(&self) -> bool {
        self.config.max_start_failures > 0
            && self.state.consecutive_start_failures >= self.config.max_start_failures
    }

    async fn start_service(&mut self, now: DateTime<Utc>, report: &mut TickReport) -> StartOutcome {
        if self.start_suspended() {
            warn!(
                "Automatic starts suspended after {} consecutive failures",
                self.state.consecutive_start_failures
            );
            self.transition(SupervisorPhase::Stopped, "starts suspended");
            return StartOutcome::Suspended;
        }

        self.transition(SupervisorPhase::Starting, "start requested");
        report.commands.push(LifecycleAction::Start);
        let started = Instant::now();
        let result = self.controller.execute(LifecycleAction::Start).await;

        if !result.success {
            self.state.consecutive_start_failures += 1;
            self.transition(SupervisorPhase::Stopped, "start command failed");
            self.notify(
                AlertLevel::Error,
                format!("Proxy start command failed: {}", result.diagnostic()),
            )
            .await;
            return StartOutcome::Failed;
        }

        if self.await_reachable().await {
            // Stamp when the proxy answered, not when the tick began
            let waited = chrono::Duration::from_std(started.elapsed())
                .unwrap_or_else(|_| chrono::Duration::zero());
            self.state.observed_active = true;
            self.state.consecutive_start_failures = 0;
            self.state.activity.record_activity(now + waited);
            self.state.activity_count += 1;
            self.transition(SupervisorPhase::Running, "start verified");
            self.notify(AlertLevel::Info, "Proxy service started").await;
            StartOutcome::Started
        } else {
            self.state.observed_active = false;
            self.state.consecutive_start_failures += 1;
            self.transition(SupervisorPhase::Stopped, "start not verified");
            self.notify(
                AlertLevel::Error,
                format!(
                    "Proxy did not become reachable within {}s of starting",
                    self.config.startup_timeout
                ),
            )
            .await;
            StartOutcome::Failed
        }
    }

    /// Poll until the proxy answers or the startup timeout elapses
    async fn await_reachable(&self) -> bool {
        let limit = self
            .config
            .startup_timeout()
            .min(Duration::from_secs(MAX_DURATION_SECS));
        let deadline = Instant::now() + limit;
        let poll = self.config.startup_poll_interval();

        loop {
            let outcome = self
                .probe
                .probe(&self.endpoint, self.config.probe_timeout())
                .await;
            if outcome.is_reachable() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            debug!("Proxy not reachable yet after start: {}", outcome);
            sleep(poll.min(deadline - now)).await;
        }
    }

    async fn stop_service(&mut self, report: &mut TickReport) {
        info!(
            "Stopping proxy after {}s without activity",
            self.config.idle_timeout
        );
        report.commands.push(LifecycleAction::Stop);
        let result = self.controller.execute(LifecycleAction::Stop).await;

        self.transition(SupervisorPhase::Stopped, "idle timeout");
        if result.success {
            self.notify(AlertLevel::Warning, "Proxy service stopped (idle)")
                .await;
        } else {
            warn!("Stop command failed; assuming stopped until the next probe says otherwise");
            self.notify(
                AlertLevel::Error,
                format!("Proxy stop command failed: {}", result.diagnostic()),
            )
            .await;
        }
    }

    fn transition(&mut self, to: SupervisorPhase, reason: &str) {
        let from = self.state.phase;
        if from != to {
            debug!("Supervisor phase {} -> {} ({})", from, to, reason);
            self.state.phase = to;
        }
    }

    /// Emit a notification through the configured notifier
    pub async fn notify(&self, level: AlertLevel, message: impl Into<String>) {
        self.notifier.notify(Alert::new(level, message)).await;
    }
}
