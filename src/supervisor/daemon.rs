//! Timer-driven supervisor loop
//!
//! Runs one reconciliation per tick, never overlapping. Collaborators talk
//! to the loop through a [`SupervisorHandle`]: activity signals are queued
//! and applied at the top of the next tick, status is published after each
//! tick.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::notifier::AlertLevel;
use super::reconciler::Supervisor;
use super::status::StatusReport;
use crate::coordination::ShutdownToken;

/// Cloneable handle for recording activity and reading status
#[derive(Clone)]
pub struct SupervisorHandle {
    activity_tx: mpsc::UnboundedSender<DateTime<Utc>>,
    status_rx: watch::Receiver<StatusReport>,
}

impl SupervisorHandle {
    /// Queue an activity signal stamped now. Returns false once the loop has exited.
    pub fn record_activity(&self) -> bool {
        self.record_activity_at(Utc::now())
    }

    pub fn record_activity_at(&self, at: DateTime<Utc>) -> bool {
        self.activity_tx.send(at).is_ok()
    }

    /// Status published after the most recent tick
    pub fn status(&self) -> StatusReport {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status_rx.clone()
    }
}

/// Owns the supervisor for the lifetime of the loop
pub struct SupervisorLoop {
    supervisor: Supervisor,
    activity_rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
    status_tx: watch::Sender<StatusReport>,
    shutdown: ShutdownToken,
}

impl SupervisorLoop {
    pub fn new(supervisor: Supervisor, shutdown: ShutdownToken) -> (Self, SupervisorHandle) {
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(supervisor.status_report(Utc::now()));

        let handle = SupervisorHandle {
            activity_tx,
            status_rx,
        };
        let runner = Self {
            supervisor,
            activity_rx,
            status_tx,
            shutdown,
        };
        (runner, handle)
    }

    fn drain_activity(&mut self) {
        while let Ok(at) = self.activity_rx.try_recv() {
            debug!("Activity signal at {}", at);
            self.supervisor.record_activity(at);
        }
    }

    /// Run until shutdown is requested. The proxy is left in whatever state it
    /// is in; its lifetime is independent of the monitor's.
    pub async fn run(mut self) -> Supervisor {
        let interval = self.supervisor.config().health_check_interval();
        info!(
            "Proxy monitor started for {} (interval: {}s, idle timeout: {}s)",
            self.supervisor.config().endpoint(),
            interval.as_secs(),
            self.supervisor.config().idle_timeout
        );
        self.supervisor
            .notify(AlertLevel::Info, "Proxy monitor started")
            .await;

        match self.supervisor.cleanup_logs(Utc::now().date_naive()) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} expired log files", removed),
            Err(e) => warn!("Log cleanup failed: {}", e),
        }

        loop {
            if self.shutdown.is_shutdown_requested() {
                info!("Shutdown requested, leaving proxy {}", self.supervisor.phase());
                break;
            }

            self.drain_activity();

            match self.supervisor.reconcile(Utc::now()).await {
                Ok(report)
                    if !report.commands.is_empty()
                        || report.phase_before != report.phase_after =>
                {
                    info!(
                        "Tick: {} -> {} (commands: {:?})",
                        report.phase_before, report.phase_after, report.commands
                    );
                }
                Ok(report) => debug!("Tick: {} (probe: {:?})", report.phase_after, report.probe),
                Err(e) => {
                    error!("Supervisor tick failed: {}", e);
                    self.supervisor
                        .notify(AlertLevel::Error, format!("Monitor tick failed: {e}"))
                        .await;
                }
            }

            self.status_tx
                .send_replace(self.supervisor.status_report(Utc::now()));

            tokio::select! {
                _ = sleep(interval) => {}
                _ = self.shutdown.requested() => {}
            }
        }

        info!("Proxy monitor stopped");
        self.supervisor
    }
}
