//! Supervisor layer for the on-demand proxy
//!
//! - Reconciler: probe-driven lifecycle state machine
//! - Activity tracking for idle shutdown and on-demand start
//! - Notifier for lifecycle alerts
//! - Daemon loop driving one reconciliation per tick

pub mod activity;
pub mod daemon;
pub mod notifier;
pub mod reconciler;
pub mod status;

pub use activity::ActivityTracker;
pub use daemon::{SupervisorHandle, SupervisorLoop};
pub use notifier::{Alert, AlertLevel, LogNotifier, Notifier};
pub use reconciler::{Supervisor, SupervisorPhase, SupervisorState, TickReport};
pub use status::StatusReport;
