pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod services;
pub mod supervisor;

pub use config::{Endpoint, MonitorConfig};
pub use coordination::{GracefulShutdown, ShutdownSignal, ShutdownToken};
pub use error::{MonitorError, Result};
pub use services::{
    CommandResult, HealthProbe, HttpProbe, LifecycleAction, ProbeOutcome, ProcessController,
    ScriptController,
};
pub use supervisor::{
    Alert, AlertLevel, LogNotifier, Notifier, StatusReport, Supervisor, SupervisorHandle,
    SupervisorLoop, SupervisorPhase, TickReport,
};
