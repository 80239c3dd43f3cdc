pub mod controller;
pub mod health;
pub mod retention;

pub use controller::{CommandResult, LifecycleAction, ProcessController, ScriptController};
pub use health::{HealthProbe, HttpProbe, ProbeOutcome};
pub use retention::cleanup_old_logs;
