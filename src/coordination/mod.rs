//! Coordination for long-running operation
//!
//! Currently only graceful shutdown: OS signals are turned into a shutdown
//! request that the supervisor loop observes between ticks.

pub mod shutdown;

pub use shutdown::{install_signal_handlers, GracefulShutdown, ShutdownSignal, ShutdownToken};
