//! Shutdown signalling
//!
//! The supervisor loop checks its [`ShutdownToken`] at the top of each tick
//! and wakes early from the inter-tick sleep when shutdown is requested. An
//! in-flight probe or lifecycle command is always allowed to finish.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM, as sent by `proxy-monitor stop`
    Terminate,
    /// Requested from inside the process
    Requested,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shutdown coordinator; hands out tokens to whoever must observe shutdown
pub struct GracefulShutdown {
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self { signal_tx }
    }

    /// Token observing this coordinator
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal_tx.subscribe(),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_tx.borrow().is_some()
    }

    /// Request shutdown; later requests are ignored
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.is_shutdown_requested() {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal_tx.send_replace(Some(signal));
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of [`GracefulShutdown`]
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// Resolves once shutdown is requested; never resolves if the coordinator is gone
    pub async fn requested(&mut self) {
        if self.signal_rx.wait_for(|s| s.is_some()).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Install OS signal handlers that request shutdown
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, shutdown_signal) in [
            (SignalKind::terminate(), ShutdownSignal::Terminate),
            (SignalKind::interrupt(), ShutdownSignal::Interrupt),
        ] {
            let shutdown = shutdown.clone();
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        stream.recv().await;
                        info!("Received {} signal", shutdown_signal);
                        shutdown.request_shutdown(shutdown_signal);
                    });
                }
                Err(e) => warn!("Failed to install {} handler: {}", shutdown_signal, e),
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.request_shutdown(ShutdownSignal::Interrupt);
                }
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "interrupt");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "terminate");
    }

    #[tokio::test]
    async fn test_shutdown_request() {
        let shutdown = GracefulShutdown::new();
        let token = shutdown.token();

        assert!(!shutdown.is_shutdown_requested());
        assert!(!token.is_shutdown_requested());

        shutdown.request_shutdown(ShutdownSignal::Terminate);
        assert!(shutdown.is_shutdown_requested());
        assert!(token.is_shutdown_requested());

        // Duplicate request should be ignored
        shutdown.request_shutdown(ShutdownSignal::Interrupt);
        assert_eq!(*shutdown.signal_tx.borrow(), Some(ShutdownSignal::Terminate));
    }

    #[tokio::test]
    async fn test_token_wakes_on_request() {
        let shutdown = Arc::new(GracefulShutdown::new());
        let mut token = shutdown.token();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.request_shutdown(ShutdownSignal::Requested);
        });

        tokio::time::timeout(Duration::from_secs(2), token.requested())
            .await
            .expect("token should resolve after shutdown request");
    }
}
