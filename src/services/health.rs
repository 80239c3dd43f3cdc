//! Reachability probe for the managed proxy
//!
//! A probe only answers "is something listening and speaking HTTP". Any
//! response, including error statuses, counts as reachable.

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::error::Result;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered
    Reachable,
    /// Timed out or refused; the expected steady state of a stopped proxy
    Unreachable,
    /// Any other transport failure
    ProbeError(String),
}

impl ProbeOutcome {
    /// Reconciliation treats probe errors as unreachable
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Reachable => write!(f, "reachable"),
            ProbeOutcome::Unreachable => write!(f, "unreachable"),
            ProbeOutcome::ProbeError(reason) => write!(f, "probe error: {reason}"),
        }
    }
}

/// Bounded reachability check against an endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeOutcome;
}

/// HTTP probe backed by reqwest
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("proxy-monitor/", env!("CARGO_PKG_VERSION")))
            // Probe the proxy directly, never via HTTP_PROXY/HTTPS_PROXY.
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, endpoint: &Endpoint, limit: Duration) -> ProbeOutcome {
        let url = endpoint.url();
        let request = self.client.get(&url).timeout(limit).send();

        match timeout(limit, request).await {
            Ok(Ok(response)) => {
                debug!(%endpoint, status = %response.status(), "Probe succeeded");
                ProbeOutcome::Reachable
            }
            Ok(Err(e)) if e.is_timeout() => {
                debug!(%endpoint, "Probe timed out");
                ProbeOutcome::Unreachable
            }
            Ok(Err(e)) if e.is_connect() => {
                debug!(%endpoint, "Proxy not answering: {}", e);
                ProbeOutcome::Unreachable
            }
            Ok(Err(e)) => {
                warn!(%endpoint, "Probe failed: {}", e);
                ProbeOutcome::ProbeError(e.to_string())
            }
            Err(_) => {
                debug!(%endpoint, "Probe exceeded {:?}", limit);
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn local_endpoint(listener: &TcpListener) -> Endpoint {
        let addr = listener.local_addr().unwrap();
        Endpoint::new("127.0.0.1", addr.port())
    }

    #[tokio::test]
    async fn test_error_status_counts_as_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = local_endpoint(&listener).await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        });

        let probe = HttpProbe::new().unwrap();
        let outcome = probe.probe(&endpoint, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProbeOutcome::Reachable);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = local_endpoint(&listener).await;
        drop(listener);

        let probe = HttpProbe::new().unwrap();
        let outcome = probe.probe(&endpoint, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out_as_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = local_endpoint(&listener).await;

        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let probe = HttpProbe::new().unwrap();
        let outcome = probe.probe(&endpoint, Duration::from_millis(200)).await;
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[test]
    fn test_probe_error_is_not_reachable() {
        assert!(!ProbeOutcome::ProbeError("bad frame".into()).is_reachable());
        assert!(!ProbeOutcome::Unreachable.is_reachable());
        assert!(ProbeOutcome::Reachable.is_reachable());
    }
}
