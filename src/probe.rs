use crate::error::{Error, ErrorKind};
use crate::relay::{ProbeFailure, ProbeResult, RelayUrl};
use crate::transport::RelayTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Upper bound on the background close after a successful probe
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Checks whether a relay accepts connections, and how fast
#[derive(Clone)]
pub struct RelayHealthProbe {
    transport: Arc<dyn RelayTransport>,
}

impl RelayHealthProbe {
    pub fn new(transport: Arc<dyn RelayTransport>) -> RelayHealthProbe {
        RelayHealthProbe { transport }
    }

    /// Connect and immediately close. Returns no later than `timeout`.
    pub async fn probe(&self, url: &RelayUrl, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.transport.connect(url)).await {
            Ok(Ok(mut connection)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                let url = url.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(CLOSE_GRACE, connection.close()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::debug!("{}: close after probe: {}", url, e),
                        Err(_) => tracing::debug!("{}: close after probe timed out", url),
                    }
                });
                ProbeResult::success(elapsed)
            }
            Ok(Err(e)) => {
                tracing::debug!("{}: probe failed: {}", url, e);
                ProbeResult::failure(ProbeFailure::ConnectionFailed)
            }
            Err(_) => {
                let e: Error = ErrorKind::ConnectionTimeout.into();
                tracing::debug!("{}: probe failed after {:?}: {}", url, timeout, e);
                ProbeResult::failure(ProbeFailure::Timeout)
            }
        }
    }
}
