use crate::error::{Error, ErrorKind};
use crate::event::RawEvent;
use crate::message::{ClientMessage, RelayMessage};
use crate::relay::{RelayOutcome, RelayUrl};
use crate::transport::{RelayConnection, RelayTransport};
use std::sync::Arc;
use std::time::Duration;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPublishResult {
    pub url: RelayUrl,
    pub status: RelayOutcome,
}

impl RelayPublishResult {
    pub fn detail(&self) -> Option<&str> {
        self.status.detail()
    }
}

/// How a publish went, relay by relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    pub success_count: usize,
    pub per_relay: Vec<RelayPublishResult>,
}

/// Sends signed events to many relays at once
pub struct EventPublisher {
    transport: Arc<dyn RelayTransport>,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(transport: Arc<dyn RelayTransport>, timeout: Duration) -> EventPublisher {
        EventPublisher { transport, timeout }
    }

    /// Publish to every relay concurrently.
    ///
    /// Succeeds if at least one relay accepted the event. Otherwise the
    /// error is `NoRelaySuccess`, carrying the per-relay results.
    pub async fn publish(&self, relays: &[RelayUrl], event: &RawEvent) -> Result<PublishSummary, Error> {
        let attempts = relays.iter().map(|url| async move {
            let status = publish_to_relay(self.transport.clone(), url, event, self.timeout).await;
            match &status {
                RelayOutcome::Success => tracing::debug!("{}: accepted {}", url, event.id),
                other => tracing::info!("{}: publish of {} failed: {} {:?}", url, event.id, other, other.detail()),
            }
            RelayPublishResult {
                url: url.clone(),
                status,
            }
        });
        let per_relay = futures::future::join_all(attempts).await;
        let success_count = per_relay.iter().filter(|r| r.status.is_success()).count();
        let summary = PublishSummary {
            success_count,
            per_relay,
        };

        tracing::info!(
            "Published event {} (kind {}) to {}/{} relays",
            event.id,
            event.kind,
            summary.success_count,
            summary.per_relay.len()
        );

        if summary.success_count == 0 {
            Err(ErrorKind::NoRelaySuccess(summary).into())
        } else {
            Ok(summary)
        }
    }
}

async fn publish_to_relay(
    transport: Arc<dyn RelayTransport>,
    url: &RelayUrl,
    event: &RawEvent,
    timeout: Duration,
) -> RelayOutcome {
    let attempt = async {
        let mut connection = match transport.connect(url).await {
            Ok(c) => c,
            Err(e) => return (RelayOutcome::Error(e.kind.to_string()), None),
        };
        if let Err(e) = connection
            .send(&ClientMessage::Event(Box::new(event.clone())))
            .await
        {
            return (RelayOutcome::Error(e.kind.to_string()), Some(connection));
        }
        let outcome = loop {
            match connection.next_message().await {
                Ok(Some(RelayMessage::Ok(id, accepted, reason))) if id == event.id => {
                    if accepted {
                        break RelayOutcome::Success;
                    }
                    break RelayOutcome::Error(ErrorKind::RelayRejected(reason).to_string());
                }
                Ok(Some(RelayMessage::Notice(notice))) => {
                    tracing::info!("{}: NOTICE: {}", url, notice)
                }
                Ok(Some(_)) => {}
                Ok(None) => return (RelayOutcome::Error(ErrorKind::Disconnected.to_string()), None),
                Err(e) => break RelayOutcome::Error(e.kind.to_string()),
            }
        };
        (outcome, Some(connection))
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok((outcome, connection)) => {
            if let Some(connection) = connection {
                close_in_background(url.clone(), connection);
            }
            outcome
        }
        Err(_) => RelayOutcome::Timeout,
    }
}

fn close_in_background(url: RelayUrl, mut connection: Box<dyn RelayConnection>) {
    tokio::spawn(async move {
        match tokio::time::timeout(CLOSE_GRACE, connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("{}: close after publish: {}", url, e),
            Err(_) => tracing::debug!("{}: close after publish timed out", url),
        }
    });
}
