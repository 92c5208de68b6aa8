//! Scripted relays for tests

use crate::error::{Error, ErrorKind};
use crate::event::{EventKind, PreEvent, RawEvent};
use crate::message::{ClientMessage, RelayMessage};
use crate::relay::RelayUrl;
use crate::signer::KeySigner;
use crate::transport::{RelayConnection, RelayTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) enum ConnectBehavior {
    Accept,
    AcceptAfter(Duration),
    Refuse,
    Hang,
}

#[derive(Debug, Clone)]
pub(crate) enum AckBehavior {
    Accept,
    Reject(String),
    Silent,
    Disconnect,
}

/// How one scripted relay behaves
#[derive(Debug, Clone)]
pub(crate) struct MockRelay {
    pub connect: ConnectBehavior,
    /// Stored events and how long after the REQ each is delivered
    pub events: Vec<(Duration, RawEvent)>,
    /// When EOSE follows the REQ. `None` never sends it.
    pub eose_after: Option<Duration>,
    pub ack: AckBehavior,
    /// Real relays only send what matches the REQ. Turn off to misbehave.
    pub honor_filters: bool,
    /// How long closing the connection takes
    pub close_delay: Duration,
}

impl MockRelay {
    pub fn new() -> MockRelay {
        MockRelay {
            connect: ConnectBehavior::Accept,
            events: Vec::new(),
            eose_after: Some(Duration::ZERO),
            ack: AckBehavior::Accept,
            honor_filters: true,
            close_delay: Duration::ZERO,
        }
    }

    pub fn refusing() -> MockRelay {
        MockRelay {
            connect: ConnectBehavior::Refuse,
            ..MockRelay::new()
        }
    }

    pub fn hanging() -> MockRelay {
        MockRelay {
            connect: ConnectBehavior::Hang,
            ..MockRelay::new()
        }
    }

    /// Connects, but never says anything
    pub fn silent() -> MockRelay {
        MockRelay {
            eose_after: None,
            ack: AckBehavior::Silent,
            ..MockRelay::new()
        }
    }

    pub fn with_event(mut self, delay: Duration, event: RawEvent) -> MockRelay {
        self.events.push((delay, event));
        self
    }

    pub fn with_eose_after(mut self, delay: Option<Duration>) -> MockRelay {
        self.eose_after = delay;
        self
    }

    pub fn with_ack(mut self, ack: AckBehavior) -> MockRelay {
        self.ack = ack;
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> MockRelay {
        self.close_delay = delay;
        self
    }

    pub fn with_connect(mut self, connect: ConnectBehavior) -> MockRelay {
        self.connect = connect;
        self
    }
}

/// Everything the relays saw
#[derive(Debug, Clone, Default)]
pub(crate) struct MockLog {
    pub connects: Vec<String>,
    pub sent: Vec<(String, ClientMessage)>,
    pub closed_connections: Vec<String>,
}

impl MockLog {
    /// CLOSE messages a relay received
    pub fn close_count(&self, url: &str) -> usize {
        self.sent
            .iter()
            .filter(|(u, m)| u == url && matches!(m, ClientMessage::Close(_)))
            .count()
    }

    pub fn req_count(&self, url: &str) -> usize {
        self.sent
            .iter()
            .filter(|(u, m)| u == url && matches!(m, ClientMessage::Req(_, _)))
            .count()
    }

    pub fn published(&self, url: &str) -> Vec<RawEvent> {
        self.sent
            .iter()
            .filter(|(u, _)| u == url)
            .filter_map(|(_, m)| match m {
                ClientMessage::Event(e) => Some((**e).clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
pub(crate) struct MockTransport {
    relays: Mutex<HashMap<String, MockRelay>>,
    log: Arc<Mutex<MockLog>>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    pub fn with_relay(self, url: &str, relay: MockRelay) -> MockTransport {
        self.set_relay(url, relay);
        self
    }

    pub fn set_relay(&self, url: &str, relay: MockRelay) {
        let _ = self.relays.lock().insert(url.to_owned(), relay);
    }

    pub fn log(&self) -> MockLog {
        self.log.lock().clone()
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn RelayConnection>, Error> {
        self.log.lock().connects.push(url.as_str().to_owned());
        let relay = self.relays.lock().get(url.as_str()).cloned();
        let relay = match relay {
            Some(r) => r,
            None => {
                return Err(ErrorKind::ConnectionFailed(format!("{url}: unknown host")).into())
            }
        };
        match relay.connect {
            ConnectBehavior::Accept => {}
            ConnectBehavior::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            ConnectBehavior::Refuse => {
                return Err(ErrorKind::ConnectionFailed(format!("{url}: refused")).into())
            }
            ConnectBehavior::Hang => std::future::pending::<()>().await,
        }
        Ok(Box::new(MockConnection {
            url: url.as_str().to_owned(),
            relay,
            queue: Vec::new(),
            log: self.log.clone(),
        }))
    }
}

struct MockConnection {
    url: String,
    relay: MockRelay,
    // Messages waiting to be delivered; None means the relay hangs up
    queue: Vec<(Instant, Option<RelayMessage>)>,
    log: Arc<Mutex<MockLog>>,
}

impl MockConnection {
    fn schedule(&mut self, at: Instant, message: Option<RelayMessage>) {
        let pos = self.queue.partition_point(|(t, _)| *t <= at);
        self.queue.insert(pos, (at, message));
    }
}

#[async_trait]
impl RelayConnection for MockConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
        self.log
            .lock()
            .sent
            .push((self.url.clone(), message.clone()));
        let now = Instant::now();
        match message {
            ClientMessage::Req(sub, filters) => {
                for (delay, event) in self.relay.events.clone() {
                    if !self.relay.honor_filters
                        || filters.is_empty()
                        || filters.iter().any(|f| f.matches(&event))
                    {
                        self.schedule(
                            now + delay,
                            Some(RelayMessage::Event(sub.clone(), Box::new(event))),
                        );
                    }
                }
                if let Some(delay) = self.relay.eose_after {
                    self.schedule(now + delay, Some(RelayMessage::Eose(sub.clone())));
                }
            }
            ClientMessage::Event(event) => match self.relay.ack.clone() {
                AckBehavior::Accept => self.schedule(
                    now,
                    Some(RelayMessage::Ok(event.id.clone(), true, "".to_owned())),
                ),
                AckBehavior::Reject(reason) => self.schedule(
                    now,
                    Some(RelayMessage::Ok(event.id.clone(), false, reason)),
                ),
                AckBehavior::Silent => {}
                AckBehavior::Disconnect => self.schedule(now, None),
            },
            ClientMessage::Close(_) => {}
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<RelayMessage>, Error> {
        let at = match self.queue.first().map(|(at, _)| *at) {
            Some(at) => at,
            None => std::future::pending::<Instant>().await,
        };
        tokio::time::sleep_until(at).await;
        Ok(self.queue.remove(0).1)
    }

    async fn close(&mut self) -> Result<(), Error> {
        tokio::time::sleep(self.relay.close_delay).await;
        self.log.lock().closed_connections.push(self.url.clone());
        Ok(())
    }
}

/// A signer for private key `n` (1, 2, 3... are all valid keys)
pub(crate) fn test_signer(n: u8) -> KeySigner {
    let mut hex = "0".repeat(62);
    hex.push_str(&format!("{n:02x}"));
    KeySigner::from_hex(&hex).unwrap()
}

pub(crate) fn signed_event(
    signer: &KeySigner,
    kind: EventKind,
    tags: Vec<Vec<String>>,
    content: &str,
    created_at: i64,
) -> RawEvent {
    let pre = PreEvent {
        created_at,
        kind,
        tags,
        content: content.to_owned(),
    };
    signer.sign_now(pre).unwrap()
}

pub(crate) fn tags(list: &[&[&str]]) -> Vec<Vec<String>> {
    list.iter()
        .map(|t| t.iter().map(|s| s.to_string()).collect())
        .collect()
}

pub(crate) fn url(s: &str) -> RelayUrl {
    RelayUrl::try_from_str(s).unwrap()
}
