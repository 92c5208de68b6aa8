use crate::error::{Error, ErrorKind};
use crate::event::RawEvent;
use crate::filter::Filter;
use crate::message::{ClientMessage, RelayMessage};
use crate::relay::{RelayOutcome, RelayUrl};
use crate::transport::{RelayConnection, RelayTransport};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

// Bound on sending CLOSE and closing the socket once we are done with a relay
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Events from a bulk query plus how each relay fared
#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub events: Vec<RawEvent>,
    pub outcomes: Vec<(RelayUrl, RelayOutcome)>,
}

/// Runs filters against many relays at once
pub struct EventFetcher {
    transport: Arc<dyn RelayTransport>,
    next_sub: AtomicU64,
}

impl EventFetcher {
    pub fn new(transport: Arc<dyn RelayTransport>) -> EventFetcher {
        EventFetcher {
            transport,
            next_sub: AtomicU64::new(1),
        }
    }

    fn subscription_id(&self) -> String {
        let n = self.next_sub.fetch_add(1, Ordering::Relaxed);
        format!("scampack-{n}")
    }

    /// Every matching event from every relay, deduplicated by id
    pub async fn query(&self, relays: &[RelayUrl], filter: &Filter, timeout: Duration) -> Vec<RawEvent> {
        self.query_report(relays, filter, timeout).await.events
    }

    /// Like `query`, also reporting each relay's outcome.
    ///
    /// Each relay collects until EOSE, CLOSED, disconnect or `timeout`.
    pub async fn query_report(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        timeout: Duration,
    ) -> QueryReport {
        let sub = self.subscription_id();
        let (tx, mut rx) = mpsc::unbounded_channel::<RawEvent>();
        let mut tasks: JoinSet<(RelayUrl, RelayOutcome)> = JoinSet::new();

        for url in relays {
            let transport = self.transport.clone();
            let url = url.clone();
            let sub = sub.clone();
            let filter = filter.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let outcome = collect_from_relay(transport, &url, sub, filter, tx, timeout).await;
                (url, outcome)
            });
        }
        drop(tx);

        let mut report = QueryReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => report.outcomes.push(pair),
                Err(e) => tracing::error!("Relay query task failed: {}", e),
            }
        }

        let mut arrived: Vec<RawEvent> = Vec::new();
        while let Ok(event) = rx.try_recv() {
            arrived.push(event);
        }
        report.events = dedup_by_id(arrived);

        tracing::debug!(
            "Query {} over {} relays returned {} events",
            sub,
            relays.len(),
            report.events.len()
        );
        report
    }

    /// The first valid event any relay returns.
    ///
    /// `None` once every relay has finished without one, or when `timeout`
    /// elapses.
    pub async fn query_one(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        timeout: Duration,
    ) -> Option<RawEvent> {
        self.query_one_report(relays, filter, timeout).await.0
    }

    pub async fn query_one_report(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        timeout: Duration,
    ) -> (Option<RawEvent>, Vec<(RelayUrl, RelayOutcome)>) {
        let mut subscription = self.subscribe_first(relays, filter, timeout);
        let event = subscription.first().await;
        let outcomes = subscription.close().await;
        (event, outcomes)
    }

    /// Open a subscription on every relay, to be resolved by
    /// `FirstEventSubscription::first`
    pub fn subscribe_first(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        timeout: Duration,
    ) -> FirstEventSubscription {
        let sub = self.subscription_id();
        let (cancel, cancel_rx) = watch::channel(false);
        let (tx, rx) = mpsc::unbounded_channel::<Signal>();

        let mut tasks = Vec::with_capacity(relays.len());
        for url in relays {
            let transport = self.transport.clone();
            let url = url.clone();
            let sub = sub.clone();
            let filter = filter.clone();
            let tx = tx.clone();
            let cancel_rx = cancel_rx.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = first_from_relay(transport, &url, sub, filter, tx, cancel_rx).await;
                (url, outcome)
            }));
        }

        FirstEventSubscription {
            sub,
            cancel,
            rx,
            tasks,
            remaining: relays.len(),
            deadline: Instant::now() + timeout,
            closed: false,
        }
    }
}

/// Keep the first copy of each id, in arrival order
pub fn dedup_by_id(events: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut seen: HashSet<String> = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.id.to_ascii_lowercase()))
        .collect()
}

// Authenticity and filter check. Failures are logged and dropped.
fn accept(url: &RelayUrl, filter: &Filter, event: &RawEvent) -> bool {
    if let Err(e) = event.verify() {
        tracing::warn!("{}: dropping event: {}", url, e);
        return false;
    }
    if !filter.matches(event) {
        tracing::warn!("{}: dropping event {} that does not match our filter", url, event.id);
        return false;
    }
    true
}

async fn end_subscription(url: &RelayUrl, connection: &mut Box<dyn RelayConnection>, sub: &str) {
    let cleanup = async {
        if let Err(e) = connection.send(&ClientMessage::Close(sub.to_owned())).await {
            tracing::debug!("{}: could not send CLOSE: {}", url, e);
        }
        if let Err(e) = connection.close().await {
            tracing::debug!("{}: could not close: {}", url, e);
        }
    };
    if tokio::time::timeout(CLEANUP_TIMEOUT, cleanup).await.is_err() {
        tracing::debug!("{}: cleanup timed out", url);
    }
}

async fn collect_from_relay(
    transport: Arc<dyn RelayTransport>,
    url: &RelayUrl,
    sub: String,
    filter: Filter,
    tx: mpsc::UnboundedSender<RawEvent>,
    timeout: Duration,
) -> RelayOutcome {
    let deadline = Instant::now() + timeout;

    let mut connection = match tokio::time::timeout_at(deadline, transport.connect(url)).await {
        Ok(Ok(c)) => c,
        Ok(Err(e)) => {
            tracing::debug!("{}: {}", url, e);
            return RelayOutcome::Error(e.kind.to_string());
        }
        Err(_) => {
            let e: Error = ErrorKind::ConnectionTimeout.into();
            tracing::debug!("{}: {}", url, e);
            return RelayOutcome::Timeout;
        }
    };

    if let Err(e) = connection
        .send(&ClientMessage::Req(sub.clone(), vec![filter.clone()]))
        .await
    {
        tracing::debug!("{}: {}", url, e);
        let _ = connection.close().await;
        return RelayOutcome::Error(e.kind.to_string());
    }

    let outcome = loop {
        let message = match tokio::time::timeout_at(deadline, connection.next_message()).await {
            Ok(Ok(Some(m))) => m,
            Ok(Ok(None)) => {
                tracing::debug!("{}: disconnected during query", url);
                return RelayOutcome::Error(ErrorKind::Disconnected.to_string());
            }
            Ok(Err(e)) => {
                tracing::debug!("{}: {}", url, e);
                return RelayOutcome::Error(e.kind.to_string());
            }
            Err(_) => {
                tracing::debug!("{}: query timed out", url);
                break RelayOutcome::Timeout;
            }
        };
        match message {
            RelayMessage::Event(s, event) if s == sub => {
                if accept(url, &filter, &event) {
                    let _ = tx.send(*event);
                }
            }
            RelayMessage::Eose(s) if s == sub => break RelayOutcome::Success,
            RelayMessage::Closed(s, reason) if s == sub => {
                tracing::info!("{}: subscription closed: {}", url, reason);
                break RelayOutcome::Error(format!("closed: {reason}"));
            }
            RelayMessage::Notice(notice) => tracing::info!("{}: NOTICE: {}", url, notice),
            other => tracing::trace!("{}: ignoring {:?}", url, other),
        }
    };

    end_subscription(url, &mut connection, &sub).await;
    outcome
}

enum Signal {
    Event(RawEvent),
    Done,
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = cancel.wait_for(|c| *c).await;
}

async fn first_from_relay(
    transport: Arc<dyn RelayTransport>,
    url: &RelayUrl,
    sub: String,
    filter: Filter,
    tx: mpsc::UnboundedSender<Signal>,
    mut cancel: watch::Receiver<bool>,
) -> RelayOutcome {
    let connected = tokio::select! {
        _ = cancelled(&mut cancel) => None,
        result = transport.connect(url) => Some(result),
    };
    let mut connection = match connected {
        None => return RelayOutcome::Timeout,
        Some(Ok(c)) => c,
        Some(Err(e)) => {
            tracing::debug!("{}: {}", url, e);
            let _ = tx.send(Signal::Done);
            return RelayOutcome::Error(e.kind.to_string());
        }
    };

    let req = ClientMessage::Req(sub.clone(), vec![filter.clone()]);
    let sent = tokio::select! {
        _ = cancelled(&mut cancel) => None,
        result = connection.send(&req) => Some(result),
    };
    match sent {
        None => {
            end_subscription_in_background(url, connection, sub);
            return RelayOutcome::Timeout;
        }
        Some(Err(e)) => {
            tracing::debug!("{}: {}", url, e);
            let _ = tx.send(Signal::Done);
            let _ = connection.close().await;
            return RelayOutcome::Error(e.kind.to_string());
        }
        Some(Ok(())) => {}
    }

    let mut answered = false;
    let outcome = loop {
        let next = tokio::select! {
            _ = cancelled(&mut cancel) => None,
            message = connection.next_message() => Some(message),
        };
        let message = match next {
            // Cancelled while the relay still had the subscription open
            None => {
                break if answered {
                    RelayOutcome::Success
                } else {
                    RelayOutcome::Timeout
                }
            }
            Some(Ok(Some(m))) => m,
            Some(Ok(None)) => {
                let _ = tx.send(Signal::Done);
                return RelayOutcome::Error(ErrorKind::Disconnected.to_string());
            }
            Some(Err(e)) => {
                let _ = tx.send(Signal::Done);
                return RelayOutcome::Error(e.kind.to_string());
            }
        };
        match message {
            RelayMessage::Event(s, event) if s == sub => {
                if accept(url, &filter, &event) {
                    answered = true;
                    let _ = tx.send(Signal::Event(*event));
                }
            }
            RelayMessage::Eose(s) if s == sub => {
                let _ = tx.send(Signal::Done);
                break RelayOutcome::Success;
            }
            RelayMessage::Closed(s, reason) if s == sub => {
                tracing::info!("{}: subscription closed: {}", url, reason);
                let _ = tx.send(Signal::Done);
                break RelayOutcome::Error(format!("closed: {reason}"));
            }
            RelayMessage::Notice(notice) => tracing::info!("{}: NOTICE: {}", url, notice),
            other => tracing::trace!("{}: ignoring {:?}", url, other),
        }
    };

    end_subscription_in_background(url, connection, sub);
    outcome
}

// Detached, so that `close` never waits on a relay that stalls while closing
fn end_subscription_in_background(url: &RelayUrl, mut connection: Box<dyn RelayConnection>, sub: String) {
    let url = url.clone();
    tokio::spawn(async move {
        end_subscription(&url, &mut connection, &sub).await;
    });
}

/// A subscription across many relays that resolves on the first event.
///
/// Closing is idempotent. Dropping an unclosed subscription cancels every
/// relay in the background.
pub struct FirstEventSubscription {
    sub: String,
    cancel: watch::Sender<bool>,
    rx: mpsc::UnboundedReceiver<Signal>,
    tasks: Vec<JoinHandle<(RelayUrl, RelayOutcome)>>,
    remaining: usize,
    deadline: Instant,
    closed: bool,
}

impl FirstEventSubscription {
    pub fn subscription_id(&self) -> &str {
        &self.sub
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the first event, the last relay to finish, or the deadline
    pub async fn first(&mut self) -> Option<RawEvent> {
        if self.closed {
            return None;
        }
        while self.remaining > 0 {
            let signal = tokio::select! {
                _ = tokio::time::sleep_until(self.deadline) => {
                    tracing::debug!("Subscription {} timed out", self.sub);
                    return None;
                }
                signal = self.rx.recv() => signal,
            };
            match signal {
                Some(Signal::Event(event)) => return Some(event),
                Some(Signal::Done) => self.remaining -= 1,
                None => break,
            }
        }
        None
    }

    /// Cancel every relay and collect how each fared. Relays are closed in
    /// the background. Later calls return nothing.
    pub async fn close(&mut self) -> Vec<(RelayUrl, RelayOutcome)> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        let _ = self.cancel.send(true);

        let tasks = std::mem::take(&mut self.tasks);
        let mut outcomes = Vec::with_capacity(tasks.len());
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(e) => tracing::error!("Relay subscription task failed: {}", e),
            }
        }
        outcomes
    }
}

impl Drop for FirstEventSubscription {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            // The relay tasks are detached and finish on their own
            let _ = self.cancel.send(true);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventKind;
    use crate::testing::{signed_event, tags, test_signer, url, MockRelay, MockTransport};

    fn pack(n: u8, d: &str, created_at: i64) -> RawEvent {
        signed_event(
            &test_signer(n),
            EventKind::CategorizedPeopleList,
            tags(&[&["d", d], &["title", d], &["L", "nostrguard"]]),
            "",
            created_at,
        )
    }

    fn pack_filter() -> Filter {
        Filter::new()
            .kind(EventKind::CategorizedPeopleList)
            .tag('L', "nostrguard")
    }

    fn fetcher(transport: MockTransport) -> (Arc<MockTransport>, EventFetcher) {
        let transport = Arc::new(transport);
        let fetcher = EventFetcher::new(transport.clone());
        (transport, fetcher)
    }

    #[test]
    fn test_dedup_first_seen_wins() {
        let a = pack(1, "a", 10);
        let b = pack(2, "b", 20);
        let mut a_copy = a.clone();
        a_copy.content = "different".to_owned();
        let out = dedup_by_id(vec![a.clone(), b.clone(), a_copy, b.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_merges_and_dedups() {
        let shared = pack(1, "shared", 10);
        let only_b = pack(2, "b", 20);
        let (transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay(
                    "wss://a.example",
                    MockRelay::new()
                        .with_event(Duration::from_millis(10), shared.clone())
                        .with_eose_after(Some(Duration::from_millis(20))),
                )
                .with_relay(
                    "wss://b.example",
                    MockRelay::new()
                        .with_event(Duration::from_millis(30), shared.clone())
                        .with_event(Duration::from_millis(40), only_b.clone())
                        .with_eose_after(Some(Duration::from_millis(50))),
                )
                .with_relay("wss://c.example", MockRelay::refusing()),
        );

        let relays = vec![url("wss://a.example"), url("wss://b.example"), url("wss://c.example")];
        let report = fetcher
            .query_report(&relays, &pack_filter(), Duration::from_secs(5))
            .await;

        assert_eq!(report.events, vec![shared, only_b]);
        assert_eq!(report.outcomes.len(), 3);
        let outcome_of = |u: &str| {
            report
                .outcomes
                .iter()
                .find(|(r, _)| r.as_str() == u)
                .map(|(_, o)| o.clone())
                .unwrap()
        };
        assert_eq!(outcome_of("wss://a.example"), RelayOutcome::Success);
        assert!(matches!(outcome_of("wss://c.example"), RelayOutcome::Error(_)));

        let log = transport.log();
        assert_eq!(log.close_count("wss://a.example"), 1);
        assert_eq!(log.close_count("wss://b.example"), 1);
        assert_eq!(log.closed_connections.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_drops_malformed_and_unmatched() {
        let good = pack(1, "good", 10);
        let mut bad_shape = pack(1, "bad", 11);
        bad_shape.sig = "nope".to_owned();
        let wrong_kind = signed_event(&test_signer(1), EventKind::Metadata, vec![], "{}", 12);
        let no_label = signed_event(
            &test_signer(1),
            EventKind::CategorizedPeopleList,
            tags(&[&["d", "x"]]),
            "",
            13,
        );

        // A misbehaving relay that ignores our filter
        let mut relay = MockRelay::new();
        relay.honor_filters = false;
        relay.events = vec![
            (Duration::ZERO, bad_shape),
            (Duration::ZERO, good.clone()),
            (Duration::ZERO, wrong_kind),
            (Duration::ZERO, no_label),
        ];
        let (_transport, fetcher) = fetcher(MockTransport::new().with_relay("wss://a.example", relay));

        let events = fetcher
            .query(&[url("wss://a.example")], &pack_filter(), Duration::from_secs(5))
            .await;
        assert_eq!(events, vec![good]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_drops_forged_events() {
        let good = pack(1, "good", 10);
        let mut tampered = pack(1, "tampered", 11);
        tampered.tags.push(vec!["p".to_owned(), "ab".repeat(32)]);
        let mut bad_sig = pack(2, "bad-sig", 12);
        bad_sig.sig = "00".repeat(64);
        let mut impostor = pack(2, "impostor", 13);
        impostor.pubkey = test_signer(3).public_key_hex().to_owned();

        let (_transport, fetcher) = fetcher(
            MockTransport::new().with_relay(
                "wss://a.example",
                MockRelay::new()
                    .with_event(Duration::ZERO, tampered)
                    .with_event(Duration::ZERO, bad_sig)
                    .with_event(Duration::ZERO, impostor)
                    .with_event(Duration::ZERO, good.clone()),
            ),
        );
        let relays = [url("wss://a.example")];
        let events = fetcher
            .query(&relays, &pack_filter(), Duration::from_secs(5))
            .await;
        assert_eq!(events, vec![good.clone()]);

        let first = fetcher
            .query_one(&relays, &pack_filter(), Duration::from_secs(5))
            .await;
        assert_eq!(first, Some(good));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_times_out_per_relay() {
        let early = pack(1, "early", 10);
        let (transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay(
                    "wss://slow.example",
                    MockRelay::silent().with_event(Duration::from_millis(100), early.clone()),
                )
                .with_relay("wss://hang.example", MockRelay::hanging()),
        );
        let start = Instant::now();
        let report = fetcher
            .query_report(
                &[url("wss://slow.example"), url("wss://hang.example")],
                &pack_filter(),
                Duration::from_millis(2000),
            )
            .await;
        assert!(start.elapsed() < Duration::from_millis(2100));
        assert_eq!(report.events, vec![early]);
        assert!(report
            .outcomes
            .iter()
            .all(|(_, o)| *o == RelayOutcome::Timeout));
        assert_eq!(transport.log().close_count("wss://slow.example"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_one_first_event_wins() {
        let wanted = pack(1, "wanted", 10);
        let (transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay(
                    "wss://a.example",
                    MockRelay::new()
                        .with_event(Duration::from_millis(200), wanted.clone())
                        .with_eose_after(Some(Duration::from_millis(300))),
                )
                .with_relay("wss://b.example", MockRelay::new())
                .with_relay("wss://c.example", MockRelay::new()),
        );

        let start = Instant::now();
        let event = fetcher
            .query_one(
                &[url("wss://a.example"), url("wss://b.example"), url("wss://c.example")],
                &pack_filter(),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(event, Some(wanted));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let log = transport.log();
        for relay in ["wss://a.example", "wss://b.example", "wss://c.example"] {
            assert_eq!(log.req_count(relay), 1);
            assert_eq!(log.close_count(relay), 1, "{relay}");
            assert!(log.closed_connections.iter().any(|u| u == relay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_one_all_empty_resolves_early() {
        let (_transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay(
                    "wss://a.example",
                    MockRelay::new().with_eose_after(Some(Duration::from_millis(50))),
                )
                .with_relay("wss://b.example", MockRelay::refusing()),
        );
        let start = Instant::now();
        let event = fetcher
            .query_one(
                &[url("wss://a.example"), url("wss://b.example")],
                &pack_filter(),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(event, None);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_one_nobody_answers() {
        let (transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay("wss://a.example", MockRelay::silent())
                .with_relay("wss://b.example", MockRelay::hanging()),
        );
        let start = Instant::now();
        let (event, outcomes) = fetcher
            .query_one_report(
                &[url("wss://a.example"), url("wss://b.example")],
                &pack_filter(),
                Duration::from_millis(5000),
            )
            .await;
        assert_eq!(event, None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5010));
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == RelayOutcome::Timeout));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.log().close_count("wss://a.example"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_one_does_not_wait_for_slow_close() {
        let wanted = pack(1, "wanted", 10);
        let (transport, fetcher) = fetcher(
            MockTransport::new()
                .with_relay(
                    "wss://a.example",
                    MockRelay::silent().with_event(Duration::from_millis(10), wanted.clone()),
                )
                .with_relay(
                    "wss://stall.example",
                    MockRelay::silent().with_close_delay(Duration::from_millis(900)),
                ),
        );

        let start = Instant::now();
        let (event, outcomes) = fetcher
            .query_one_report(
                &[url("wss://a.example"), url("wss://stall.example")],
                &pack_filter(),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(event, Some(wanted));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(outcomes.len(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let log = transport.log();
        assert_eq!(log.close_count("wss://stall.example"), 1);
        assert!(log.closed_connections.iter().any(|u| u == "wss://stall.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_closes_once() {
        let (transport, fetcher) =
            fetcher(MockTransport::new().with_relay("wss://a.example", MockRelay::silent()));
        let relays = [url("wss://a.example")];

        let mut subscription =
            fetcher.subscribe_first(&relays, &pack_filter(), Duration::from_millis(100));
        assert_eq!(subscription.first().await, None);
        assert_eq!(subscription.close().await.len(), 1);
        assert!(subscription.is_closed());
        assert!(subscription.close().await.is_empty());
        assert_eq!(subscription.first().await, None);
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.log().close_count("wss://a.example"), 1);

        // dropped without closing
        let subscription =
            fetcher.subscribe_first(&relays, &pack_filter(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.log().close_count("wss://a.example"), 2);
    }
}
