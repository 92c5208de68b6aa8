use crate::event::unixtime_now_ms;
use crate::probe::RelayHealthProbe;
use crate::relay::{
    ConnectionStatus, ProbeFailure, ProbeResult, RelayOutcome, RelayRecord, RelayStats,
    RelayUpdate, RelayUrl, StatusUpdate,
};
use crate::relay_config::RelayConfigStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

struct ManagerState {
    relays: Vec<RelayRecord>,
    statuses: HashMap<RelayUrl, ConnectionStatus>,
    user: Option<String>,
}

/// Owns the active relay set and its health bookkeeping.
///
/// Every mutation is persisted while the write lock is held. No lock is held
/// across an await.
pub struct RelayManager {
    state: RwLock<ManagerState>,
    config: RelayConfigStore,
    probe: RelayHealthProbe,
    probe_timeout: Duration,
}

impl RelayManager {
    pub fn new(config: RelayConfigStore, probe: RelayHealthProbe) -> RelayManager {
        let loaded = config.load();
        tracing::debug!(
            "Loaded {} relays (user: {:?})",
            loaded.relays.len(),
            loaded.user_pubkey
        );
        RelayManager {
            state: RwLock::new(ManagerState {
                relays: loaded.relays,
                statuses: HashMap::new(),
                user: loaded.user_pubkey,
            }),
            config,
            probe,
            probe_timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> RelayManager {
        self.probe_timeout = timeout;
        self
    }

    pub fn probe(&self) -> &RelayHealthProbe {
        &self.probe
    }

    fn persist(&self, state: &ManagerState) {
        self.config.save(&state.relays, state.user.as_deref());
        if let Some(user) = &state.user {
            self.config.save_for_user(user, &state.relays);
        }
    }

    /// Switch the active user. Their relays replace the active set.
    pub fn set_user(&self, pubkey: Option<String>) {
        let mut state = self.state.write();
        state.relays = match &pubkey {
            Some(pk) => self.config.load_for_user(pk),
            None => self.config.defaults(),
        };
        state.user = pubkey;
        tracing::info!(
            "Relay set switched to {} relays for user {:?}",
            state.relays.len(),
            state.user
        );
        self.persist(&state);
    }

    pub fn user(&self) -> Option<String> {
        self.state.read().user.clone()
    }

    pub fn get_relays(&self) -> Vec<RelayRecord> {
        self.state.read().relays.clone()
    }

    pub fn get_enabled_relays(&self) -> Vec<RelayRecord> {
        self.filtered(|r| r.enabled)
    }

    pub fn get_read_relays(&self) -> Vec<RelayRecord> {
        self.filtered(|r| r.enabled && r.read)
    }

    pub fn get_write_relays(&self) -> Vec<RelayRecord> {
        self.filtered(|r| r.enabled && r.write)
    }

    fn filtered<F: Fn(&RelayRecord) -> bool>(&self, f: F) -> Vec<RelayRecord> {
        self.state
            .read()
            .relays
            .iter()
            .filter(|r| f(r))
            .cloned()
            .collect()
    }

    pub fn get_relay(&self, url: &RelayUrl) -> Option<RelayRecord> {
        self.state
            .read()
            .relays
            .iter()
            .find(|r| &r.url == url)
            .cloned()
    }

    /// Enabled relays, highest priority first
    pub fn get_relays_by_priority(&self) -> Vec<RelayRecord> {
        let mut relays = self.get_enabled_relays();
        relays.sort_by_key(|r| r.priority);
        relays
    }

    /// Add a relay below every existing one. False if the url is already
    /// present.
    pub fn add_relay(&self, mut record: RelayRecord) -> bool {
        let mut state = self.state.write();
        if state.relays.iter().any(|r| r.url == record.url) {
            return false;
        }
        let max_priority = state
            .relays
            .iter()
            .map(|r| r.priority)
            .max()
            .unwrap_or(0)
            .max(0);
        record.priority = max_priority + 1;
        tracing::info!("Adding relay {} at priority {}", record.url, record.priority);
        state.relays.push(record);
        self.persist(&state);
        true
    }

    pub fn update_relay(&self, url: &RelayUrl, update: &RelayUpdate) -> bool {
        let mut state = self.state.write();
        match state.relays.iter_mut().find(|r| &r.url == url) {
            Some(record) => record.apply(update),
            None => return false,
        }
        self.persist(&state);
        true
    }

    pub fn remove_relay(&self, url: &RelayUrl) -> bool {
        let mut state = self.state.write();
        let before = state.relays.len();
        state.relays.retain(|r| &r.url != url);
        if state.relays.len() == before {
            return false;
        }
        tracing::info!("Removed relay {}", url);
        self.persist(&state);
        true
    }

    pub fn reset_to_defaults(&self) {
        let mut state = self.state.write();
        state.relays = self.config.defaults();
        self.persist(&state);
    }

    /// True if at least one regional relay was newly added
    pub fn add_regional_relays(&self, region: &str) -> bool {
        let regional = match self.config.regional(region) {
            Some(r) => r,
            None => {
                tracing::warn!("Unknown region: {}", region);
                return false;
            }
        };
        let mut added = 0;
        for record in regional {
            if self.add_relay(record) {
                added += 1;
            }
        }
        added > 0
    }

    pub fn update_connection_status(&self, url: &RelayUrl, update: StatusUpdate) {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state
            .statuses
            .entry(url.clone())
            .or_insert_with(|| ConnectionStatus::new(url.clone()))
            .apply(&update);

        let record = match state.relays.iter_mut().find(|r| &r.url == url) {
            Some(r) => r,
            None => return,
        };
        if update.connected == Some(true) {
            record.last_connected = Some(unixtime_now_ms());
            record.connection_count += 1;
            record.error_count = record.error_count.saturating_sub(1);
        } else if update.sets_error() {
            record.error_count += 1;
        } else {
            return;
        }
        self.persist(state);
    }

    pub fn get_connection_status(&self, url: &RelayUrl) -> Option<ConnectionStatus> {
        self.state.read().statuses.get(url).cloned()
    }

    pub fn get_all_connection_statuses(&self) -> Vec<ConnectionStatus> {
        self.state.read().statuses.values().cloned().collect()
    }

    pub fn get_relay_stats(&self) -> RelayStats {
        let state = self.state.read();
        let mut stats = RelayStats {
            total: state.relays.len(),
            enabled: state.relays.iter().filter(|r| r.enabled).count(),
            ..Default::default()
        };
        for status in state.statuses.values() {
            if !state.relays.iter().any(|r| r.url == status.url) {
                continue;
            }
            if status.connected {
                stats.connected += 1;
            }
            if status.connecting {
                stats.connecting += 1;
            }
            if status.failed() {
                stats.failed += 1;
            }
        }
        stats
    }

    /// Enabled relays ranked by priority, penalized by errors and helped by
    /// successful connections
    pub fn get_recommended_relays(&self, max_count: usize) -> Vec<RelayRecord> {
        let mut relays = self.get_enabled_relays();
        relays.sort_by_key(|r| r.recommendation_score());
        relays.truncate(max_count);
        relays
    }

    /// Feed back how a relay handled a fetch or publish
    pub fn record_outcome(&self, url: &RelayUrl, outcome: &RelayOutcome) {
        let update = match outcome {
            RelayOutcome::Success => StatusUpdate::connected(),
            RelayOutcome::Timeout => StatusUpdate::failed("timeout".to_owned(), unixtime_now_ms()),
            RelayOutcome::Error(detail) => StatusUpdate::failed(detail.clone(), unixtime_now_ms()),
        };
        self.update_connection_status(url, update);
    }

    pub async fn test_relay(&self, url: &RelayUrl) -> ProbeResult {
        self.test_relay_with_timeout(url, self.probe_timeout).await
    }

    pub async fn test_relay_with_timeout(&self, url: &RelayUrl, timeout: Duration) -> ProbeResult {
        self.update_connection_status(url, StatusUpdate::connecting());

        let result = self.probe.probe(url, timeout).await;

        if result.success {
            self.update_connection_status(url, StatusUpdate::connected());
            if let Some(sample) = result.response_time_ms {
                let mut state = self.state.write();
                if let Some(record) = state.relays.iter_mut().find(|r| &r.url == url) {
                    // Equal weight to the old average and the new sample
                    let old = record.avg_response_time.unwrap_or(0);
                    record.avg_response_time = Some((old + sample + 1) / 2);
                    self.persist(&state);
                }
            }
        } else {
            let error = result
                .error
                .unwrap_or(ProbeFailure::ConnectionFailed)
                .to_string();
            self.update_connection_status(url, StatusUpdate::failed(error, unixtime_now_ms()));
        }

        result
    }

    /// Probe every enabled relay concurrently
    pub async fn test_all_relays(&self) -> HashMap<RelayUrl, ProbeResult> {
        let urls: Vec<RelayUrl> = self
            .get_enabled_relays()
            .into_iter()
            .map(|r| r.url)
            .collect();
        let futures = urls.iter().map(|url| self.test_relay(url));
        let results = futures::future::join_all(futures).await;
        let map: HashMap<RelayUrl, ProbeResult> = urls.into_iter().zip(results).collect();
        tracing::info!(
            "Tested {} relays, {} reachable",
            map.len(),
            map.values().filter(|r| r.success).count()
        );
        map
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::relay::default_relays;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::testing::{url, ConnectBehavior, MockRelay, MockTransport};
    use std::sync::Arc;

    fn manager_with(transport: MockTransport) -> (Arc<MemoryStore>, RelayManager) {
        let memory = Arc::new(MemoryStore::new());
        let config = RelayConfigStore::new(memory.clone());
        let probe = RelayHealthProbe::new(Arc::new(transport));
        (memory, RelayManager::new(config, probe))
    }

    fn manager() -> (Arc<MemoryStore>, RelayManager) {
        manager_with(MockTransport::new())
    }

    #[test]
    fn test_filters() {
        let (_memory, manager) = manager();
        assert_eq!(manager.get_relays().len(), 7);
        assert_eq!(manager.get_enabled_relays().len(), 5);
        assert_eq!(manager.get_read_relays().len(), 5);
        assert_eq!(manager.get_write_relays().len(), 4);
        let by_priority: Vec<i64> = manager
            .get_relays_by_priority()
            .iter()
            .map(|r| r.priority)
            .collect();
        assert_eq!(by_priority, vec![1, 1, 3, 3, 4]);
    }

    #[test]
    fn test_add_relay() {
        let (memory, manager) = manager();
        let record = RelayRecord::new(url("wss://new.example"));
        assert!(manager.add_relay(record.clone()));
        assert_eq!(manager.get_relays().len(), 8);
        assert_eq!(manager.get_relay(&record.url).unwrap().priority, 6);

        // duplicate url leaves the set alone
        assert!(!manager.add_relay(record));
        assert_eq!(manager.get_relays().len(), 8);

        assert!(memory
            .get("relay-config")
            .unwrap()
            .unwrap()
            .contains("wss://new.example"));
    }

    #[test]
    fn test_update_and_remove() {
        let (_memory, manager) = manager();
        let damus = url("wss://relay.damus.io");
        assert!(manager.update_relay(&damus, &RelayUpdate::enabled(false)));
        assert!(!manager.get_relay(&damus).unwrap().enabled);
        assert!(!manager.update_relay(&url("wss://nope.example"), &RelayUpdate::enabled(true)));

        assert!(manager.remove_relay(&damus));
        assert!(!manager.remove_relay(&damus));
        assert_eq!(manager.get_relays().len(), 6);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (_memory, manager) = manager();
        let _ = manager.remove_relay(&url("wss://nos.lol"));
        manager.reset_to_defaults();
        let once = manager.get_relays();
        manager.reset_to_defaults();
        assert_eq!(manager.get_relays(), once);
        assert_eq!(once, default_relays());
    }

    #[test]
    fn test_regional_relays() {
        let (_memory, manager) = manager();
        assert!(manager.add_regional_relays("europe"));
        assert_eq!(manager.get_relays().len(), 9);
        assert!(!manager.add_regional_relays("europe"));
        assert!(!manager.add_regional_relays("atlantis"));
    }

    #[test]
    fn test_connection_counts() {
        let (_memory, manager) = manager();
        let damus = url("wss://relay.damus.io");

        manager.update_connection_status(&damus, StatusUpdate::failed("x".to_owned(), 1));
        manager.update_connection_status(&damus, StatusUpdate::failed("y".to_owned(), 2));
        assert_eq!(manager.get_relay(&damus).unwrap().error_count, 2);

        let mut last = 0;
        for _ in 0..4 {
            manager.update_connection_status(&damus, StatusUpdate::connected());
            let record = manager.get_relay(&damus).unwrap();
            assert!(record.connection_count > last);
            last = record.connection_count;
            assert!(record.last_connected.is_some());
        }
        assert_eq!(manager.get_relay(&damus).unwrap().error_count, 0);

        // connecting alone touches nothing persisted
        manager.update_connection_status(&damus, StatusUpdate::connecting());
        assert_eq!(manager.get_relay(&damus).unwrap().connection_count, 4);
        let status = manager.get_connection_status(&damus).unwrap();
        assert!(status.connected && status.connecting);
    }

    #[test]
    fn test_relay_stats() {
        let (_memory, manager) = manager();
        manager.update_connection_status(&url("wss://relay.damus.io"), StatusUpdate::connected());
        manager.update_connection_status(&url("wss://nos.lol"), StatusUpdate::connecting());
        manager.update_connection_status(
            &url("wss://offchain.pub"),
            StatusUpdate::failed("timeout".to_owned(), 1),
        );
        // not in the active set
        manager.update_connection_status(&url("wss://gone.example"), StatusUpdate::connected());

        let stats = manager.get_relay_stats();
        assert_eq!(
            stats,
            RelayStats {
                total: 7,
                enabled: 5,
                connected: 1,
                connecting: 1,
                failed: 1,
            }
        );
        assert_eq!(manager.get_all_connection_statuses().len(), 4);
    }

    #[test]
    fn test_recommended_relays() {
        let (_memory, manager) = manager();
        let band = url("wss://relay.nostr.band");
        for _ in 0..5 {
            manager.update_connection_status(&band, StatusUpdate::connected());
        }
        let recommended = manager.get_recommended_relays(2);
        assert_eq!(recommended.len(), 2);
        assert_eq!(recommended[0].url, band);
        assert_eq!(recommended[1].url.as_str(), "wss://relay.damus.io");
    }

    #[test]
    fn test_user_switching() {
        let (memory, manager) = manager();
        let alice = "a".repeat(64);
        manager.set_user(Some(alice.clone()));
        assert_eq!(manager.user(), Some(alice.clone()));
        assert!(manager.add_relay(RelayRecord::new(url("wss://alice.example"))));
        assert!(memory
            .get(&RelayConfigStore::user_key(&alice))
            .unwrap()
            .is_some());

        manager.set_user(None);
        assert_eq!(manager.get_relays(), default_relays());

        manager.set_user(Some(alice.clone()));
        assert!(manager.get_relay(&url("wss://alice.example")).is_some());

        // a fresh manager restores the last user and relay set
        let config = RelayConfigStore::new(memory.clone());
        let probe = RelayHealthProbe::new(Arc::new(MockTransport::new()));
        let restored = RelayManager::new(config, probe);
        assert_eq!(restored.user(), Some(alice));
        assert_eq!(restored.get_relays().len(), 8);
    }

    #[test]
    fn test_user_removals_survive_switching() {
        let (_memory, manager) = manager();
        let alice = "a".repeat(64);
        let nos = url("wss://nos.lol");
        manager.set_user(Some(alice.clone()));
        assert!(manager.remove_relay(&nos));

        manager.set_user(None);
        assert!(manager.get_relay(&nos).is_some());

        manager.set_user(Some(alice));
        assert!(manager.get_relay(&nos).is_none());
        assert_eq!(manager.get_relays().len(), default_relays().len() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_relay_updates_health() {
        let transport = MockTransport::new()
            .with_relay(
                "wss://relay.damus.io",
                MockRelay::new().with_connect(ConnectBehavior::AcceptAfter(Duration::from_millis(100))),
            )
            .with_relay("wss://nos.lol", MockRelay::refusing())
            .with_relay("wss://relay.nostr.band", MockRelay::hanging());
        let (_memory, manager) = manager_with(transport);
        let manager = manager.with_probe_timeout(Duration::from_millis(1000));

        let damus = url("wss://relay.damus.io");
        let result = manager.test_relay(&damus).await;
        assert!(result.success);
        assert_eq!(manager.get_relay(&damus).unwrap().avg_response_time, Some(50));
        let _ = manager.test_relay(&damus).await;
        assert_eq!(manager.get_relay(&damus).unwrap().avg_response_time, Some(75));

        let results = manager.test_all_relays().await;
        assert_eq!(results.len(), 5);
        assert_eq!(
            results[&url("wss://nos.lol")].error,
            Some(ProbeFailure::ConnectionFailed)
        );
        assert_eq!(
            results[&url("wss://relay.nostr.band")].error,
            Some(ProbeFailure::Timeout)
        );

        let band = manager.get_connection_status(&url("wss://relay.nostr.band")).unwrap();
        assert_eq!(band.error.as_deref(), Some("timeout"));
        assert!(band.last_attempt.is_some());
        assert!(!band.connecting);
        assert_eq!(manager.get_relay_stats().connected, 1);
    }

    #[test]
    fn test_record_outcome() {
        let (_memory, manager) = manager();
        let damus = url("wss://relay.damus.io");
        manager.record_outcome(&damus, &RelayOutcome::Error("blocked".to_owned()));
        let status = manager.get_connection_status(&damus).unwrap();
        assert_eq!(status.error.as_deref(), Some("blocked"));
        assert_eq!(manager.get_relay(&damus).unwrap().error_count, 1);
        manager.record_outcome(&damus, &RelayOutcome::Success);
        assert_eq!(manager.get_relay(&damus).unwrap().error_count, 0);
        assert_eq!(manager.get_relay_stats().connected, 1);
    }
}
