use crate::error::{Error, ErrorKind};
use crate::event::{is_hex_of_len, EventKind, PreEvent, RawEvent};
use crate::fetcher::EventFetcher;
use crate::filter::Filter;
use crate::keys::identity_to_hex;
use crate::manager::RelayManager;
use crate::metadata::{ProfileCache, ProfileMetadata};
use crate::mute::MuteList;
use crate::pack::{
    collapse_versions, deletion_pre_event, event_to_pack, new_pack_identifier, pack_pre_event,
    DomainPack, PackDraft,
};
use crate::publisher::{EventPublisher, PublishSummary};
use crate::relay::{RelayOutcome, RelayStats, RelayUrl, StatusUpdate};
use crate::settings::Settings;
use crate::signer::Signer;
use crate::transport::RelayTransport;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connection summary for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    pub initialized: bool,
    pub healthy: bool,
    pub connected_relays: usize,
    pub total_relays: usize,
    pub read_relays: usize,
    pub write_relays: usize,
}

/// Everything the application does with relays goes through here.
///
/// Reads go to the enabled read relays, writes to the enabled write relays,
/// and how each relay fared is fed back to the `RelayManager`.
pub struct PackClient {
    settings: Settings,
    manager: Arc<RelayManager>,
    fetcher: EventFetcher,
    publisher: EventPublisher,
    profiles: ProfileCache,
    initialized: AtomicBool,
}

impl PackClient {
    pub fn new(
        settings: Settings,
        manager: Arc<RelayManager>,
        transport: Arc<dyn RelayTransport>,
    ) -> PackClient {
        let publisher = EventPublisher::new(transport.clone(), settings.publish_timeout());
        PackClient {
            fetcher: EventFetcher::new(transport),
            publisher,
            profiles: ProfileCache::new(),
            initialized: AtomicBool::new(false),
            settings,
            manager,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn manager(&self) -> &RelayManager {
        &self.manager
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    fn read_urls(&self) -> Vec<RelayUrl> {
        self.manager
            .get_read_relays()
            .into_iter()
            .map(|r| r.url)
            .collect()
    }

    fn write_urls(&self) -> Vec<RelayUrl> {
        self.manager
            .get_write_relays()
            .into_iter()
            .map(|r| r.url)
            .collect()
    }

    fn record(&self, outcomes: &[(RelayUrl, RelayOutcome)]) {
        for (url, outcome) in outcomes {
            self.manager.record_outcome(url, outcome);
        }
    }

    // ---- connection management ----

    /// Probe every read relay. Returns how many answered.
    pub async fn connect_to_relays(&self) -> usize {
        let urls = self.read_urls();
        tracing::info!("Connecting to {} relays", urls.len());
        let timeout = self.settings.connect_probe_timeout();
        let probes = urls
            .iter()
            .map(|url| self.manager.test_relay_with_timeout(url, timeout));
        let results = futures::future::join_all(probes).await;
        for (url, result) in urls.iter().zip(results.iter()) {
            if result.success {
                tracing::debug!("Connected to {}", url);
            } else {
                tracing::warn!("Failed to connect to {}: {:?}", url, result.error);
            }
        }
        self.initialized.store(true, Ordering::Relaxed);
        results.iter().filter(|r| r.success).count()
    }

    pub async fn reconnect(&self) -> usize {
        tracing::info!("Reconnecting to relays");
        self.connect_to_relays().await
    }

    pub fn disconnect(&self) {
        for relay in self.manager.get_relays() {
            self.manager
                .update_connection_status(&relay.url, StatusUpdate::disconnected());
        }
        self.initialized.store(false, Ordering::Relaxed);
        tracing::info!("Disconnected from all relays");
    }

    /// Relays in the active set currently marked connected
    pub fn connected_relays(&self) -> Vec<RelayUrl> {
        self.manager
            .get_all_connection_statuses()
            .into_iter()
            .filter(|s| s.connected)
            .filter(|s| self.manager.get_relay(&s.url).is_some())
            .map(|s| s.url)
            .collect()
    }

    /// At least half of the read relays (rounded up) are connected
    pub fn is_healthy(&self) -> bool {
        if !self.initialized.load(Ordering::Relaxed) {
            return false;
        }
        let read = self.manager.get_read_relays().len();
        self.connected_relays().len() >= (read + 1) / 2
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            initialized: self.initialized.load(Ordering::Relaxed),
            healthy: self.is_healthy(),
            connected_relays: self.connected_relays().len(),
            total_relays: self.manager.get_relay_stats().total,
            read_relays: self.manager.get_read_relays().len(),
            write_relays: self.manager.get_write_relays().len(),
        }
    }

    pub fn relay_stats(&self) -> RelayStats {
        self.manager.get_relay_stats()
    }

    // ---- reading packs ----

    fn pack_filter(&self) -> Filter {
        Filter::new()
            .kind(EventKind::CategorizedPeopleList)
            .tag('L', &self.settings.pack_label)
    }

    /// The most recent packs, newest first
    pub async fn get_all_packs(&self, limit: Option<usize>) -> Vec<DomainPack> {
        let limit = limit.unwrap_or(self.settings.pack_limit);
        self.fetch_packs(self.pack_filter().limit(limit)).await
    }

    pub async fn get_packs_by_creator(
        &self,
        creator: &str,
        limit: Option<usize>,
    ) -> Result<Vec<DomainPack>, Error> {
        let pubkey = identity_to_hex(creator)?;
        let limit = limit.unwrap_or(self.settings.creator_pack_limit);
        let filter = self.pack_filter().author(&pubkey).limit(limit);
        Ok(self.fetch_packs(filter).await)
    }

    /// Packs whose name, description or tags contain `query`, ignoring case
    pub async fn search_packs(&self, query: &str, limit: Option<usize>) -> Vec<DomainPack> {
        let limit = limit.unwrap_or(self.settings.search_limit);
        let packs = self.fetch_packs(self.pack_filter().limit(limit)).await;
        packs
            .into_iter()
            .filter(|p| p.matches_query(query))
            .collect()
    }

    /// Look up one pack by event id (64 hex) or by its `d` identifier
    pub async fn get_pack_by_id(&self, id: &str) -> Option<DomainPack> {
        let filter = if is_hex_of_len(id, 64) {
            Filter::new().id(id)
        } else {
            Filter::new()
                .kind(EventKind::CategorizedPeopleList)
                .tag('d', id)
        }
        .limit(1);

        let (event, outcomes) = self
            .fetcher
            .query_one_report(&self.read_urls(), &filter, self.settings.lookup_timeout())
            .await;
        self.record(&outcomes);

        let mut pack = event.as_ref().and_then(event_to_pack)?;
        self.profiles.enrich(&mut pack.creator);
        Some(pack)
    }

    async fn fetch_packs(&self, filter: Filter) -> Vec<DomainPack> {
        let report = self
            .fetcher
            .query_report(&self.read_urls(), &filter, self.settings.fetch_timeout())
            .await;
        self.record(&report.outcomes);

        let total = report.events.len();
        let packs: Vec<DomainPack> = report.events.iter().filter_map(event_to_pack).collect();
        if packs.len() < total {
            tracing::debug!("{} of {} events were not packs", total - packs.len(), total);
        }
        let mut packs = collapse_versions(packs);
        for pack in packs.iter_mut() {
            self.profiles.enrich(&mut pack.creator);
        }
        tracing::info!("Found {} packs", packs.len());
        packs
    }

    /// Look up profiles for creators we have not seen yet, in one query,
    /// then fill in the creators
    pub async fn enrich_creators(&self, packs: &mut [DomainPack]) {
        let mut missing: Vec<String> = Vec::new();
        for pack in packs.iter() {
            let pubkey = &pack.creator.pubkey;
            if self.profiles.get(pubkey).is_none() && !missing.contains(pubkey) {
                missing.push(pubkey.clone());
            }
        }

        if !missing.is_empty() {
            let filter = missing
                .iter()
                .fold(Filter::new().kind(EventKind::Metadata), |f, pk| f.author(pk))
                .limit(missing.len());
            let report = self
                .fetcher
                .query_report(&self.read_urls(), &filter, self.settings.lookup_timeout())
                .await;
            self.record(&report.outcomes);

            let newest = newest_per_author(report.events);
            let answered = report.outcomes.iter().any(|(_, o)| o.is_success());
            for pubkey in missing.iter() {
                let metadata = newest.get(pubkey).and_then(ProfileMetadata::from_event);
                if metadata.is_some() || answered {
                    self.profiles.insert(pubkey, metadata);
                }
            }
        }

        for pack in packs.iter_mut() {
            self.profiles.enrich(&mut pack.creator);
        }
    }

    // ---- writing packs ----

    async fn sign_and_publish(
        &self,
        signer: &dyn Signer,
        pre_event: PreEvent,
    ) -> Result<(RawEvent, PublishSummary), Error> {
        let event = signer.sign_event(pre_event).await?;
        let summary = self.publish(&event).await?;
        Ok((event, summary))
    }

    /// Publish a signed event to the write relays
    pub async fn publish(&self, event: &RawEvent) -> Result<PublishSummary, Error> {
        let result = self.publisher.publish(&self.write_urls(), event).await;
        let summary = match &result {
            Ok(summary) => Some(summary),
            Err(e) => match &e.kind {
                ErrorKind::NoRelaySuccess(summary) => Some(summary),
                _ => None,
            },
        };
        if let Some(summary) = summary {
            for r in summary.per_relay.iter() {
                self.manager.record_outcome(&r.url, &r.status);
            }
        }
        result
    }

    /// Publish a new pack under a fresh identifier
    pub async fn create_pack(
        &self,
        signer: &dyn Signer,
        draft: &PackDraft,
    ) -> Result<(DomainPack, PublishSummary), Error> {
        let d = new_pack_identifier();
        self.publish_pack(signer, &d, draft).await
    }

    /// Publish a new version of an existing pack. It replaces the old one
    /// because it shares the author and `d` identifier.
    pub async fn update_pack(
        &self,
        signer: &dyn Signer,
        d: &str,
        draft: &PackDraft,
    ) -> Result<(DomainPack, PublishSummary), Error> {
        self.publish_pack(signer, d, draft).await
    }

    async fn publish_pack(
        &self,
        signer: &dyn Signer,
        d: &str,
        draft: &PackDraft,
    ) -> Result<(DomainPack, PublishSummary), Error> {
        let pre_event = pack_pre_event(d, draft, &self.settings.pack_label)?;
        let (event, summary) = self.sign_and_publish(signer, pre_event).await?;
        let mut pack = match event_to_pack(&event) {
            Some(pack) => pack,
            None => return Err(ErrorKind::InvalidPack(format!("event {}", event.id)).into()),
        };
        self.profiles.enrich(&mut pack.creator);
        tracing::info!(
            "Published pack {} ({} members) to {} relays",
            pack.id,
            pack.scammer_count,
            summary.success_count
        );
        Ok((pack, summary))
    }

    /// Ask relays to drop one of our packs
    pub async fn delete_pack(&self, signer: &dyn Signer, d: &str) -> Result<PublishSummary, Error> {
        let pubkey = signer.public_key().await?;
        let pre_event = deletion_pre_event(&pubkey, d);
        let (event, summary) = self.sign_and_publish(signer, pre_event).await?;
        tracing::info!("Deleted pack {} with {}", d, event.id);
        Ok(summary)
    }

    // ---- mute lists ----

    /// The newest mute list of this user, if any relay has one.
    ///
    /// Fails when no read relay finished the query, so that an unreachable
    /// list is never mistaken for an absent one.
    pub async fn get_mute_list(&self, owner: &str) -> Result<Option<MuteList>, Error> {
        let pubkey = identity_to_hex(owner)?;
        let filter = Filter::new()
            .kind(EventKind::MuteList)
            .author(&pubkey)
            .limit(1);
        let report = self
            .fetcher
            .query_report(&self.read_urls(), &filter, self.settings.fetch_timeout())
            .await;
        self.record(&report.outcomes);
        if !report.outcomes.iter().any(|(_, o)| o.is_success()) {
            return Err(ErrorKind::General(format!(
                "No relay answered for the mute list of {}",
                pubkey
            ))
            .into());
        }

        let newest = report
            .events
            .into_iter()
            .reduce(|best, e| if e.supersedes(&best) { e } else { best });
        Ok(newest.as_ref().map(MuteList::from_event))
    }

    /// Add accounts to the signer's mute list and publish the whole list
    pub async fn block_accounts<S: AsRef<str>>(
        &self,
        signer: &dyn Signer,
        identities: &[S],
    ) -> Result<(MuteList, PublishSummary), Error> {
        let owner = signer.public_key().await?;
        let mut list = match self.get_mute_list(&owner).await? {
            Some(list) => list,
            None => MuteList::new(&owner),
        };
        let added = list.merge(identities)?;
        tracing::info!(
            "Muting {} new accounts ({} total)",
            added,
            list.members.len()
        );
        let (_event, summary) = self.sign_and_publish(signer, list.to_pre_event()).await?;
        Ok((list, summary))
    }

    // ---- profiles ----

    pub async fn get_profile(&self, identity: &str) -> Result<Option<ProfileMetadata>, Error> {
        let pubkey = identity_to_hex(identity)?;
        if let Some(cached) = self.profiles.get(&pubkey) {
            return Ok(cached);
        }

        let filter = Filter::new()
            .kind(EventKind::Metadata)
            .author(&pubkey)
            .limit(1);
        let (event, outcomes) = self
            .fetcher
            .query_one_report(&self.read_urls(), &filter, self.settings.lookup_timeout())
            .await;
        self.record(&outcomes);

        let metadata = event.as_ref().and_then(ProfileMetadata::from_event);
        if metadata.is_some() || outcomes.iter().any(|(_, o)| o.is_success()) {
            self.profiles.insert(&pubkey, metadata.clone());
        }
        Ok(metadata)
    }
}

fn newest_per_author(events: Vec<RawEvent>) -> HashMap<String, RawEvent> {
    let mut newest: HashMap<String, RawEvent> = HashMap::new();
    for event in events {
        match newest.get(&event.pubkey) {
            Some(existing) if !event.supersedes(existing) => {}
            _ => {
                let _ = newest.insert(event.pubkey.clone(), event);
            }
        }
    }
    newest
}

/// Distinct hex members of the given packs, in pack order
pub fn pack_members(packs: &[DomainPack]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    packs
        .iter()
        .flat_map(|p| p.npubs.iter())
        .filter_map(|n| identity_to_hex(n).ok())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}
