use crate::error::{Error, ErrorKind};
use crate::event::{EventKind, PreEvent, RawEvent};
use crate::keys::{identity_to_hex, normalize_identity};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

/// Label namespace our packs are published under
pub const PACK_LABEL: &str = "nostrguard";

const PACK_CONTENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// A scammer pack, as read from a kind 30001 event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPack {
    /// The `d` tag
    pub id: String,
    pub name: String,
    pub description: String,
    pub npubs: Vec<String>,
    pub tags: Vec<String>,
    pub creator: Creator,
    pub scammer_count: usize,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
    pub event_id: String,
}

impl DomainPack {
    /// Case-insensitive substring match over name, description and tags
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }

    /// Newer first. Equal times put the smaller event id first.
    pub fn newest_first(a: &DomainPack, b: &DomainPack) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.event_id.cmp(&b.event_id))
    }
}

/// What the user fills in to create or edit a pack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackDraft {
    pub name: String,
    pub description: String,
    /// `npub` or hex identities
    pub npubs: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct PackContent {
    #[serde(default)]
    npubs: Vec<serde_json::Value>,
}

/// Map a pack event to a pack. `None` if the `d` or `title` tag is missing.
pub fn event_to_pack(event: &RawEvent) -> Option<DomainPack> {
    let id = match event.tag_value("d") {
        Some(d) => d.to_owned(),
        None => {
            tracing::debug!("Event {} is not a pack: no d tag", event.id);
            return None;
        }
    };
    let name = match event.tag_value("title") {
        Some(t) => t.to_owned(),
        None => {
            tracing::debug!("Event {} is not a pack: no title tag", event.id);
            return None;
        }
    };
    let description = event.tag_value("description").unwrap_or("").to_owned();

    let mut candidates: Vec<String> = event.tag_values("p").map(|s| s.to_owned()).collect();
    if !event.content.is_empty() {
        // best effort, content may be anything
        if let Ok(content) = serde_json::from_str::<PackContent>(&event.content) {
            candidates.extend(
                content
                    .npubs
                    .into_iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_owned())),
            );
        }
    }
    let mut seen: HashSet<String> = HashSet::new();
    let npubs: Vec<String> = candidates
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| normalize_identity(s))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    let tags: Vec<String> = event.tag_values("t").map(|s| s.to_owned()).collect();

    let created_at = match OffsetDateTime::from_unix_timestamp(event.created_at) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("Event {} has an unusable timestamp: {}", event.id, e);
            return None;
        }
    };

    Some(DomainPack {
        id,
        name,
        description,
        scammer_count: npubs.len(),
        npubs,
        tags,
        creator: Creator {
            name: "Unknown".to_owned(),
            pubkey: event.pubkey.clone(),
            picture: None,
        },
        created_at,
        updated_at: created_at,
        event_id: event.id.clone(),
    })
}

/// The unsigned kind 30001 event for a pack
pub fn pack_pre_event(d: &str, draft: &PackDraft, label: &str) -> Result<PreEvent, Error> {
    if d.is_empty() {
        return Err(ErrorKind::InvalidPack("empty identifier".to_owned()).into());
    }
    if draft.name.trim().is_empty() {
        return Err(ErrorKind::InvalidPack("a pack needs a name".to_owned()).into());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut members: Vec<(String, String)> = Vec::new(); // (hex, npub)
    for identity in draft.npubs.iter() {
        if identity.trim().is_empty() {
            continue;
        }
        let hex = identity_to_hex(identity)?;
        if seen.insert(hex.clone()) {
            let npub = normalize_identity(&hex);
            members.push((hex, npub));
        }
    }

    let mut tags: Vec<Vec<String>> = vec![
        vec!["d".to_owned(), d.to_owned()],
        vec!["title".to_owned(), draft.name.clone()],
        vec!["description".to_owned(), draft.description.clone()],
        vec!["L".to_owned(), label.to_owned()],
        vec!["l".to_owned(), "scammer-pack".to_owned(), label.to_owned()],
    ];
    for (hex, _) in members.iter() {
        tags.push(vec![
            "p".to_owned(),
            hex.clone(),
            "".to_owned(),
            "scammer".to_owned(),
        ]);
    }
    for t in draft.tags.iter() {
        tags.push(vec!["t".to_owned(), t.clone()]);
    }

    let npubs: Vec<&str> = members.iter().map(|(_, npub)| npub.as_str()).collect();
    let content = serde_json::to_string(&serde_json::json!({
        "version": PACK_CONTENT_VERSION,
        "npubs": npubs,
    }))?;

    Ok(PreEvent::new(EventKind::CategorizedPeopleList, tags, content))
}

/// The unsigned kind 5 event that retracts a pack
pub fn deletion_pre_event(author_pubkey: &str, d: &str) -> PreEvent {
    let kind: u32 = EventKind::CategorizedPeopleList.into();
    PreEvent::new(
        EventKind::EventDeletion,
        vec![
            vec!["a".to_owned(), format!("{kind}:{author_pubkey}:{d}")],
            vec!["k".to_owned(), kind.to_string()],
        ],
        "Pack deleted".to_owned(),
    )
}

/// A fresh random `d` identifier
pub fn new_pack_identifier() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Keep only the latest version of each pack, per author and identifier,
/// newest first
pub fn collapse_versions(packs: Vec<DomainPack>) -> Vec<DomainPack> {
    let mut latest: HashMap<(String, String), DomainPack> = HashMap::new();
    for pack in packs {
        let key = (pack.creator.pubkey.clone(), pack.id.clone());
        match latest.get(&key) {
            Some(existing) if DomainPack::newest_first(existing, &pack) != Ordering::Greater => {}
            _ => {
                let _ = latest.insert(key, pack);
            }
        }
    }
    let mut out: Vec<DomainPack> = latest.into_values().collect();
    out.sort_by(DomainPack::newest_first);
    out
}
