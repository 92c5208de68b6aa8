use crate::event::{EventKind, RawEvent};
use crate::pack::Creator;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind 0 profile metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
}

impl ProfileMetadata {
    pub fn from_event(event: &RawEvent) -> Option<ProfileMetadata> {
        if event.event_kind() != EventKind::Metadata {
            return None;
        }
        match serde_json::from_str(&event.content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::debug!("Unusable metadata in {}: {}", event.id, e);
                None
            }
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Profiles we have already looked up, keyed by hex pubkey. `None` entries
/// remember that nobody had a profile for that key.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: RwLock<HashMap<String, Option<ProfileMetadata>>>,
}

impl ProfileCache {
    pub fn new() -> ProfileCache {
        ProfileCache::default()
    }

    /// `None` on a miss, `Some(None)` if the key is known to have no profile
    pub fn get(&self, pubkey: &str) -> Option<Option<ProfileMetadata>> {
        self.profiles.read().get(pubkey).cloned()
    }

    pub fn insert(&self, pubkey: &str, metadata: Option<ProfileMetadata>) {
        let _ = self.profiles.write().insert(pubkey.to_owned(), metadata);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Fill in a creator's name and picture if we have their profile
    pub fn enrich(&self, creator: &mut Creator) {
        if let Some(Some(metadata)) = self.get(&creator.pubkey) {
            if let Some(name) = metadata.display_name() {
                creator.name = name.to_owned();
            }
            if metadata.picture.is_some() {
                creator.picture = metadata.picture.clone();
            }
        }
    }
}
