use crate::error::Error;
use crate::event::unixtime_now_ms;
use crate::relay::{default_relays, regional_relays, RelayOverride, RelayRecord};
use crate::storage::{get_json, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CONFIG_KEY: &str = "relay-config";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedConfig {
    relays: Vec<RelayRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_pubkey: Option<String>,

    #[serde(default)]
    last_updated: i64,
}

/// What `RelayConfigStore::load` found
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub relays: Vec<RelayRecord>,
    pub user_pubkey: Option<String>,
}

/// Persists relay records. Never fails: unreadable config means defaults,
/// and write failures are logged.
#[derive(Clone)]
pub struct RelayConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl RelayConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> RelayConfigStore {
        RelayConfigStore { store }
    }

    /// The key holding a user's overrides
    pub fn user_key(pubkey: &str) -> String {
        let chars: Vec<char> = pubkey.chars().collect();
        let start = chars.len().saturating_sub(8);
        let suffix: String = chars[start..].iter().collect();
        format!("{CONFIG_KEY}-{suffix}")
    }

    pub fn defaults(&self) -> Vec<RelayRecord> {
        default_relays()
    }

    pub fn regional(&self, region: &str) -> Option<Vec<RelayRecord>> {
        regional_relays(region)
    }

    pub fn load(&self) -> LoadedConfig {
        match get_json::<PersistedConfig>(&*self.store, CONFIG_KEY) {
            Ok(Some(config)) => LoadedConfig {
                relays: config.relays,
                user_pubkey: config.user_pubkey,
            },
            Ok(None) => {
                tracing::debug!("No relay configuration stored, using defaults");
                LoadedConfig {
                    relays: default_relays(),
                    user_pubkey: None,
                }
            }
            Err(e) => {
                tracing::warn!("Using default relays: {}", e);
                LoadedConfig {
                    relays: default_relays(),
                    user_pubkey: None,
                }
            }
        }
    }

    pub fn save(&self, relays: &[RelayRecord], user_pubkey: Option<&str>) {
        let config = PersistedConfig {
            relays: relays.to_vec(),
            user_pubkey: user_pubkey.map(|s| s.to_owned()),
            last_updated: unixtime_now_ms(),
        };
        if let Err(e) = self.write(CONFIG_KEY, &config) {
            tracing::error!("Could not save relay configuration: {}", e);
        }
    }

    /// Defaults merged with the user's overrides, sorted by priority
    pub fn load_for_user(&self, pubkey: &str) -> Vec<RelayRecord> {
        let key = Self::user_key(pubkey);
        let overrides: Vec<RelayOverride> = match get_json(&*self.store, &key) {
            Ok(Some(o)) => o,
            Ok(None) => return default_relays(),
            Err(e) => {
                tracing::warn!("Ignoring relay overrides: {}", e);
                return default_relays();
            }
        };

        merge_overrides(default_relays(), overrides)
    }

    pub fn save_for_user(&self, pubkey: &str, relays: &[RelayRecord]) {
        let key = Self::user_key(pubkey);
        let mut overrides: Vec<RelayOverride> = relays.iter().map(RelayOverride::from).collect();
        overrides.extend(
            default_relays()
                .into_iter()
                .filter(|d| !relays.iter().any(|r| r.url == d.url))
                .map(|d| RelayOverride::removal(d.url)),
        );
        if let Err(e) = self.write(&key, &overrides) {
            tracing::error!("Could not save relay overrides under {}: {}", key, e);
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json)
    }
}

fn merge_overrides(mut merged: Vec<RelayRecord>, overrides: Vec<RelayOverride>) -> Vec<RelayRecord> {
    for o in overrides {
        if o.removed {
            merged.retain(|r| r.url != o.url);
            continue;
        }
        match merged.iter_mut().find(|r| r.url == o.url) {
            Some(existing) => existing.apply(&o.update),
            None => {
                let mut record = RelayRecord::new(o.url);
                record.apply(&o.update);
                merged.push(record);
            }
        }
    }
    // stable, so equal priorities keep merge order
    merged.sort_by_key(|r| r.priority);
    merged
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::relay::{RelayUpdate, RelayUrl};
    use crate::storage::MemoryStore;

    fn config_store() -> (Arc<MemoryStore>, RelayConfigStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = RelayConfigStore::new(memory.clone());
        (memory, store)
    }

    #[test]
    fn test_load_missing_or_corrupt_gives_defaults() {
        let (memory, store) = config_store();
        assert_eq!(store.load().relays, default_relays());

        memory.set(CONFIG_KEY, "[[[").unwrap();
        let loaded = store.load();
        assert_eq!(loaded.relays, default_relays());
        assert_eq!(loaded.user_pubkey, None);
    }

    #[test]
    fn test_save_then_load() {
        let (memory, store) = config_store();
        let mut relays = default_relays();
        relays.truncate(2);
        relays[0].error_count = 3;
        store.save(&relays, Some("abcdef0123456789"));

        let loaded = store.load();
        assert_eq!(loaded.relays, relays);
        assert_eq!(loaded.user_pubkey.as_deref(), Some("abcdef0123456789"));

        let raw: serde_json::Value =
            serde_json::from_str(&memory.get(CONFIG_KEY).unwrap().unwrap()).unwrap();
        assert!(raw["lastUpdated"].as_i64().unwrap() > 0);
        assert_eq!(raw["userPubkey"], "abcdef0123456789");
    }

    #[test]
    fn test_user_key_suffix() {
        assert_eq!(
            RelayConfigStore::user_key("0123456789abcdef"),
            "relay-config-89abcdef"
        );
        assert_eq!(RelayConfigStore::user_key("abc"), "relay-config-abc");
    }

    #[test]
    fn test_load_for_user_merges_and_sorts() {
        let (memory, store) = config_store();
        let pubkey = "f".repeat(64);
        memory
            .set(
                &RelayConfigStore::user_key(&pubkey),
                r#"[
                    {"url":"wss://brb.io","enabled":true,"priority":1},
                    {"url":"wss://mine.example","priority":2},
                    {"url":"wss://relay.current.fyi","name":"Renamed"}
                ]"#,
            )
            .unwrap();

        let relays = store.load_for_user(&pubkey);
        assert_eq!(relays.len(), 8);

        let priorities: Vec<i64> = relays.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);

        // brb.io moved up, after the defaults that already had priority 1
        assert_eq!(relays[2].url.as_str(), "wss://brb.io");
        assert!(relays[2].enabled);
        assert_eq!(relays[2].name, "BRB");

        let mine = relays
            .iter()
            .find(|r| r.url.as_str() == "wss://mine.example")
            .unwrap();
        assert_eq!(mine.name, "wss://mine.example");
        assert!(mine.read && mine.write && mine.enabled);

        let current = relays
            .iter()
            .find(|r| r.url.as_str() == "wss://relay.current.fyi")
            .unwrap();
        assert_eq!(current.name, "Renamed");
        assert!(!current.write);
    }

    #[test]
    fn test_load_for_user_corrupt_gives_defaults() {
        let (memory, store) = config_store();
        let pubkey = "e".repeat(64);
        memory
            .set(&RelayConfigStore::user_key(&pubkey), "{\"nope\":1}")
            .unwrap();
        assert_eq!(store.load_for_user(&pubkey), default_relays());
        assert_eq!(store.load_for_user(&"d".repeat(64)), default_relays());
    }

    #[test]
    fn test_save_for_user_keeps_removals() {
        let (memory, store) = config_store();
        let pubkey = "b".repeat(64);
        let relays: Vec<RelayRecord> = default_relays().into_iter().skip(1).collect();
        let dropped = default_relays()[0].url.clone();
        store.save_for_user(&pubkey, &relays);

        let json = memory
            .get(&RelayConfigStore::user_key(&pubkey))
            .unwrap()
            .unwrap();
        assert!(json.contains("\"removed\":true"));

        let loaded = store.load_for_user(&pubkey);
        assert_eq!(loaded.len(), relays.len());
        assert!(loaded.iter().all(|r| r.url != dropped));
    }

    #[test]
    fn test_save_for_user_round_trip() {
        let (_memory, store) = config_store();
        let pubkey = "c".repeat(64);
        let mut relays = default_relays();
        relays[0].apply(&RelayUpdate::enabled(false));
        relays.push(RelayRecord::new(
            RelayUrl::try_from_str("wss://extra.example").unwrap(),
        ));
        store.save_for_user(&pubkey, &relays);

        let loaded = store.load_for_user(&pubkey);
        assert_eq!(loaded.len(), 8);
        assert!(!loaded[0].enabled);
        assert!(loaded
            .iter()
            .any(|r| r.url.as_str() == "wss://extra.example"));
    }
}
