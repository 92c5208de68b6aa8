use crate::error::Error;
use crate::storage::{get_json, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SETTINGS_KEY: &str = "settings";

/// Tunables for relay I/O and listings.
///
/// Stored as one JSON object under the `settings` key. Missing fields take
/// their defaults, so older files keep loading.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    // Relay health
    pub probe_timeout_ms: u64,
    pub connect_probe_timeout_ms: u64,
    pub recommended_relay_count: usize,

    // Relay I/O
    pub fetch_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub max_websocket_message_size_kb: usize,
    pub max_websocket_frame_size_kb: usize,

    // Listings
    pub pack_limit: usize,
    pub creator_pack_limit: usize,
    pub search_limit: usize,
    pub pack_label: String,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            probe_timeout_ms: 5000,
            connect_probe_timeout_ms: 3000,
            recommended_relay_count: 5,
            fetch_timeout_ms: 5000,
            lookup_timeout_ms: 5000,
            publish_timeout_ms: 5000,
            max_websocket_message_size_kb: 1024,
            max_websocket_frame_size_kb: 1024,
            pack_limit: 50,
            creator_pack_limit: 20,
            search_limit: 20,
            pack_label: "nostrguard".to_owned(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults on any problem
    pub fn load(store: &dyn KeyValueStore) -> Settings {
        match get_json(store, SETTINGS_KEY) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!("Using default settings: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), Error> {
        let json = serde_json::to_string(self)?;
        store.set(SETTINGS_KEY, &json)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_probe_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_settings_fail_open() {
        let store = MemoryStore::new();
        assert_eq!(Settings::load(&store), Settings::default());

        store.set(SETTINGS_KEY, "{ not json").unwrap();
        assert_eq!(Settings::load(&store), Settings::default());

        store.set(SETTINGS_KEY, r#"{"pack_limit":7}"#).unwrap();
        let settings = Settings::load(&store);
        assert_eq!(settings.pack_limit, 7);
        assert_eq!(settings.fetch_timeout_ms, 5000);
    }

    #[test]
    fn test_settings_save() {
        let store = MemoryStore::new();
        let settings = Settings {
            search_limit: 3,
            ..Default::default()
        };
        settings.save(&store).unwrap();
        assert_eq!(Settings::load(&store), settings);
        assert_eq!(settings.publish_timeout(), Duration::from_secs(5));
    }
}
