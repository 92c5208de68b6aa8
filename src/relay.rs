use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority given to relays that arrive without one
pub const DEFAULT_PRIORITY: i64 = 5;

/// A relay URL. Must be `ws://` or `wss://` with a host.
///
/// The string is kept as given (trimmed) so that equality matches what the
/// user typed and what the default tables carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn try_from_str(s: &str) -> Result<RelayUrl, Error> {
        let s = s.trim();
        let url = match url::Url::parse(s) {
            Ok(url) => url,
            Err(e) => return Err(ErrorKind::InvalidRelayUrl(format!("{s}: {e}")).into()),
        };
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ErrorKind::InvalidRelayUrl(format!("{s}: scheme must be ws or wss")).into());
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(ErrorKind::InvalidRelayUrl(format!("{s}: no host")).into()),
        }
        Ok(RelayUrl(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Only for the built-in tables, which are known to be valid
    fn builtin(s: &'static str) -> RelayUrl {
        RelayUrl(s.to_owned())
    }
}

impl TryFrom<String> for RelayUrl {
    type Error = Error;

    fn try_from(s: String) -> Result<RelayUrl, Error> {
        RelayUrl::try_from_str(&s)
    }
}

impl From<RelayUrl> for String {
    fn from(u: RelayUrl) -> String {
        u.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<u64>,
}

/// A relay the user reads from or writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRecord {
    pub url: RelayUrl,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub read: bool,

    pub write: bool,

    pub enabled: bool,

    /// 1 is the highest priority
    pub priority: i64,

    /// Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<i64>,

    #[serde(default)]
    pub connection_count: u64,

    #[serde(default)]
    pub error_count: u64,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<RelayFees>,
}

impl RelayRecord {
    /// A read/write enabled relay named after its url
    pub fn new(url: RelayUrl) -> RelayRecord {
        RelayRecord {
            name: url.as_str().to_owned(),
            url,
            description: None,
            read: true,
            write: true,
            enabled: true,
            priority: DEFAULT_PRIORITY,
            last_connected: None,
            connection_count: 0,
            error_count: 0,
            avg_response_time: None,
            region: None,
            operator: None,
            fees: None,
        }
    }

    /// Overwrite the fields present in the update
    pub fn apply(&mut self, update: &RelayUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
        if let Some(read) = update.read {
            self.read = read;
        }
        if let Some(write) = update.write {
            self.write = write;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(last_connected) = update.last_connected {
            self.last_connected = Some(last_connected);
        }
        if let Some(connection_count) = update.connection_count {
            self.connection_count = connection_count;
        }
        if let Some(error_count) = update.error_count {
            self.error_count = error_count;
        }
        if let Some(avg_response_time) = update.avg_response_time {
            self.avg_response_time = Some(avg_response_time);
        }
        if let Some(region) = &update.region {
            self.region = Some(region.clone());
        }
        if let Some(operator) = &update.operator {
            self.operator = Some(operator.clone());
        }
        if let Some(fees) = &update.fees {
            self.fees = Some(fees.clone());
        }
    }

    /// Score used to recommend relays. Lower is better.
    pub fn recommendation_score(&self) -> i64 {
        self.priority + self.error_count as i64 - self.connection_count as i64
    }
}

/// A partial relay record. Present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<RelayFees>,
}

impl RelayUpdate {
    pub fn enabled(enabled: bool) -> RelayUpdate {
        RelayUpdate {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// A per-user override, as stored under `relay-config-<suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayOverride {
    pub url: RelayUrl,

    /// The user removed this relay; it is dropped from the defaults
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,

    #[serde(flatten)]
    pub update: RelayUpdate,
}

impl RelayOverride {
    pub fn removal(url: RelayUrl) -> RelayOverride {
        RelayOverride {
            url,
            removed: true,
            update: RelayUpdate::default(),
        }
    }
}

impl From<&RelayRecord> for RelayOverride {
    fn from(r: &RelayRecord) -> RelayOverride {
        RelayOverride {
            url: r.url.clone(),
            removed: false,
            update: RelayUpdate {
                name: Some(r.name.clone()),
                description: r.description.clone(),
                read: Some(r.read),
                write: Some(r.write),
                enabled: Some(r.enabled),
                priority: Some(r.priority),
                last_connected: r.last_connected,
                connection_count: Some(r.connection_count),
                error_count: Some(r.error_count),
                avg_response_time: r.avg_response_time,
                region: r.region.clone(),
                operator: r.operator.clone(),
                fees: r.fees.clone(),
            },
        }
    }
}

/// Ephemeral connection state of a relay. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub url: RelayUrl,
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,

    /// Unix milliseconds
    pub last_attempt: Option<i64>,
}

impl ConnectionStatus {
    pub fn new(url: RelayUrl) -> ConnectionStatus {
        ConnectionStatus {
            url,
            connected: false,
            connecting: false,
            error: None,
            last_attempt: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some() && !self.connected
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        if let Some(connected) = update.connected {
            self.connected = connected;
        }
        if let Some(connecting) = update.connecting {
            self.connecting = connecting;
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }
        if let Some(last_attempt) = update.last_attempt {
            self.last_attempt = Some(last_attempt);
        }
    }
}

/// A partial connection status.
///
/// `error` is `None` to leave the error alone, `Some(None)` to clear it and
/// `Some(Some(_))` to set it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub connected: Option<bool>,
    pub connecting: Option<bool>,
    pub error: Option<Option<String>>,
    pub last_attempt: Option<i64>,
}

impl StatusUpdate {
    pub fn connecting() -> StatusUpdate {
        StatusUpdate {
            connecting: Some(true),
            ..Default::default()
        }
    }

    pub fn connected() -> StatusUpdate {
        StatusUpdate {
            connected: Some(true),
            connecting: Some(false),
            error: Some(None),
            last_attempt: None,
        }
    }

    pub fn failed(error: String, last_attempt: i64) -> StatusUpdate {
        StatusUpdate {
            connected: Some(false),
            connecting: Some(false),
            error: Some(Some(error)),
            last_attempt: Some(last_attempt),
        }
    }

    pub fn disconnected() -> StatusUpdate {
        StatusUpdate {
            connected: Some(false),
            connecting: Some(false),
            ..Default::default()
        }
    }

    pub fn sets_error(&self) -> bool {
        matches!(self.error, Some(Some(_)))
    }
}

/// How one relay handled one fetch or publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Success,
    Timeout,
    Error(String),
}

impl RelayOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RelayOutcome::Success)
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            RelayOutcome::Error(detail) => Some(detail),
            _ => None,
        }
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Success => write!(f, "success"),
            RelayOutcome::Timeout => write!(f, "timeout"),
            RelayOutcome::Error(_) => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total: usize,
    pub enabled: usize,
    pub connected: usize,
    pub connecting: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    ConnectionFailed,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timeout"),
            ProbeFailure::ConnectionFailed => write!(f, "connection failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub response_time_ms: Option<u64>,
    pub error: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn success(response_time_ms: u64) -> ProbeResult {
        ProbeResult {
            success: true,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn failure(error: ProbeFailure) -> ProbeResult {
        ProbeResult {
            success: false,
            response_time_ms: None,
            error: Some(error),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    url: &'static str,
    name: &str,
    description: &str,
    write: bool,
    enabled: bool,
    priority: i64,
    region: &str,
    operator: Option<&str>,
) -> RelayRecord {
    RelayRecord {
        url: RelayUrl::builtin(url),
        name: name.to_owned(),
        description: Some(description.to_owned()),
        read: true,
        write,
        enabled,
        priority,
        last_connected: None,
        connection_count: 0,
        error_count: 0,
        avg_response_time: None,
        region: Some(region.to_owned()),
        operator: operator.map(|s| s.to_owned()),
        fees: None,
    }
}

/// The built-in relay list
pub fn default_relays() -> Vec<RelayRecord> {
    vec![
        builtin(
            "wss://relay.damus.io",
            "Damus",
            "Popular iOS client relay",
            true,
            true,
            1,
            "Global",
            Some("Damus"),
        ),
        builtin(
            "wss://nos.lol",
            "nos.lol",
            "Reliable general purpose relay",
            true,
            true,
            1,
            "Global",
            None,
        ),
        builtin(
            "wss://relay.nostr.band",
            "Nostr Band",
            "Analytics and search relay",
            true,
            true,
            3,
            "Global",
            Some("Nostr Band"),
        ),
        builtin(
            "wss://offchain.pub",
            "Offchain",
            "Bitcoin focused relay",
            true,
            true,
            3,
            "Global",
            None,
        ),
        // read-only
        builtin(
            "wss://relay.current.fyi",
            "Current",
            "Music focused relay",
            false,
            true,
            4,
            "Global",
            Some("Current"),
        ),
        builtin(
            "wss://brb.io",
            "BRB",
            "Community relay",
            true,
            false,
            5,
            "Global",
            None,
        ),
        builtin(
            "wss://relay.nostr.info",
            "Nostr Info",
            "Information relay",
            true,
            false,
            5,
            "Global",
            None,
        ),
    ]
}

pub const REGIONS: [&str; 3] = ["north-america", "europe", "asia"];

/// Extra relays for a region, or `None` if the region is unknown
pub fn regional_relays(region: &str) -> Option<Vec<RelayRecord>> {
    match region {
        "north-america" => Some(vec![
            builtin(
                "wss://nostr.wine",
                "Nostr Wine",
                "North American relay",
                true,
                true,
                2,
                "North America",
                None,
            ),
            builtin(
                "wss://eden.nostr.land",
                "Eden",
                "Canadian relay",
                true,
                true,
                3,
                "North America",
                None,
            ),
        ]),
        "europe" => Some(vec![
            builtin(
                "wss://relay.orangepill.dev",
                "Orange Pill",
                "European relay",
                true,
                true,
                2,
                "Europe",
                None,
            ),
            builtin(
                "wss://relay.nostrich.de",
                "Nostrich",
                "German relay",
                true,
                true,
                3,
                "Europe",
                None,
            ),
        ]),
        "asia" => Some(vec![builtin(
            "wss://relay-jp.nostr.wirednet.jp",
            "WiredNet JP",
            "Japanese relay",
            true,
            true,
            2,
            "Asia",
            None,
        )]),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_relay_url_validation() {
        assert!(RelayUrl::try_from_str("wss://relay.damus.io").is_ok());
        assert!(RelayUrl::try_from_str("ws://localhost:7777").is_ok());
        assert_eq!(
            RelayUrl::try_from_str("  wss://nos.lol ").unwrap().as_str(),
            "wss://nos.lol"
        );
        for bad in ["https://relay.damus.io", "relay.damus.io", "wss://", ""] {
            let err = RelayUrl::try_from_str(bad).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::InvalidRelayUrl(_)), "{bad}");
        }
    }

    #[test]
    fn test_default_tables() {
        let defaults = default_relays();
        assert_eq!(defaults.len(), 7);
        assert_eq!(defaults.iter().filter(|r| !r.enabled).count(), 2);
        assert_eq!(defaults.iter().filter(|r| !r.write).count(), 1);
        for r in defaults.iter() {
            assert!(RelayUrl::try_from_str(r.url.as_str()).is_ok());
        }
        assert_eq!(regional_relays("north-america").unwrap().len(), 2);
        assert_eq!(regional_relays("europe").unwrap().len(), 2);
        assert_eq!(regional_relays("asia").unwrap().len(), 1);
        assert!(regional_relays("antarctica").is_none());
    }

    #[test]
    fn test_record_serde_is_camel_case() {
        let mut record = RelayRecord::new(RelayUrl::try_from_str("wss://x.example").unwrap());
        record.avg_response_time = Some(120);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["avgResponseTime"], 120);
        assert_eq!(json["connectionCount"], 0);
        assert!(json.get("lastConnected").is_none());

        let parsed: RelayRecord = serde_json::from_str(
            r#"{"url":"wss://x.example","name":"x","read":true,"write":false,"enabled":true,"priority":2}"#,
        )
        .unwrap();
        assert_eq!(parsed.error_count, 0);
        assert!(!parsed.write);

        assert!(serde_json::from_str::<RelayRecord>(
            r#"{"url":"http://x.example","name":"x","read":true,"write":false,"enabled":true,"priority":2}"#
        )
        .is_err());
    }

    #[test]
    fn test_status_apply() {
        let url = RelayUrl::try_from_str("wss://x.example").unwrap();
        let mut status = ConnectionStatus::new(url);
        status.apply(&StatusUpdate::failed("timeout".to_owned(), 5));
        assert!(status.failed());
        assert_eq!(status.last_attempt, Some(5));
        status.apply(&StatusUpdate::connecting());
        assert!(status.connecting);
        assert_eq!(status.error.as_deref(), Some("timeout"));
        status.apply(&StatusUpdate::connected());
        assert!(!status.failed());
        assert_eq!(status.error, None);
    }
}
