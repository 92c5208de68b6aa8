use crate::error::{Error, ErrorKind};
use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// The event kinds this crate produces or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Metadata,
    EventDeletion,
    MuteList,
    CategorizedPeopleList,
    Other(u32),
}

impl From<u32> for EventKind {
    fn from(u: u32) -> EventKind {
        match u {
            0 => EventKind::Metadata,
            5 => EventKind::EventDeletion,
            10000 => EventKind::MuteList,
            30001 => EventKind::CategorizedPeopleList,
            x => EventKind::Other(x),
        }
    }
}

impl From<EventKind> for u32 {
    fn from(e: EventKind) -> u32 {
        match e {
            EventKind::Metadata => 0,
            EventKind::EventDeletion => 5,
            EventKind::MuteList => 10000,
            EventKind::CategorizedPeopleList => 30001,
            EventKind::Other(x) => x,
        }
    }
}

/// A signed event, exactly as it travels over the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// An event that has not been signed yet. The signer supplies the pubkey,
/// id and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreEvent {
    pub created_at: i64,
    pub kind: EventKind,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl PreEvent {
    pub fn new(kind: EventKind, tags: Vec<Vec<String>>, content: String) -> PreEvent {
        PreEvent {
            created_at: unixtime_now(),
            kind,
            tags,
            content,
        }
    }
}

impl RawEvent {
    pub fn event_kind(&self) -> EventKind {
        self.kind.into()
    }

    /// Compute the NIP-01 event id for the given fields
    pub fn compute_id(
        pubkey: &str,
        created_at: i64,
        kind: u32,
        tags: &[Vec<String>],
        content: &str,
    ) -> Result<String, Error> {
        let serialized =
            serde_json::to_string(&serde_json::json!([0, pubkey, created_at, kind, tags, content]))?;
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Whether the `id` field matches the content of the event
    pub fn id_matches(&self) -> bool {
        match RawEvent::compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ) {
            Ok(id) => id.eq_ignore_ascii_case(&self.id),
            Err(_) => false,
        }
    }

    /// Check the shape of the wire fields. This does not verify the signature.
    pub fn check_shape(&self) -> Result<(), Error> {
        if !is_hex_of_len(&self.id, 64) {
            return Err(ErrorKind::MalformedEvent(format!("bad id {:?}", self.id)).into());
        }
        if !is_hex_of_len(&self.pubkey, 64) {
            return Err(
                ErrorKind::MalformedEvent(format!("bad pubkey in event {}", self.id)).into(),
            );
        }
        if !is_hex_of_len(&self.sig, 128) {
            return Err(ErrorKind::MalformedEvent(format!("bad sig in event {}", self.id)).into());
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Err(ErrorKind::MalformedEvent(format!("empty tag in event {}", self.id)).into());
        }
        Ok(())
    }

    /// `check_shape`, plus proof that the id and signature are genuine
    pub fn verify(&self) -> Result<(), Error> {
        self.check_shape()?;
        if !self.id_matches() {
            return Err(
                ErrorKind::MalformedEvent(format!("id mismatch in event {}", self.id)).into(),
            );
        }
        let malformed = |what: &str| -> Error {
            ErrorKind::MalformedEvent(format!("{} in event {}", what, self.id)).into()
        };
        let pubkey = XOnlyPublicKey::from_str(&self.pubkey).map_err(|_| malformed("bad pubkey"))?;
        let sig = Signature::from_str(&self.sig).map_err(|_| malformed("bad sig"))?;
        let mut digest = [0u8; 32];
        hex::decode_to_slice(&self.id, &mut digest)?;
        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(&sig, &Message::from_digest(digest), &pubkey)
            .map_err(|_| malformed("invalid signature"))
    }

    /// The first value of the first tag with this name
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(|s| s.as_str()) == Some(name))
            .and_then(|t| t.get(1))
            .map(|s| s.as_str())
    }

    /// The first values of every tag with this name
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(|s| s.as_str()) == Some(name))
            .filter_map(|t| t.get(1))
            .map(|s| s.as_str())
    }

    /// Newer events win. Equal timestamps are broken by the lexically smaller id
    /// so every client resolves the same winner.
    pub fn supersedes(&self, other: &RawEvent) -> bool {
        match self.created_at.cmp(&other.created_at) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.id < other.id,
        }
    }
}

pub fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Current time in unix seconds
pub fn unixtime_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Current time in unix milliseconds
pub fn unixtime_now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
