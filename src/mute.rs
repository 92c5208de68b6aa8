use crate::error::Error;
use crate::event::{EventKind, PreEvent, RawEvent};
use crate::keys::identity_to_hex;
use std::collections::HashSet;

/// A user's mute list (kind 10000). Publishing one replaces the previous one
/// entirely, so edits always start from the latest copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteList {
    pub owner: String,
    /// hex pubkeys, first-seen order, no duplicates
    pub members: Vec<String>,
}

impl MuteList {
    pub fn new(owner: &str) -> MuteList {
        MuteList {
            owner: owner.to_owned(),
            members: Vec::new(),
        }
    }

    pub fn from_event(event: &RawEvent) -> MuteList {
        let mut seen: HashSet<String> = HashSet::new();
        let members = event
            .tag_values("p")
            .filter(|p| !p.is_empty())
            .map(|p| p.to_ascii_lowercase())
            .filter(|p| seen.insert(p.clone()))
            .collect();
        MuteList {
            owner: event.pubkey.clone(),
            members,
        }
    }

    pub fn to_pre_event(&self) -> PreEvent {
        let tags = self
            .members
            .iter()
            .map(|m| vec!["p".to_owned(), m.clone()])
            .collect();
        PreEvent::new(EventKind::MuteList, tags, "".to_owned())
    }

    /// Add identities (hex or `npub`) that are not already muted. Returns how
    /// many were added.
    pub fn merge<S: AsRef<str>>(&mut self, identities: &[S]) -> Result<usize, Error> {
        let hexes = identities
            .iter()
            .map(|i| identity_to_hex(i.as_ref()))
            .collect::<Result<Vec<String>, Error>>()?;

        let mut added = 0;
        for hex in hexes {
            if !self.members.contains(&hex) {
                self.members.push(hex);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn contains(&self, identity: &str) -> bool {
        match identity_to_hex(identity) {
            Ok(hex) => self.members.contains(&hex),
            Err(_) => false,
        }
    }

    pub fn contains_all<S: AsRef<str>>(&self, identities: &[S]) -> bool {
        identities.iter().all(|i| self.contains(i.as_ref()))
    }

    pub fn count_contained<S: AsRef<str>>(&self, identities: &[S]) -> usize {
        identities.iter().filter(|i| self.contains(i.as_ref())).count()
    }
}
