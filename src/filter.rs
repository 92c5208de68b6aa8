use crate::event::{EventKind, RawEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A NIP-01 subscription filter.
///
/// Tag conditions are kept under their wire names (`#d`, `#L`, ...) and are
/// flattened into the JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u32>,

    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    pub fn id(mut self, id: &str) -> Filter {
        self.ids.push(id.to_owned());
        self
    }

    pub fn author(mut self, pubkey: &str) -> Filter {
        self.authors.push(pubkey.to_owned());
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Filter {
        self.kinds.push(kind.into());
        self
    }

    /// Require a single-letter tag. `letter` is given without the `#`.
    pub fn tag(mut self, letter: char, value: &str) -> Filter {
        self.tags
            .entry(format!("#{letter}"))
            .or_default()
            .push(value.to_owned());
        self
    }

    pub fn since(mut self, since: i64) -> Filter {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: i64) -> Filter {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Filter {
        self.limit = Some(limit);
        self
    }

    /// Whether the event satisfies this filter. `limit` is a relay-side
    /// concern and is not considered.
    pub fn matches(&self, event: &RawEvent) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|i| i.eq_ignore_ascii_case(&event.id)) {
            return false;
        }
        if !self.authors.is_empty()
            && !self
                .authors
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&event.pubkey))
        {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        for (key, values) in self.tags.iter() {
            let name = match key.strip_prefix('#') {
                Some(n) => n,
                None => continue,
            };
            if values.is_empty() {
                continue;
            }
            if !event
                .tag_values(name)
                .any(|v| values.iter().any(|want| want == v))
            {
                return false;
            }
        }
        true
    }
}
