#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

//! Relay aggregation and event reconciliation for scammer packs.
//!
//! A scammer pack is a kind 30001 list of accounts that one user recommends
//! muting. `PackClient` finds packs across a configurable set of relays,
//! publishes new versions of them, and merges them into the user's kind 10000
//! mute list. `RelayManager` keeps the relay set and its health.

pub mod client;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod filter;
pub mod keys;
pub mod manager;
pub mod message;
pub mod metadata;
pub mod mute;
pub mod pack;
pub mod probe;
pub mod publisher;
pub mod relay;
pub mod relay_config;
pub mod settings;
pub mod signer;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientStatus, PackClient};
pub use error::{Error, ErrorKind};
pub use manager::RelayManager;
pub use pack::{DomainPack, PackDraft};
pub use relay::{RelayRecord, RelayUrl};

pub static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
