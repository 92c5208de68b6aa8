use crate::error::{Error, ErrorKind};
use crate::event::is_hex_of_len;
use nostr_types::PublicKey;

/// Convert a hex public key into its `npub` form
pub fn npub_from_hex(hex: &str) -> Result<String, Error> {
    let pubkey = PublicKey::try_from_hex_string(hex, true)?;
    Ok(pubkey.as_bech32_string())
}

/// Convert an `npub` into its hex form
pub fn hex_from_npub(npub: &str) -> Result<String, Error> {
    let pubkey = PublicKey::try_from_bech32_string(npub, true)?;
    Ok(pubkey.as_hex_string())
}

/// Accept either form of an identity and produce the hex form that goes on
/// the wire in `p` tags.
pub fn identity_to_hex(identity: &str) -> Result<String, Error> {
    let identity = identity.trim();
    if identity.starts_with("npub1") {
        hex_from_npub(identity)
    } else if is_hex_of_len(identity, 64) {
        // validates the point
        let pubkey = PublicKey::try_from_hex_string(identity, true)?;
        Ok(pubkey.as_hex_string())
    } else {
        Err(ErrorKind::InvalidPublicKey(identity.to_owned()).into())
    }
}

/// Best-effort display form: valid hex keys become `npub`s, everything else
/// is passed through untouched.
pub fn normalize_identity(value: &str) -> String {
    if is_hex_of_len(value, 64) {
        if let Ok(npub) = npub_from_hex(value) {
            return npub;
        }
    }
    value.to_owned()
}
