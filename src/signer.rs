use crate::error::{Error, ErrorKind};
use crate::event::{PreEvent, RawEvent};
use async_trait::async_trait;
use secp256k1::{Keypair, Message, Secp256k1};
use zeroize::Zeroizing;

/// Something that can sign events on behalf of the user.
///
/// Browser extensions and remote signers live behind this trait; the user may
/// refuse to sign (`SigningRejected`) or there may be nothing to sign with
/// (`SigningUnavailable`). Both are propagated to the caller.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key(&self) -> Result<String, Error>;

    async fn sign_event(&self, pre_event: PreEvent) -> Result<RawEvent, Error>;
}

/// Signs with private key material held in memory
pub struct KeySigner {
    keypair: Keypair,
    public_key: String,
}

impl KeySigner {
    /// Build from a 64 character hex private key
    pub fn from_hex(private_key_hex: &str) -> Result<KeySigner, Error> {
        if private_key_hex.len() != 64 {
            return Err(ErrorKind::KeyInvalid.into());
        }
        let bytes = Zeroizing::new(hex::decode(private_key_hex)?);
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &bytes)?;
        let (xonly, _parity) = keypair.x_only_public_key();
        Ok(KeySigner {
            keypair,
            public_key: xonly.to_string(),
        })
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key
    }

    pub fn sign_now(&self, pre_event: PreEvent) -> Result<RawEvent, Error> {
        let kind: u32 = pre_event.kind.into();
        let id = RawEvent::compute_id(
            &self.public_key,
            pre_event.created_at,
            kind,
            &pre_event.tags,
            &pre_event.content,
        )?;

        let mut digest = [0u8; 32];
        hex::decode_to_slice(&id, &mut digest)?;
        let message = Message::from_digest(digest);
        let secp = Secp256k1::new();
        let sig = secp.sign_schnorr_no_aux_rand(&message, &self.keypair);

        Ok(RawEvent {
            id,
            pubkey: self.public_key.clone(),
            created_at: pre_event.created_at,
            kind,
            tags: pre_event.tags,
            content: pre_event.content,
            sig: sig.to_string(),
        })
    }
}

#[async_trait]
impl Signer for KeySigner {
    async fn public_key(&self) -> Result<String, Error> {
        Ok(self.public_key.clone())
    }

    async fn sign_event(&self, pre_event: PreEvent) -> Result<RawEvent, Error> {
        self.sign_now(pre_event)
    }
}

/// Stands in when the user has not provided any way to sign
pub struct NoSigner;

#[async_trait]
impl Signer for NoSigner {
    async fn public_key(&self) -> Result<String, Error> {
        Err(ErrorKind::SigningUnavailable.into())
    }

    async fn sign_event(&self, _pre_event: PreEvent) -> Result<RawEvent, Error> {
        Err(ErrorKind::SigningUnavailable.into())
    }
}
