//! Event model and validation.
//!
//! Events arrive from relays as JSON objects and are treated as read-only
//! once decoded. This module provides:
//! - Canonical id hashing (SHA-256 of `[0, pubkey, created_at, kind, tags, content]`)
//! - Structural validation (hex field shapes, tag shapes, id consistency)
//! - Optional Schnorr signature verification over secp256k1

use crate::error::{Error, Result};
use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey, schnorr::Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded event id or public key.
pub const HEX_ID_LEN: usize = 64;

/// Length of a hex-encoded Schnorr signature.
pub const HEX_SIG_LEN: usize = 128;

/// A signed protocol event.
///
/// ```json
/// {
///   "id": "4ff2...",
///   "pubkey": "35e4...",
///   "created_at": 1700000000,
///   "kind": 1,
///   "tags": [["p", "c40d..."], ["t", "news"]],
///   "content": "hello",
///   "sig": "95da..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp of creation, as claimed by the author.
    pub created_at: u64,
    /// Kind number, e.g. `1` for a text note.
    pub kind: u32,
    /// Ordered tags; the first element of each tag names it.
    pub tags: Vec<Vec<String>>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event id.
    pub sig: String,
}

impl Event {
    /// Decode an event from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decode an event from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the event to compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Size in bytes of the compact JSON serialization.
    pub fn serialized_len(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }

    /// Recompute the id from the event's fields, as lowercase hex.
    pub fn compute_id(&self) -> Result<String> {
        Ok(hex::encode(event_hash(self)?))
    }

    /// Values at position 1 of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().is_some_and(|t| t == name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    /// True if the event tags `pubkey` with a `p` tag.
    pub fn mentions(&self, pubkey: &str) -> bool {
        self.tag_values("p").any(|p| p.eq_ignore_ascii_case(pubkey))
    }

    /// True if the event references another event with an `e` tag.
    pub fn has_event_reference(&self) -> bool {
        self.tag_values("e").next().is_some()
    }

    /// Fill in `pubkey`, `id` and `sig` by signing with a secret key.
    ///
    /// Used for fixtures and tooling; the pipeline never signs.
    pub fn sign(&mut self, secret_key: &[u8; 32]) -> Result<()> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, secret_key)
            .map_err(|e| Error::InvalidSignature(format!("bad secret key: {e}")))?;
        self.pubkey = hex::encode(keypair.x_only_public_key().0.serialize());

        let hash = event_hash(self)?;
        self.id = hex::encode(hash);

        let msg = Message::from_digest_slice(&hash)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
        self.sig = hex::encode(sig.as_ref());
        Ok(())
    }
}

/// Compute the canonical event hash from its fields.
pub fn event_hash(event: &Event) -> Result<[u8; 32]> {
    let canonical = serde_json::json!([
        0,
        event.pubkey,
        event.created_at,
        event.kind,
        event.tags,
        event.content
    ]);
    let data = serde_json::to_vec(&canonical)?;
    Ok(Sha256::digest(&data).into())
}

/// Validates the structure of an event and the consistency of its id.
///
/// Checks, in order:
/// - `id` and `pubkey` are 64 lowercase hex characters
/// - `sig` is 128 lowercase hex characters
/// - every tag has at least one element
/// - `id` equals the hash of the event's fields
///
/// The signature itself is not checked; see [`verify_signature`].
pub fn validate_event(event: &Event) -> Result<()> {
    check_hex("id", &event.id, HEX_ID_LEN)?;
    check_hex("pubkey", &event.pubkey, HEX_ID_LEN)?;
    check_hex("sig", &event.sig, HEX_SIG_LEN)?;

    if let Some(pos) = event.tags.iter().position(Vec::is_empty) {
        return Err(Error::InvalidField {
            field: "tags",
            reason: format!("tag {pos} is empty"),
        });
    }

    let computed = event.compute_id()?;
    if computed != event.id {
        return Err(Error::InvalidEventId {
            computed,
            expected: event.id.clone(),
        });
    }

    Ok(())
}

/// Verifies the Schnorr signature of an event over its id.
///
/// Assumes [`validate_event`] already passed.
pub fn verify_signature(event: &Event) -> Result<()> {
    let id = decode_hex(&event.id)?;
    let sig_bytes = decode_hex(&event.sig)?;
    let pk_bytes = decode_hex(&event.pubkey)?;

    let sig =
        Signature::from_slice(&sig_bytes).map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let pubkey = XOnlyPublicKey::from_slice(&pk_bytes)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let msg = Message::from_digest_slice(&id).map_err(|e| Error::InvalidSignature(e.to_string()))?;

    Secp256k1::verification_only()
        .verify_schnorr(&sig, &msg, &pubkey)
        .map_err(|e| Error::InvalidSignature(e.to_string()))
}

fn check_hex(field: &'static str, value: &str, len: usize) -> Result<()> {
    if value.len() != len {
        return Err(Error::InvalidField {
            field,
            reason: format!("expected {len} hex characters, got {}", value.len()),
        });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(Error::InvalidField {
            field,
            reason: "not lowercase hex".to_string(),
        });
    }
    Ok(())
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| Error::HexDecode(e.to_string()))
}
