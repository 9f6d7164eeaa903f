//! Core types, validation, and shared utilities for the herald event router.
//!
//! This crate provides:
//! - The event model with canonical id hashing and structural validation
//! - Optional Schnorr signature verification via secp256k1
//! - Relay message parsing (EVENT / EOSE / NOTICE / OK / unknown)
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
mod message;
pub mod metrics;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Serialized events larger than this are delivered by reference
/// (id plus relay hints) instead of inline.
pub const MAX_INLINE_EVENT_BYTES: usize = 500 * 1024;

pub use error::{Error, Result};
pub use event::{Event, HEX_ID_LEN, HEX_SIG_LEN, event_hash, validate_event, verify_signature};
pub use message::RelayMessage;
