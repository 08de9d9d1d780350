//! Binary key layout for the LMDB backend.
//!
//! Entries and records live in separate databases, keyed by their identity
//! triple `(object_type, application_id, flat_key)`. The three components
//! are joined with a `0xFF` separator byte, which cannot occur inside UTF-8
//! text, so the encoding is injective without escaping. Keys sort by type
//! first, which keeps one type's rows adjacent for scans.

use tether_core::{EntryKey, RecordKey};

/// Separator byte between key components.
const SEPARATOR: u8 = 0xFF;

/// Encode an identity triple into a store key.
pub fn encode(object_type: &str, application_id: &str, flat_key: &str) -> Vec<u8> {
    let mut bytes =
        Vec::with_capacity(object_type.len() + application_id.len() + flat_key.len() + 2);
    bytes.extend_from_slice(object_type.as_bytes());
    bytes.push(SEPARATOR);
    bytes.extend_from_slice(application_id.as_bytes());
    bytes.push(SEPARATOR);
    bytes.extend_from_slice(flat_key.as_bytes());
    bytes
}

pub fn entry_key_bytes(key: &EntryKey) -> Vec<u8> {
    encode(&key.object_type, &key.application_id, key.flat_key.as_str())
}

pub fn record_key_bytes(key: &RecordKey) -> Vec<u8> {
    encode(&key.object_type, &key.application_id, key.flat_key.as_str())
}
