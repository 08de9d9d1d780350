//! Persisted entity structures: cache entries and shared dependency records.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{EventKind, ExpiryStrategy};
use crate::key::FlatKey;
use crate::Timestamp;

/// The (application, zone) pair an ingest call runs under.
///
/// Identity of entries and records uses the application only; the zone is
/// carried along as the zone a dependency will be requested from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub application_id: String,
    pub zone_id: String,
}

impl Scope {
    pub fn new(application_id: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            zone_id: zone_id.into(),
        }
    }
}

/// Identity of a cache entry: one held object per (type, key, application).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub object_type: String,
    pub flat_key: FlatKey,
    pub application_id: String,
}

/// Identity of a dependency record. Deliberately NOT scoped to a single
/// cache entry: every entry waiting on the same (type, key, application)
/// shares one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub object_type: String,
    pub flat_key: FlatKey,
    pub application_id: String,
}

/// A held object waiting for its dependencies to arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Row identifier, v7 so rows sort by creation time.
    pub entry_id: Uuid,
    pub object_type: String,
    pub flat_key: FlatKey,
    pub application_id: String,
    /// Zone the object was received from. Informational, not identity.
    pub zone_id: String,
    /// Agent that parked the object; housekeeping only touches its own.
    pub agent_id: String,
    /// Set for entries created from events, `None` for query responses.
    pub event: Option<EventKind>,
    /// Serialized payload, handed back verbatim on flush.
    pub payload: String,
    pub received_at: Timestamp,
    /// Number of still-unsatisfied dependency records this entry owns.
    pub remaining_dependencies: u32,
    pub expiry_at: Timestamp,
    /// Copied from the type graph at creation; refreshed from the live
    /// graph when the expiry job re-arms the entry.
    pub expiry_strategy: ExpiryStrategy,
    /// Membership in the shared dependency records.
    pub dependencies: Vec<RecordKey>,
}

impl CacheEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            object_type: self.object_type.clone(),
            flat_key: self.flat_key.clone(),
            application_id: self.application_id.clone(),
        }
    }

    pub fn is_event(&self) -> bool {
        self.event.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.remaining_dependencies == 0
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry_at <= now
    }
}

/// One outstanding dependency, shared by every entry that needs it.
///
/// Lives exactly as long as its longest-surviving parent entry: a record
/// with zero parents must never persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub record_id: Uuid,
    pub object_type: String,
    pub flat_key: FlatKey,
    pub application_id: String,
    /// Zone this dependency should be requested from.
    pub zone_id: String,
    /// Ordered key component values, kept so a request can be built without
    /// ever parsing the flat key back apart.
    pub key_values: Vec<String>,
    pub requested: bool,
    pub requested_at: Option<Timestamp>,
}

impl DependencyRecord {
    /// A freshly discovered, not-yet-requested dependency.
    pub fn new(
        object_type: impl Into<String>,
        flat_key: FlatKey,
        application_id: impl Into<String>,
        zone_id: impl Into<String>,
        key_values: Vec<String>,
    ) -> Self {
        Self {
            record_id: Uuid::now_v7(),
            object_type: object_type.into(),
            flat_key,
            application_id: application_id.into(),
            zone_id: zone_id.into(),
            key_values,
            requested: false,
            requested_at: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            object_type: self.object_type.clone(),
            flat_key: self.flat_key.clone(),
            application_id: self.application_id.clone(),
        }
    }

    /// Mark the record as requested now.
    pub fn mark_requested(&mut self) {
        self.requested = true;
        self.requested_at = Some(Utc::now());
    }

    /// Put the record back into the request queue.
    pub fn reset_requested(&mut self) {
        self.requested = false;
        self.requested_at = None;
    }
}
