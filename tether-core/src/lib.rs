//! Tether Core - Data Types
//!
//! Data types and load-time logic for the dependent-object cache: the type
//! graph, key flattening, persisted entities, settings and the error
//! taxonomy. No I/O lives here; the store backends and the cache engine
//! build on top of this crate.

use chrono::{DateTime, Utc};

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod field;
pub mod key;
pub mod typegraph;

pub use config::{CacheSettings, JobSchedule};
pub use entities::{CacheEntry, DependencyRecord, EntryKey, RecordKey, Scope};
pub use enums::{EventKind, ExpiryStrategy};
pub use error::{ConfigError, StoreError, TetherError, TetherResult, ValidationError};
pub use field::{FieldReader, JsonReader};
pub use key::{flatten_key, FlatKey};
pub use typegraph::{DependencyEdge, IndicatorCandidate, KeyField, ObjectType, TypeGraph};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
