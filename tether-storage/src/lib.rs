//! Tether Storage - Store Trait and Backends
//!
//! Defines the persistence abstraction for cache entries and their shared
//! dependency records, plus two backends: an in-memory store for tests and
//! single-process deployments, and an LMDB store for durable, multi-process
//! use.
//!
//! Every trait method is one transactional unit. Compound operations such as
//! [`CacheStore::remove_satisfied`] perform their whole read-modify-write
//! cascade inside a single unit, so reference-count updates and
//! delete-if-last-parent are atomic per record even with several agents
//! sharing the store. No backend may leave a dependency record with zero
//! parent entries behind.

use async_trait::async_trait;

use tether_core::{
    CacheEntry, DependencyRecord, EntryKey, ExpiryStrategy, RecordKey, TetherResult, Timestamp,
};

pub mod lmdb;
pub mod memory;
mod store_key;

pub use lmdb::{LmdbStore, LmdbStoreError};
pub use memory::MemoryStore;

/// Row counts, for tests and operational introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub entries: u64,
    pub records: u64,
}

/// Persistence contract for the dependent-object cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    // === Entry Operations ===

    /// Get an entry by identity.
    async fn entry_get(&self, key: &EntryKey) -> TetherResult<Option<CacheEntry>>;

    /// Insert a new entry together with its dependency record set.
    ///
    /// Records that already exist (tracked for another entry) are left
    /// untouched and shared; only unseen records are created. Inserting an
    /// entry whose identity already exists fails with
    /// [`StoreError::AlreadyExists`](tether_core::StoreError::AlreadyExists).
    async fn entry_insert(
        &self,
        entry: &CacheEntry,
        records: &[DependencyRecord],
    ) -> TetherResult<()>;

    /// Delete an entry, cascading to any of its records left without a
    /// parent. Returns false when no such entry exists.
    async fn entry_delete(&self, key: &EntryKey) -> TetherResult<bool>;

    /// Re-arm an entry for another request round: set its new expiry
    /// deadline and strategy and reset every owned record to unrequested.
    /// Returns the number of records reset.
    async fn entry_reschedule(
        &self,
        key: &EntryKey,
        expiry_at: Timestamp,
        strategy: ExpiryStrategy,
    ) -> TetherResult<u32>;

    /// Entries past their expiry deadline that still have unresolved
    /// dependencies, for one application and agent.
    async fn entries_expired(
        &self,
        now: Timestamp,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>>;

    /// Entries of one type with no remaining dependencies, ready for normal
    /// processing, for one application and agent.
    async fn entries_resolved(
        &self,
        object_type: &str,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>>;

    // === Dependency Record Operations ===

    /// Get a dependency record by identity.
    async fn record_get(&self, key: &RecordKey) -> TetherResult<Option<DependencyRecord>>;

    /// The dependency records an entry currently owns.
    async fn records_for_entry(&self, key: &EntryKey) -> TetherResult<Vec<DependencyRecord>>;

    /// Records of one type not yet requested from their zone.
    async fn records_unrequested(
        &self,
        object_type: &str,
        application_id: &str,
    ) -> TetherResult<Vec<DependencyRecord>>;

    /// Mark a record as requested at the given time.
    async fn record_mark_requested(&self, key: &RecordKey, at: Timestamp) -> TetherResult<()>;

    /// A real object matching this record arrived: decrement every parent
    /// entry's remaining count, drop the record from their dependency sets,
    /// and delete the record itself. Returns the number of parent entries
    /// updated; zero means the dependency was never tracked (not an error).
    async fn remove_satisfied(&self, key: &RecordKey) -> TetherResult<u32>;

    // === Introspection ===

    /// Current row counts.
    async fn counts(&self) -> TetherResult<StoreCounts>;
}
