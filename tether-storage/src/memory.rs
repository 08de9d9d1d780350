//! In-memory store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use tether_core::{
    CacheEntry, DependencyRecord, EntryKey, ExpiryStrategy, RecordKey, StoreError, TetherError,
    TetherResult, Timestamp,
};

use crate::{CacheStore, StoreCounts};

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<EntryKey, CacheEntry>,
    records: HashMap<RecordKey, DependencyRecord>,
}

/// In-memory [`CacheStore`] over a single read-write lock.
///
/// Each operation holds the lock for its whole read-modify-write, which
/// gives the same per-operation atomicity the durable backends provide.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.clear();
            inner.records.clear();
        }
    }

    fn read(&self) -> TetherResult<std::sync::RwLockReadGuard<'_, MemoryInner>> {
        self.inner
            .read()
            .map_err(|_| TetherError::Store(StoreError::LockPoisoned))
    }

    fn write(&self) -> TetherResult<std::sync::RwLockWriteGuard<'_, MemoryInner>> {
        self.inner
            .write()
            .map_err(|_| TetherError::Store(StoreError::LockPoisoned))
    }
}

/// Remove records no surviving entry references any more.
fn drop_orphaned_records(inner: &mut MemoryInner, candidates: &[RecordKey]) {
    for key in candidates {
        let still_referenced = inner
            .entries
            .values()
            .any(|entry| entry.dependencies.contains(key));
        if !still_referenced {
            inner.records.remove(key);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn entry_get(&self, key: &EntryKey) -> TetherResult<Option<CacheEntry>> {
        let inner = self.read()?;
        Ok(inner.entries.get(key).cloned())
    }

    async fn entry_insert(
        &self,
        entry: &CacheEntry,
        records: &[DependencyRecord],
    ) -> TetherResult<()> {
        let mut inner = self.write()?;
        let key = entry.key();
        if inner.entries.contains_key(&key) {
            return Err(TetherError::Store(StoreError::AlreadyExists {
                object_type: key.object_type,
                flat_key: key.flat_key.into_string(),
            }));
        }
        for record in records {
            // A record tracked for another entry stays as it is; its
            // requested flag must survive being shared.
            inner
                .records
                .entry(record.key())
                .or_insert_with(|| record.clone());
        }
        inner.entries.insert(key, entry.clone());
        Ok(())
    }

    async fn entry_delete(&self, key: &EntryKey) -> TetherResult<bool> {
        let mut inner = self.write()?;
        let Some(entry) = inner.entries.remove(key) else {
            return Ok(false);
        };
        drop_orphaned_records(&mut inner, &entry.dependencies);
        Ok(true)
    }

    async fn entry_reschedule(
        &self,
        key: &EntryKey,
        expiry_at: Timestamp,
        strategy: ExpiryStrategy,
    ) -> TetherResult<u32> {
        let mut inner = self.write()?;
        let entry = inner
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::EntryNotFound {
                object_type: key.object_type.clone(),
                flat_key: key.flat_key.to_string(),
            })?;
        entry.expiry_at = expiry_at;
        entry.expiry_strategy = strategy;
        let owned = entry.dependencies.clone();

        let mut reset = 0u32;
        for record_key in owned {
            if let Some(record) = inner.records.get_mut(&record_key) {
                record.reset_requested();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn entries_expired(
        &self,
        now: Timestamp,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .values()
            .filter(|e| {
                e.application_id == application_id
                    && e.agent_id == agent_id
                    && e.remaining_dependencies > 0
                    && e.is_expired(now)
            })
            .cloned()
            .collect())
    }

    async fn entries_resolved(
        &self,
        object_type: &str,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .values()
            .filter(|e| {
                e.object_type == object_type
                    && e.application_id == application_id
                    && e.agent_id == agent_id
                    && e.is_resolved()
            })
            .cloned()
            .collect())
    }

    async fn record_get(&self, key: &RecordKey) -> TetherResult<Option<DependencyRecord>> {
        let inner = self.read()?;
        Ok(inner.records.get(key).cloned())
    }

    async fn records_for_entry(&self, key: &EntryKey) -> TetherResult<Vec<DependencyRecord>> {
        let inner = self.read()?;
        let Some(entry) = inner.entries.get(key) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .dependencies
            .iter()
            .filter_map(|k| inner.records.get(k).cloned())
            .collect())
    }

    async fn records_unrequested(
        &self,
        object_type: &str,
        application_id: &str,
    ) -> TetherResult<Vec<DependencyRecord>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .values()
            .filter(|r| {
                r.object_type == object_type
                    && r.application_id == application_id
                    && !r.requested
            })
            .cloned()
            .collect())
    }

    async fn record_mark_requested(&self, key: &RecordKey, at: Timestamp) -> TetherResult<()> {
        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::RecordNotFound {
                object_type: key.object_type.clone(),
                flat_key: key.flat_key.to_string(),
            })?;
        record.requested = true;
        record.requested_at = Some(at);
        Ok(())
    }

    async fn remove_satisfied(&self, key: &RecordKey) -> TetherResult<u32> {
        let mut inner = self.write()?;
        if !inner.records.contains_key(key) {
            return Ok(0);
        }

        let mut parents = 0u32;
        for entry in inner.entries.values_mut() {
            if entry.dependencies.contains(key) {
                entry.dependencies.retain(|k| k != key);
                entry.remaining_dependencies = entry.dependencies.len() as u32;
                parents += 1;
            }
        }
        inner.records.remove(key);
        Ok(parents)
    }

    async fn counts(&self) -> TetherResult<StoreCounts> {
        let inner = self.read()?;
        Ok(StoreCounts {
            entries: inner.entries.len() as u64,
            records: inner.records.len() as u64,
        })
    }
}
