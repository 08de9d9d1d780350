//! LMDB-backed store via the heed crate.
//!
//! Entries and dependency records live in two named databases inside one
//! memory-mapped environment. Every [`CacheStore`] operation runs in a
//! single LMDB transaction, which is what makes the compound operations
//! (remove-satisfied, delete-with-cascade, reschedule) atomic even with
//! several agent processes sharing the environment.
//!
//! Rows are serialized as JSON. Conditional queries are linear scans over
//! the relevant database; the cache holds in-flight objects, not a working
//! set, so the tables stay small and a scan per housekeeping pass is cheap.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tether_core::{
    CacheEntry, DependencyRecord, EntryKey, ExpiryStrategy, RecordKey, StoreError, TetherError,
    TetherResult, Timestamp,
};

use crate::store_key::{entry_key_bytes, record_key_bytes};
use crate::{CacheStore, StoreCounts};

const ENTRIES_DB: &str = "entries";
const RECORDS_DB: &str = "records";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for TetherError {
    fn from(e: LmdbStoreError) -> Self {
        let store_error = match e {
            LmdbStoreError::Serialization(reason) => StoreError::Serialization { reason },
            LmdbStoreError::Deserialization(reason) => StoreError::Serialization { reason },
            other => StoreError::TransactionFailed {
                reason: other.to_string(),
            },
        };
        TetherError::Store(store_error)
    }
}

/// LMDB-backed [`CacheStore`].
pub struct LmdbStore {
    env: Env,
    entries: Database<Bytes, Bytes>,
    records: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open (or create) the store under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where the LMDB files live
    /// * `max_size_mb` - Maximum size of the memory map in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let entries: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(ENTRIES_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let records: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(RECORDS_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "Opened LMDB cache store");

        Ok(Self {
            env,
            entries,
            records,
        })
    }

    fn read_txn(&self) -> Result<RoTxn<'_>, LmdbStoreError> {
        self.env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    fn write_txn(&self) -> Result<RwTxn<'_>, LmdbStoreError> {
        self.env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    fn get_row<T: DeserializeOwned>(
        &self,
        db: &Database<Bytes, Bytes>,
        txn: &RoTxn<'_>,
        key: &[u8],
    ) -> Result<Option<T>, LmdbStoreError> {
        match db
            .get(txn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
        {
            Some(bytes) => {
                let row = serde_json::from_slice(bytes)
                    .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn put_row<T: Serialize>(
        &self,
        db: &Database<Bytes, Bytes>,
        txn: &mut RwTxn<'_>,
        key: &[u8],
        row: &T,
    ) -> Result<(), LmdbStoreError> {
        let bytes =
            serde_json::to_vec(row).map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        db.put(txn, key, &bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    /// Deserialize every entry row visible to `txn`, with its store key.
    fn scan_entries(
        &self,
        txn: &RoTxn<'_>,
    ) -> Result<Vec<(Vec<u8>, CacheEntry)>, LmdbStoreError> {
        let mut rows = Vec::new();
        let iter = self
            .entries
            .iter(txn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        for result in iter {
            let (key, bytes) = result.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            let entry: CacheEntry = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            rows.push((key.to_vec(), entry));
        }
        Ok(rows)
    }

    fn scan_records(&self, txn: &RoTxn<'_>) -> Result<Vec<DependencyRecord>, LmdbStoreError> {
        let mut rows = Vec::new();
        let iter = self
            .records
            .iter(txn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        for result in iter {
            let (_, bytes) = result.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            let record: DependencyRecord = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            rows.push(record);
        }
        Ok(rows)
    }

    fn commit(wtxn: RwTxn<'_>) -> Result<(), LmdbStoreError> {
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    fn delete_key(
        &self,
        db: &Database<Bytes, Bytes>,
        txn: &mut RwTxn<'_>,
        key: &[u8],
    ) -> Result<bool, LmdbStoreError> {
        db.delete(txn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for LmdbStore {
    async fn entry_get(&self, key: &EntryKey) -> TetherResult<Option<CacheEntry>> {
        let txn = self.read_txn()?;
        let entry = self.get_row(&self.entries, &txn, &entry_key_bytes(key))?;
        Ok(entry)
    }

    async fn entry_insert(
        &self,
        entry: &CacheEntry,
        records: &[DependencyRecord],
    ) -> TetherResult<()> {
        let key_bytes = entry_key_bytes(&entry.key());
        let mut wtxn = self.write_txn()?;

        let existing: Option<CacheEntry> = self.get_row(&self.entries, &wtxn, &key_bytes)?;
        if existing.is_some() {
            return Err(TetherError::Store(StoreError::AlreadyExists {
                object_type: entry.object_type.clone(),
                flat_key: entry.flat_key.to_string(),
            }));
        }

        for record in records {
            let record_bytes = record_key_bytes(&record.key());
            let existing: Option<DependencyRecord> =
                self.get_row(&self.records, &wtxn, &record_bytes)?;
            // A record tracked for another entry stays as it is.
            if existing.is_none() {
                self.put_row(&self.records, &mut wtxn, &record_bytes, record)?;
            }
        }
        self.put_row(&self.entries, &mut wtxn, &key_bytes, entry)?;

        Self::commit(wtxn)?;
        Ok(())
    }

    async fn entry_delete(&self, key: &EntryKey) -> TetherResult<bool> {
        let key_bytes = entry_key_bytes(key);
        let mut wtxn = self.write_txn()?;

        let Some(entry) = self.get_row::<CacheEntry>(&self.entries, &wtxn, &key_bytes)? else {
            return Ok(false);
        };
        self.delete_key(&self.entries, &mut wtxn, &key_bytes)?;

        // Drop records no surviving entry references any more.
        let survivors = self.scan_entries(&wtxn)?;
        for record_key in &entry.dependencies {
            let still_referenced = survivors
                .iter()
                .any(|(_, e)| e.dependencies.contains(record_key));
            if !still_referenced {
                self.delete_key(&self.records, &mut wtxn, &record_key_bytes(record_key))?;
            }
        }

        Self::commit(wtxn)?;
        Ok(true)
    }

    async fn entry_reschedule(
        &self,
        key: &EntryKey,
        expiry_at: Timestamp,
        strategy: ExpiryStrategy,
    ) -> TetherResult<u32> {
        let key_bytes = entry_key_bytes(key);
        let mut wtxn = self.write_txn()?;

        let mut entry: CacheEntry = self
            .get_row(&self.entries, &wtxn, &key_bytes)?
            .ok_or_else(|| StoreError::EntryNotFound {
                object_type: key.object_type.clone(),
                flat_key: key.flat_key.to_string(),
            })?;
        entry.expiry_at = expiry_at;
        entry.expiry_strategy = strategy;
        self.put_row(&self.entries, &mut wtxn, &key_bytes, &entry)?;

        let mut reset = 0u32;
        for record_key in &entry.dependencies {
            let record_bytes = record_key_bytes(record_key);
            if let Some(mut record) =
                self.get_row::<DependencyRecord>(&self.records, &wtxn, &record_bytes)?
            {
                record.reset_requested();
                self.put_row(&self.records, &mut wtxn, &record_bytes, &record)?;
                reset += 1;
            }
        }

        Self::commit(wtxn)?;
        Ok(reset)
    }

    async fn entries_expired(
        &self,
        now: Timestamp,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>> {
        let txn = self.read_txn()?;
        let rows = self.scan_entries(&txn)?;
        Ok(rows
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| {
                e.application_id == application_id
                    && e.agent_id == agent_id
                    && e.remaining_dependencies > 0
                    && e.is_expired(now)
            })
            .collect())
    }

    async fn entries_resolved(
        &self,
        object_type: &str,
        application_id: &str,
        agent_id: &str,
    ) -> TetherResult<Vec<CacheEntry>> {
        let txn = self.read_txn()?;
        let rows = self.scan_entries(&txn)?;
        Ok(rows
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| {
                e.object_type == object_type
                    && e.application_id == application_id
                    && e.agent_id == agent_id
                    && e.is_resolved()
            })
            .collect())
    }

    async fn record_get(&self, key: &RecordKey) -> TetherResult<Option<DependencyRecord>> {
        let txn = self.read_txn()?;
        let record = self.get_row(&self.records, &txn, &record_key_bytes(key))?;
        Ok(record)
    }

    async fn records_for_entry(&self, key: &EntryKey) -> TetherResult<Vec<DependencyRecord>> {
        let txn = self.read_txn()?;
        let Some(entry) =
            self.get_row::<CacheEntry>(&self.entries, &txn, &entry_key_bytes(key))?
        else {
            return Ok(Vec::new());
        };
        let mut records = Vec::with_capacity(entry.dependencies.len());
        for record_key in &entry.dependencies {
            if let Some(record) =
                self.get_row::<DependencyRecord>(&self.records, &txn, &record_key_bytes(record_key))?
            {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn records_unrequested(
        &self,
        object_type: &str,
        application_id: &str,
    ) -> TetherResult<Vec<DependencyRecord>> {
        let txn = self.read_txn()?;
        let rows = self.scan_records(&txn)?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                r.object_type == object_type
                    && r.application_id == application_id
                    && !r.requested
            })
            .collect())
    }

    async fn record_mark_requested(&self, key: &RecordKey, at: Timestamp) -> TetherResult<()> {
        let key_bytes = record_key_bytes(key);
        let mut wtxn = self.write_txn()?;

        let mut record: DependencyRecord = self
            .get_row(&self.records, &wtxn, &key_bytes)?
            .ok_or_else(|| StoreError::RecordNotFound {
                object_type: key.object_type.clone(),
                flat_key: key.flat_key.to_string(),
            })?;
        record.requested = true;
        record.requested_at = Some(at);
        self.put_row(&self.records, &mut wtxn, &key_bytes, &record)?;

        Self::commit(wtxn)?;
        Ok(())
    }

    async fn remove_satisfied(&self, key: &RecordKey) -> TetherResult<u32> {
        let key_bytes = record_key_bytes(key);
        let mut wtxn = self.write_txn()?;

        let existing: Option<DependencyRecord> =
            self.get_row(&self.records, &wtxn, &key_bytes)?;
        if existing.is_none() {
            return Ok(0);
        }

        let mut parents = 0u32;
        let rows = self.scan_entries(&wtxn)?;
        for (entry_bytes, mut entry) in rows {
            if entry.dependencies.contains(key) {
                entry.dependencies.retain(|k| k != key);
                entry.remaining_dependencies = entry.dependencies.len() as u32;
                self.put_row(&self.entries, &mut wtxn, &entry_bytes, &entry)?;
                parents += 1;
            }
        }
        self.delete_key(&self.records, &mut wtxn, &key_bytes)?;

        Self::commit(wtxn)?;
        Ok(parents)
    }

    async fn counts(&self) -> TetherResult<StoreCounts> {
        let txn = self.read_txn()?;
        let entries = self
            .entries
            .len(&txn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let records = self
            .records
            .len(&txn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(StoreCounts { entries, records })
    }
}
