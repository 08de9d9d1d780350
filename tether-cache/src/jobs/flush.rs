//! Flush job: releases fully resolved entries back to normal processing.

use std::sync::atomic::{AtomicU64, Ordering};

use tether_storage::CacheStore;

use crate::capabilities::ProcessingSink;

/// Counters for flush passes, shared by every per-type flush job.
#[derive(Debug, Default)]
pub struct FlushJobMetrics {
    pub cycles: AtomicU64,
    pub entries_flushed: AtomicU64,
    pub errors: AtomicU64,
}

impl FlushJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FlushJobSnapshot {
        FlushJobSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_flushed: self.entries_flushed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`FlushJobMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushJobSnapshot {
    pub cycles: u64,
    pub entries_flushed: u64,
    pub errors: u64,
}

/// One flush pass: every entry of `object_type` with no remaining
/// dependencies is handed to the processing sink and then removed.
///
/// When the sink fails, the entry stays cached and is retried on the next
/// pass; the rest of the batch still runs.
pub async fn run_flush_pass(
    store: &dyn CacheStore,
    sink: &dyn ProcessingSink,
    object_type: &str,
    application_id: &str,
    agent_id: &str,
    metrics: &FlushJobMetrics,
) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    let ready = match store
        .entries_resolved(object_type, application_id, agent_id)
        .await
    {
        Ok(ready) => ready,
        Err(e) => {
            tracing::error!(
                error = %e,
                object_type,
                "Failed to query resolved entries"
            );
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    for entry in ready {
        match sink.resume(&entry.payload, &entry.zone_id, entry.event).await {
            Ok(()) => match store.entry_delete(&entry.key()).await {
                Ok(_) => {
                    tracing::info!(
                        object_type = %entry.object_type,
                        flat_key = %entry.flat_key,
                        is_event = entry.is_event(),
                        "Resolved entry flushed for normal processing"
                    );
                    metrics.entries_flushed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        object_type = %entry.object_type,
                        flat_key = %entry.flat_key,
                        "Flushed entry could not be removed from the cache"
                    );
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            Err(e) => {
                tracing::error!(
                    error = %e,
                    object_type = %entry.object_type,
                    flat_key = %entry.flat_key,
                    "Processing sink rejected resolved entry, keeping it for retry"
                );
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
