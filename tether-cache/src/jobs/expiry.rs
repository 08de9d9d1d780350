//! Expiry job: applies each overdue entry's expiry strategy.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};

use tether_core::{ExpiryStrategy, TypeGraph};
use tether_storage::CacheStore;

/// Counters for expiry passes.
#[derive(Debug, Default)]
pub struct ExpiryJobMetrics {
    /// Total passes run since startup.
    pub cycles: AtomicU64,
    /// Entries removed under the EXPIRE strategy.
    pub entries_expired: AtomicU64,
    /// Entries re-armed under the REQUEST strategy.
    pub entries_rearmed: AtomicU64,
    /// Per-item and per-pass failures, including unknown strategies.
    pub errors: AtomicU64,
}

impl ExpiryJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ExpiryJobSnapshot {
        ExpiryJobSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_expired: self.entries_expired.load(Ordering::Relaxed),
            entries_rearmed: self.entries_rearmed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`ExpiryJobMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryJobSnapshot {
    pub cycles: u64,
    pub entries_expired: u64,
    pub entries_rearmed: u64,
    pub errors: u64,
}

/// One expiry pass over every overdue entry of this application and agent.
///
/// EXPIRE entries are deleted (their orphaned records with them); REQUEST
/// entries get a fresh deadline and strategy from the *live* type graph and
/// their records go back into the request queue. A row with an unknown
/// strategy is logged and skipped; one bad row never blocks the batch.
pub async fn run_expiry_pass(
    graph: &TypeGraph,
    store: &dyn CacheStore,
    application_id: &str,
    agent_id: &str,
    metrics: &ExpiryJobMetrics,
) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    let now = Utc::now();

    let expired = match store.entries_expired(now, application_id, agent_id).await {
        Ok(expired) => expired,
        Err(e) => {
            tracing::error!(error = %e, "Failed to query expired entries");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    for entry in expired {
        let key = entry.key();
        match entry.expiry_strategy {
            ExpiryStrategy::Expire => match store.entry_delete(&key).await {
                Ok(_) => {
                    tracing::info!(
                        object_type = %entry.object_type,
                        flat_key = %entry.flat_key,
                        remaining = entry.remaining_dependencies,
                        "Expired entry removed from cache"
                    );
                    metrics.entries_expired.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        object_type = %entry.object_type,
                        flat_key = %entry.flat_key,
                        "Failed to remove expired entry"
                    );
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            ExpiryStrategy::Request => {
                // The live graph value, not what the row captured at
                // creation: operators can change the policy for existing
                // entries without waiting for them to cycle out.
                let Some(ty) = graph.resolve(&entry.object_type) else {
                    tracing::warn!(
                        object_type = %entry.object_type,
                        flat_key = %entry.flat_key,
                        "Expired entry's type is no longer in the graph, skipping"
                    );
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                };
                let expiry_at = now + Duration::minutes(ty.expiry_minutes);
                match store
                    .entry_reschedule(&key, expiry_at, ty.expiry_strategy)
                    .await
                {
                    Ok(reset) => {
                        tracing::info!(
                            object_type = %entry.object_type,
                            flat_key = %entry.flat_key,
                            records_reset = reset,
                            "Expired entry re-armed for another request round"
                        );
                        metrics.entries_rearmed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            object_type = %entry.object_type,
                            flat_key = %entry.flat_key,
                            "Failed to re-arm expired entry"
                        );
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            ExpiryStrategy::Unknown => {
                tracing::error!(
                    object_type = %entry.object_type,
                    flat_key = %entry.flat_key,
                    "Invalid expiry strategy on cached entry, skipping row"
                );
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
