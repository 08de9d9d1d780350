//! Request job: issues queries for outstanding dependencies of one type.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use tether_storage::CacheStore;

use crate::capabilities::RequestChannel;

/// Counters for request passes, shared by every per-type request job.
#[derive(Debug, Default)]
pub struct RequestJobMetrics {
    pub cycles: AtomicU64,
    pub requests_issued: AtomicU64,
    pub errors: AtomicU64,
}

impl RequestJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RequestJobSnapshot {
        RequestJobSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`RequestJobMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestJobSnapshot {
    pub cycles: u64,
    pub requests_issued: u64,
    pub errors: u64,
}

/// One request pass: every not-yet-requested record of `object_type` gets a
/// query issued to its zone, then is marked requested.
///
/// A failed request is logged and the record stays unrequested for the next
/// pass; the remaining records of the same pass are still attempted.
pub async fn run_request_pass(
    store: &dyn CacheStore,
    channel: &dyn RequestChannel,
    object_type: &str,
    application_id: &str,
    metrics: &RequestJobMetrics,
) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    let pending = match store.records_unrequested(object_type, application_id).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(
                error = %e,
                object_type,
                "Failed to query unrequested dependency records"
            );
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    for record in pending {
        match channel
            .issue_request(&record.object_type, &record.key_values, &record.zone_id)
            .await
        {
            Ok(()) => {
                if let Err(e) = store.record_mark_requested(&record.key(), Utc::now()).await {
                    tracing::error!(
                        error = %e,
                        object_type = %record.object_type,
                        flat_key = %record.flat_key,
                        "Request issued but record could not be marked requested"
                    );
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                tracing::debug!(
                    object_type = %record.object_type,
                    flat_key = %record.flat_key,
                    zone_id = %record.zone_id,
                    "Issued request for outstanding dependency"
                );
                metrics.requests_issued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    object_type = %record.object_type,
                    flat_key = %record.flat_key,
                    zone_id = %record.zone_id,
                    "Failed to issue request for outstanding dependency"
                );
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
