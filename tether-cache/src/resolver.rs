//! Dependency resolution: deciding what an incoming object still waits for,
//! and parking it in the store when anything remains.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use tether_core::{
    flatten_key, CacheEntry, DependencyRecord, EntryKey, EventKind, FieldReader, FlatKey,
    RecordKey, Scope, StoreError, TetherError, TetherResult, TypeGraph, ValidationError,
};
use tether_storage::CacheStore;

use crate::capabilities::TargetSystem;
use crate::extract::DependencyExtractor;

/// Outcome of [`DependencyResolver::compute_remaining`].
#[derive(Debug, Clone)]
pub struct ResolvedDependencies {
    /// Records that still need tracking, in no particular order.
    pub remaining: Vec<DependencyRecord>,
    /// How many references extraction discovered before pruning. Lets a
    /// caller tell "never had dependencies" apart from "all satisfiable
    /// right now" - both end with `remaining` empty.
    pub discovered: usize,
}

/// Orchestrates extraction, store lookups and downstream existence checks.
pub struct DependencyResolver {
    graph: Arc<TypeGraph>,
    store: Arc<dyn CacheStore>,
    target: Arc<dyn TargetSystem>,
    extractor: DependencyExtractor,
    agent_id: String,
}

impl DependencyResolver {
    pub fn new(
        graph: Arc<TypeGraph>,
        store: Arc<dyn CacheStore>,
        target: Arc<dyn TargetSystem>,
        agent_id: impl Into<String>,
    ) -> Self {
        let extractor = DependencyExtractor::new(Arc::clone(&graph));
        Self {
            graph,
            store,
            target,
            extractor,
            agent_id: agent_id.into(),
        }
    }

    pub fn extractor(&self) -> &DependencyExtractor {
        &self.extractor
    }

    /// Compute the set of dependencies `instance` still waits for.
    ///
    /// A reference already tracked in the store is reused as-is - once
    /// tracked, a dependency stays tracked until satisfied, and the
    /// downstream system is not asked about it again. Untracked references
    /// are checked against the downstream system and dropped when they
    /// already exist there; the rest become fresh unrequested records.
    pub async fn compute_remaining(
        &self,
        instance: &dyn FieldReader,
        object_type: &str,
        scope: &Scope,
        payload: &str,
    ) -> TetherResult<ResolvedDependencies> {
        validate_scope(scope)?;
        require(object_type, "object_type")?;

        let Some(owner) = self.graph.resolve(object_type) else {
            return Ok(ResolvedDependencies {
                remaining: Vec::new(),
                discovered: 0,
            });
        };

        let references = self.extractor.extract(instance, owner);
        let discovered = references.len();

        let mut remaining: Vec<DependencyRecord> = Vec::with_capacity(discovered);
        for reference in references {
            let Some(target_type) = self.graph.resolve(&reference.target_type) else {
                continue;
            };
            let flat_key = flatten_key(&reference.key_values, &target_type.key_separator)?;
            let record_key = RecordKey {
                object_type: reference.target_type.clone(),
                flat_key: flat_key.clone(),
                application_id: scope.application_id.clone(),
            };

            // The same object can reference one dependency several times;
            // it still owns a single record for it.
            if remaining.iter().any(|r| r.key() == record_key) {
                continue;
            }

            if let Some(existing) = self.store.record_get(&record_key).await? {
                remaining.push(existing);
                continue;
            }

            let exists = self
                .target
                .exists_in_target(&reference.target_type, &reference.key_values, payload)
                .await?;
            if exists {
                continue;
            }

            remaining.push(DependencyRecord::new(
                reference.target_type,
                flat_key,
                scope.application_id.clone(),
                scope.zone_id.clone(),
                reference.key_values,
            ));
        }

        Ok(ResolvedDependencies {
            remaining,
            discovered,
        })
    }

    /// Park `instance` in the cache when it has unresolved dependencies.
    ///
    /// Returns true when the object is (or already was) cached and normal
    /// processing should stop here; false when the caller should process it
    /// right away. Delete events are never cached.
    pub async fn cache_if_needed(
        &self,
        instance: &dyn FieldReader,
        object_type: &str,
        scope: &Scope,
        payload: &str,
        event: Option<EventKind>,
    ) -> TetherResult<bool> {
        validate_scope(scope)?;
        require(object_type, "object_type")?;

        if event == Some(EventKind::Delete) {
            return Ok(false);
        }
        if !self.graph.has_dependencies(object_type) {
            return Ok(false);
        }
        let Some(owner) = self.graph.resolve(object_type) else {
            return Ok(false);
        };

        let flat_key = self.extractor.extract_flat_key(instance, owner)?;
        let entry_key = EntryKey {
            object_type: object_type.to_string(),
            flat_key: flat_key.clone(),
            application_id: scope.application_id.clone(),
        };
        if self.store.entry_get(&entry_key).await?.is_some() {
            tracing::debug!(
                object_type,
                flat_key = %flat_key,
                "Object is already cached, not caching again"
            );
            return Ok(true);
        }

        let resolved = self
            .compute_remaining(instance, object_type, scope, payload)
            .await?;
        if resolved.remaining.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let entry = CacheEntry {
            entry_id: Uuid::now_v7(),
            object_type: object_type.to_string(),
            flat_key,
            application_id: scope.application_id.clone(),
            zone_id: scope.zone_id.clone(),
            agent_id: self.agent_id.clone(),
            event,
            payload: payload.to_string(),
            received_at: now,
            remaining_dependencies: resolved.remaining.len() as u32,
            expiry_at: now + Duration::minutes(owner.expiry_minutes),
            expiry_strategy: owner.expiry_strategy,
            dependencies: resolved.remaining.iter().map(|r| r.key()).collect(),
        };

        match self.store.entry_insert(&entry, &resolved.remaining).await {
            Ok(()) => {
                tracing::info!(
                    object_type,
                    flat_key = %entry.flat_key,
                    remaining = entry.remaining_dependencies,
                    "Cached object with unresolved dependencies"
                );
                Ok(true)
            }
            // A concurrent ingest of the same object won the insert; that
            // makes this object already cached.
            Err(TetherError::Store(StoreError::AlreadyExists { .. })) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// A real object of `object_type`/`flat_key` arrived: satisfy the
    /// matching dependency record, decrementing every parent entry.
    ///
    /// Returns the number of parent entries updated; zero means the
    /// dependency was never tracked, which is not an error.
    pub async fn remove_satisfied_dependency(
        &self,
        object_type: &str,
        flat_key: &FlatKey,
        scope: &Scope,
    ) -> TetherResult<u32> {
        validate_scope(scope)?;
        require(object_type, "object_type")?;
        require(flat_key.as_str(), "flat_key")?;

        let record_key = RecordKey {
            object_type: object_type.to_string(),
            flat_key: flat_key.clone(),
            application_id: scope.application_id.clone(),
        };
        let parents = self.store.remove_satisfied(&record_key).await?;
        if parents > 0 {
            tracing::info!(
                object_type,
                flat_key = %flat_key,
                parents,
                "Satisfied dependency removed from waiting entries"
            );
        }
        Ok(parents)
    }

    /// As [`Self::remove_satisfied_dependency`], deriving the flat key from
    /// the arrived instance itself.
    pub async fn remove_satisfied_instance(
        &self,
        instance: &dyn FieldReader,
        object_type: &str,
        scope: &Scope,
    ) -> TetherResult<u32> {
        let Some(ty) = self.graph.resolve(object_type) else {
            return Ok(0);
        };
        let flat_key = self.extractor.extract_flat_key(instance, ty)?;
        self.remove_satisfied_dependency(object_type, &flat_key, scope)
            .await
    }
}

fn validate_scope(scope: &Scope) -> Result<(), ValidationError> {
    require(&scope.application_id, "application_id")?;
    require(&scope.zone_id, "zone_id")
}

fn require(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredArgument {
            field: field.to_string(),
        });
    }
    Ok(())
}
