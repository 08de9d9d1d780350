//! The top-level service handle wiring resolver, store, capabilities and
//! housekeeping together.

use std::sync::Arc;

use tether_core::{
    CacheSettings, EventKind, FieldReader, FlatKey, Scope, TetherResult, TypeGraph,
    ValidationError,
};
use tether_storage::CacheStore;

use crate::capabilities::{ProcessingSink, RequestChannel, TargetSystem};
use crate::jobs::{
    self, expiry, flush, request, ExpiryJobMetrics, ExpiryJobSnapshot, FlushJobMetrics,
    FlushJobSnapshot, HousekeepingScheduler, RequestJobMetrics, RequestJobSnapshot,
};
use crate::resolver::DependencyResolver;

/// The dependent-object cache of one agent process.
///
/// Explicitly constructed and dependency-injected: no global state, so tests
/// can run any number of independent instances side by side. The store may
/// still be shared between processes; this handle only owns its agent's view
/// of it.
///
/// Ingest-path calls ([`cache_if_needed`](Self::cache_if_needed),
/// [`remove_satisfied_dependency`](Self::remove_satisfied_dependency)) run
/// on the caller's thread. Housekeeping runs on background tasks started
/// with [`start_housekeeping`](Self::start_housekeeping), and every job pass
/// is also callable on demand, timers aside.
pub struct DependentObjectCache {
    graph: Arc<TypeGraph>,
    store: Arc<dyn CacheStore>,
    channel: Arc<dyn RequestChannel>,
    sink: Arc<dyn ProcessingSink>,
    settings: Arc<CacheSettings>,
    resolver: DependencyResolver,
    application_id: String,
    agent_id: String,
    expiry_metrics: Arc<ExpiryJobMetrics>,
    request_metrics: Arc<RequestJobMetrics>,
    flush_metrics: Arc<FlushJobMetrics>,
}

impl DependentObjectCache {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<TypeGraph>,
        store: Arc<dyn CacheStore>,
        target: Arc<dyn TargetSystem>,
        channel: Arc<dyn RequestChannel>,
        sink: Arc<dyn ProcessingSink>,
        settings: CacheSettings,
        application_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> TetherResult<Self> {
        let application_id = application_id.into();
        let agent_id = agent_id.into();
        for (value, field) in [(&application_id, "application_id"), (&agent_id, "agent_id")] {
            if value.trim().is_empty() {
                return Err(ValidationError::RequiredArgument {
                    field: field.to_string(),
                }
                .into());
            }
        }
        settings.validate()?;

        let resolver = DependencyResolver::new(
            Arc::clone(&graph),
            Arc::clone(&store),
            target,
            agent_id.clone(),
        );

        Ok(Self {
            graph,
            store,
            channel,
            sink,
            settings: Arc::new(settings),
            resolver,
            application_id,
            agent_id,
            expiry_metrics: Arc::new(ExpiryJobMetrics::new()),
            request_metrics: Arc::new(RequestJobMetrics::new()),
            flush_metrics: Arc::new(FlushJobMetrics::new()),
        })
    }

    // === Ingest path ===

    /// Park an incoming object when it has unresolved dependencies.
    /// See [`DependencyResolver::cache_if_needed`].
    pub async fn cache_if_needed(
        &self,
        instance: &dyn FieldReader,
        object_type: &str,
        zone_id: &str,
        payload: &str,
        event: Option<EventKind>,
    ) -> TetherResult<bool> {
        let scope = self.scope(zone_id);
        self.resolver
            .cache_if_needed(instance, object_type, &scope, payload, event)
            .await
    }

    /// Satisfy a tracked dependency after the real object arrived.
    /// See [`DependencyResolver::remove_satisfied_dependency`].
    pub async fn remove_satisfied_dependency(
        &self,
        object_type: &str,
        flat_key: &FlatKey,
        zone_id: &str,
    ) -> TetherResult<u32> {
        let scope = self.scope(zone_id);
        self.resolver
            .remove_satisfied_dependency(object_type, flat_key, &scope)
            .await
    }

    /// As [`Self::remove_satisfied_dependency`], deriving the flat key from
    /// the arrived instance.
    pub async fn remove_satisfied_instance(
        &self,
        instance: &dyn FieldReader,
        object_type: &str,
        zone_id: &str,
    ) -> TetherResult<u32> {
        let scope = self.scope(zone_id);
        self.resolver
            .remove_satisfied_instance(instance, object_type, &scope)
            .await
    }

    // === Graph queries ===

    /// Whether objects of this type can have dependencies at all. Unknown
    /// types answer false: no caching policy applies to them.
    pub fn has_potential_dependencies(&self, object_type: &str) -> bool {
        self.graph.has_dependencies(object_type)
    }

    /// Whether some other type depends on this one.
    pub fn is_depended_upon(&self, object_type: &str) -> bool {
        self.graph.is_depended_upon(object_type)
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    // === Housekeeping: on-demand passes ===

    /// Run one expiry pass now, independent of the timers.
    pub async fn run_expiry_pass(&self) {
        expiry::run_expiry_pass(
            &self.graph,
            self.store.as_ref(),
            &self.application_id,
            &self.agent_id,
            &self.expiry_metrics,
        )
        .await;
    }

    /// Run one request pass for `object_type` now, independent of the timers.
    pub async fn run_request_pass(&self, object_type: &str) {
        request::run_request_pass(
            self.store.as_ref(),
            self.channel.as_ref(),
            object_type,
            &self.application_id,
            &self.request_metrics,
        )
        .await;
    }

    /// Run one flush pass for `object_type` now, independent of the timers.
    pub async fn run_flush_pass(&self, object_type: &str) {
        flush::run_flush_pass(
            self.store.as_ref(),
            self.sink.as_ref(),
            object_type,
            &self.application_id,
            &self.agent_id,
            &self.flush_metrics,
        )
        .await;
    }

    pub fn expiry_metrics(&self) -> ExpiryJobSnapshot {
        self.expiry_metrics.snapshot()
    }

    pub fn request_metrics(&self) -> RequestJobSnapshot {
        self.request_metrics.snapshot()
    }

    pub fn flush_metrics(&self) -> FlushJobSnapshot {
        self.flush_metrics.snapshot()
    }

    // === Housekeeping: background scheduling ===

    /// Start the background jobs: one global expiry job, a request job per
    /// depended-upon type and a flush job per dependent type, each on its
    /// own configured schedule. Call after the store and capabilities are
    /// ready; stop via [`HousekeepingScheduler::shutdown`] on teardown.
    pub fn start_housekeeping(&self) -> HousekeepingScheduler {
        let mut handles = Vec::new();

        {
            let graph = Arc::clone(&self.graph);
            let store = Arc::clone(&self.store);
            let metrics = Arc::clone(&self.expiry_metrics);
            let application_id = self.application_id.clone();
            let agent_id = self.agent_id.clone();
            handles.push(jobs::spawn_job(
                "expiry".to_string(),
                self.settings.expiry_check,
                move || {
                    let graph = Arc::clone(&graph);
                    let store = Arc::clone(&store);
                    let metrics = Arc::clone(&metrics);
                    let application_id = application_id.clone();
                    let agent_id = agent_id.clone();
                    async move {
                        expiry::run_expiry_pass(
                            &graph,
                            store.as_ref(),
                            &application_id,
                            &agent_id,
                            &metrics,
                        )
                        .await;
                    }
                },
            ));
        }

        let mut depended_upon: Vec<String> = self
            .graph
            .depended_upon_type_names()
            .map(|n| n.to_string())
            .collect();
        depended_upon.sort();
        for object_type in depended_upon {
            let store = Arc::clone(&self.store);
            let channel = Arc::clone(&self.channel);
            let metrics = Arc::clone(&self.request_metrics);
            let application_id = self.application_id.clone();
            let schedule = self.settings.request_schedule_for(&object_type);
            let name = format!("request:{object_type}");
            handles.push(jobs::spawn_job(name, schedule, move || {
                let store = Arc::clone(&store);
                let channel = Arc::clone(&channel);
                let metrics = Arc::clone(&metrics);
                let application_id = application_id.clone();
                let object_type = object_type.clone();
                async move {
                    request::run_request_pass(
                        store.as_ref(),
                        channel.as_ref(),
                        &object_type,
                        &application_id,
                        &metrics,
                    )
                    .await;
                }
            }));
        }

        let mut dependent: Vec<String> = self
            .graph
            .dependent_type_names()
            .map(|n| n.to_string())
            .collect();
        dependent.sort();
        for object_type in dependent {
            let store = Arc::clone(&self.store);
            let sink = Arc::clone(&self.sink);
            let metrics = Arc::clone(&self.flush_metrics);
            let application_id = self.application_id.clone();
            let agent_id = self.agent_id.clone();
            let schedule = self.settings.flush_schedule_for(&object_type);
            let name = format!("flush:{object_type}");
            handles.push(jobs::spawn_job(name, schedule, move || {
                let store = Arc::clone(&store);
                let sink = Arc::clone(&sink);
                let metrics = Arc::clone(&metrics);
                let application_id = application_id.clone();
                let agent_id = agent_id.clone();
                let object_type = object_type.clone();
                async move {
                    flush::run_flush_pass(
                        store.as_ref(),
                        sink.as_ref(),
                        &object_type,
                        &application_id,
                        &agent_id,
                        &metrics,
                    )
                    .await;
                }
            }));
        }

        HousekeepingScheduler::new(handles)
    }

    fn scope(&self, zone_id: &str) -> Scope {
        Scope::new(self.application_id.clone(), zone_id)
    }
}
