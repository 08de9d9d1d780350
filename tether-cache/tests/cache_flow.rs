//! End-to-end flows through the dependent-object cache: ingest, dependency
//! satisfaction, housekeeping passes and teardown, all against the in-memory
//! store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use tether_cache::{DependentObjectCache, ProcessingSink, RequestChannel, TargetSystem};
use tether_core::typegraph::{DependencyEdge, KeyField};
use tether_core::{
    CacheSettings, EntryKey, EventKind, ExpiryStrategy, FlatKey, JobSchedule, JsonReader,
    ObjectType, RecordKey, Scope, TetherResult, TypeGraph,
};
use tether_storage::{CacheStore, MemoryStore};

const APP: &str = "app";
const AGENT: &str = "agent-1";
const ZONE: &str = "zone-a";

// ============================================================================
// TEST DOUBLES
// ============================================================================

/// Downstream system holding a configurable set of existing objects.
#[derive(Default)]
struct FakeTarget {
    existing: Mutex<HashSet<(String, String)>>,
}

impl FakeTarget {
    fn add(&self, object_type: &str, key: &str) {
        self.existing
            .lock()
            .expect("lock should not be poisoned")
            .insert((object_type.to_string(), key.to_string()));
    }
}

#[async_trait]
impl TargetSystem for FakeTarget {
    async fn exists_in_target(
        &self,
        object_type: &str,
        key_values: &[String],
        _payload: &str,
    ) -> TetherResult<bool> {
        let key = (object_type.to_string(), key_values.join("|"));
        Ok(self
            .existing
            .lock()
            .expect("lock should not be poisoned")
            .contains(&key))
    }
}

/// Request channel recording issued queries; optionally failing.
#[derive(Default)]
struct FakeChannel {
    issued: Mutex<Vec<(String, Vec<String>, String)>>,
    fail: AtomicBool,
}

impl FakeChannel {
    fn issued(&self) -> Vec<(String, Vec<String>, String)> {
        self.issued
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestChannel for FakeChannel {
    async fn issue_request(
        &self,
        object_type: &str,
        key_values: &[String],
        zone_id: &str,
    ) -> TetherResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(tether_core::StoreError::TransactionFailed {
                reason: "zone unreachable".to_string(),
            }
            .into());
        }
        self.issued
            .lock()
            .expect("lock should not be poisoned")
            .push((
                object_type.to_string(),
                key_values.to_vec(),
                zone_id.to_string(),
            ));
        Ok(())
    }
}

/// Processing sink recording resumed payloads; optionally failing.
#[derive(Default)]
struct FakeSink {
    resumed: Mutex<Vec<(String, String, Option<EventKind>)>>,
    fail: AtomicBool,
}

impl FakeSink {
    fn resumed(&self) -> Vec<(String, String, Option<EventKind>)> {
        self.resumed
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessingSink for FakeSink {
    async fn resume(
        &self,
        payload: &str,
        zone_id: &str,
        event: Option<EventKind>,
    ) -> TetherResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(tether_core::StoreError::TransactionFailed {
                reason: "queue full".to_string(),
            }
            .into());
        }
        self.resumed
            .lock()
            .expect("lock should not be poisoned")
            .push((payload.to_string(), zone_id.to_string(), event));
        Ok(())
    }
}

// ============================================================================
// FIXTURE
// ============================================================================

fn graph() -> Arc<TypeGraph> {
    let student = ObjectType::new("Student", vec![KeyField::new("@RefId", 1)])
        .with_expiry(60, ExpiryStrategy::Request);
    let school = ObjectType::new("School", vec![KeyField::new("@RefId", 1)])
        .with_expiry(60, ExpiryStrategy::Request);
    let enrollment = ObjectType::new("Enrollment", vec![KeyField::new("@RefId", 1)])
        .with_expiry(120, ExpiryStrategy::Expire)
        .with_dependency(DependencyEdge::Direct {
            target: "Student".to_string(),
            source_paths: vec![KeyField::new("StudentRefId", 1)],
            list_path: None,
        })
        .with_dependency(DependencyEdge::Direct {
            target: "School".to_string(),
            source_paths: vec![KeyField::new("SchoolRefId", 1)],
            list_path: None,
        });
    // Same dependency shape as Enrollment but re-armed on expiry.
    let roster = ObjectType::new("Roster", vec![KeyField::new("@RefId", 1)])
        .with_expiry(30, ExpiryStrategy::Request)
        .with_dependency(DependencyEdge::Direct {
            target: "Student".to_string(),
            source_paths: vec![KeyField::new("StudentRefId", 1)],
            list_path: None,
        });

    Arc::new(
        TypeGraph::load(
            vec![student, school, enrollment, roster],
            &CacheSettings::default(),
        )
        .expect("graph should load"),
    )
}

struct Fixture {
    cache: DependentObjectCache,
    store: Arc<MemoryStore>,
    target: Arc<FakeTarget>,
    channel: Arc<FakeChannel>,
    sink: Arc<FakeSink>,
}

fn fixture() -> Fixture {
    fixture_with_settings(CacheSettings::default())
}

fn fixture_with_settings(settings: CacheSettings) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let target = Arc::new(FakeTarget::default());
    let channel = Arc::new(FakeChannel::default());
    let sink = Arc::new(FakeSink::default());
    let cache = DependentObjectCache::new(
        graph(),
        store.clone() as Arc<dyn CacheStore>,
        target.clone(),
        channel.clone(),
        sink.clone(),
        settings,
        APP,
        AGENT,
    )
    .expect("cache should construct");
    Fixture {
        cache,
        store,
        target,
        channel,
        sink,
    }
}

fn enrollment_payload(refid: &str, student: &str, school: &str) -> (JsonReader, String) {
    let value = json!({
        "@RefId": refid,
        "StudentRefId": student,
        "SchoolRefId": school
    });
    let payload = value.to_string();
    (JsonReader::new(value), payload)
}

fn entry_key(object_type: &str, flat_key: &str) -> EntryKey {
    EntryKey {
        object_type: object_type.to_string(),
        flat_key: FlatKey::from(flat_key),
        application_id: APP.to_string(),
    }
}

fn record_key(object_type: &str, flat_key: &str) -> RecordKey {
    RecordKey {
        object_type: object_type.to_string(),
        flat_key: FlatKey::from(flat_key),
        application_id: APP.to_string(),
    }
}

// ============================================================================
// INGEST PATH
// ============================================================================

#[tokio::test]
async fn test_object_with_absent_dependencies_is_cached() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");

    let cached = fx
        .cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");
    assert!(cached);

    let entry = fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .expect("entry should exist");
    assert_eq!(entry.remaining_dependencies, 2);
    assert_eq!(entry.zone_id, ZONE);
    assert_eq!(entry.agent_id, AGENT);
    assert_eq!(entry.expiry_strategy, ExpiryStrategy::Expire);

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 1);
    assert_eq!(counts.records, 2);
}

#[tokio::test]
async fn test_type_without_dependencies_is_never_cached() {
    let fx = fixture();
    let value = json!({ "@RefId": "S-1" });
    let payload = value.to_string();
    let instance = JsonReader::new(value);

    let cached = fx
        .cache
        .cache_if_needed(&instance, "Student", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");
    assert!(!cached);
    // Unknown types do not get cached either.
    let cached = fx
        .cache
        .cache_if_needed(&instance, "Mystery", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");
    assert!(!cached);

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 0);
    assert_eq!(counts.records, 0);
}

#[tokio::test]
async fn test_fully_satisfiable_object_is_not_cached() {
    let fx = fixture();
    fx.target.add("Student", "S-1");
    fx.target.add("School", "SC-1");
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");

    let cached = fx
        .cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");
    assert!(!cached);

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 0);
    assert_eq!(counts.records, 0);
}

#[tokio::test]
async fn test_cache_if_needed_is_idempotent() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");

    assert!(fx
        .cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed"));
    assert!(fx
        .cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed"));

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 1);
    assert_eq!(counts.records, 2);
}

#[tokio::test]
async fn test_delete_events_bypass_the_cache() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");

    let cached = fx
        .cache
        .cache_if_needed(
            &instance,
            "Enrollment",
            ZONE,
            &payload,
            Some(EventKind::Delete),
        )
        .await
        .expect("ingest should succeed");
    assert!(!cached);

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 0);

    // Add and change events cache normally.
    let cached = fx
        .cache
        .cache_if_needed(
            &instance,
            "Enrollment",
            ZONE,
            &payload,
            Some(EventKind::Add),
        )
        .await
        .expect("ingest should succeed");
    assert!(cached);
}

#[tokio::test]
async fn test_blank_arguments_are_rejected() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");

    let err = fx
        .cache
        .cache_if_needed(&instance, "Enrollment", "  ", &payload, None)
        .await
        .unwrap_err();
    assert!(matches!(err, tether_core::TetherError::InvalidArgument(_)));

    let err = fx
        .cache
        .cache_if_needed(&instance, "", ZONE, &payload, None)
        .await
        .unwrap_err();
    assert!(matches!(err, tether_core::TetherError::InvalidArgument(_)));
}

// ============================================================================
// DEPENDENCY SATISFACTION
// ============================================================================

#[tokio::test]
async fn test_scenario_arrivals_drain_the_reference_count() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    let parents = fx
        .cache
        .remove_satisfied_dependency("Student", &FlatKey::from("S-1"), ZONE)
        .await
        .expect("remove should succeed");
    assert_eq!(parents, 1);
    let entry = fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .expect("entry should exist");
    assert_eq!(entry.remaining_dependencies, 1);

    let parents = fx
        .cache
        .remove_satisfied_dependency("School", &FlatKey::from("SC-1"), ZONE)
        .await
        .expect("remove should succeed");
    assert_eq!(parents, 1);
    let entry = fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .expect("entry should exist");
    assert_eq!(entry.remaining_dependencies, 0);

    // Flush hands the payload back and clears the cache.
    fx.cache.run_flush_pass("Enrollment").await;
    let resumed = fx.sink.resumed();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].0, payload);
    assert_eq!(resumed[0].1, ZONE);
    assert_eq!(resumed[0].2, None);

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 0);
    assert_eq!(counts.records, 0);
}

#[tokio::test]
async fn test_shared_dependency_decrements_every_parent() {
    let fx = fixture();
    let (first, first_payload) = enrollment_payload("E-1", "S-1", "SC-1");
    let (second, second_payload) = enrollment_payload("E-2", "S-1", "SC-2");
    fx.cache
        .cache_if_needed(&first, "Enrollment", ZONE, &first_payload, None)
        .await
        .expect("ingest should succeed");
    fx.cache
        .cache_if_needed(&second, "Enrollment", ZONE, &second_payload, None)
        .await
        .expect("ingest should succeed");

    // Two entries, but the shared Student dependency is one record.
    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 2);
    assert_eq!(counts.records, 3);

    let parents = fx
        .cache
        .remove_satisfied_dependency("Student", &FlatKey::from("S-1"), ZONE)
        .await
        .expect("remove should succeed");
    assert_eq!(parents, 2);

    for key in ["E-1", "E-2"] {
        let entry = fx
            .store
            .entry_get(&entry_key("Enrollment", key))
            .await
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.remaining_dependencies, 1);
    }
}

#[tokio::test]
async fn test_tracked_dependency_skips_the_existence_check() {
    let fx = fixture();
    let (first, first_payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&first, "Enrollment", ZONE, &first_payload, None)
        .await
        .expect("ingest should succeed");

    // The student has since appeared downstream, but the tracked record
    // must be reused without asking again.
    fx.target.add("Student", "S-1");
    let (second, second_payload) = enrollment_payload("E-2", "S-1", "SC-1");
    let cached = fx
        .cache
        .cache_if_needed(&second, "Enrollment", ZONE, &second_payload, None)
        .await
        .expect("ingest should succeed");
    assert!(cached);

    let entry = fx
        .store
        .entry_get(&entry_key("Enrollment", "E-2"))
        .await
        .expect("get should succeed")
        .expect("entry should exist");
    assert_eq!(entry.remaining_dependencies, 2);
}

#[tokio::test]
async fn test_untracked_arrival_is_a_noop() {
    let fx = fixture();
    let parents = fx
        .cache
        .remove_satisfied_dependency("Student", &FlatKey::from("S-404"), ZONE)
        .await
        .expect("remove should succeed");
    assert_eq!(parents, 0);
}

// ============================================================================
// HOUSEKEEPING
// ============================================================================

#[tokio::test]
async fn test_expiry_pass_removes_expired_expire_entries() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    // Force the deadline into the past.
    fx.store
        .entry_reschedule(
            &entry_key("Enrollment", "E-1"),
            Utc::now() - chrono::Duration::minutes(1),
            ExpiryStrategy::Expire,
        )
        .await
        .expect("reschedule should succeed");

    fx.cache.run_expiry_pass().await;

    let counts = fx.store.counts().await.expect("counts should succeed");
    assert_eq!(counts.entries, 0);
    assert_eq!(counts.records, 0, "orphaned records must not persist");
    assert_eq!(fx.cache.expiry_metrics().entries_expired, 1);
}

#[tokio::test]
async fn test_expiry_pass_rearms_request_entries() {
    let fx = fixture();
    let value = json!({ "@RefId": "R-1", "StudentRefId": "S-1" });
    let payload = value.to_string();
    let instance = JsonReader::new(value);
    fx.cache
        .cache_if_needed(&instance, "Roster", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    fx.store
        .entry_reschedule(
            &entry_key("Roster", "R-1"),
            Utc::now() - chrono::Duration::minutes(1),
            ExpiryStrategy::Request,
        )
        .await
        .expect("reschedule should succeed");
    fx.store
        .record_mark_requested(&record_key("Student", "S-1"), Utc::now())
        .await
        .expect("mark should succeed");

    fx.cache.run_expiry_pass().await;

    let entry = fx
        .store
        .entry_get(&entry_key("Roster", "R-1"))
        .await
        .expect("get should succeed")
        .expect("entry should survive");
    assert!(entry.expiry_at > Utc::now());
    assert_eq!(entry.expiry_strategy, ExpiryStrategy::Request);

    let record = fx
        .store
        .record_get(&record_key("Student", "S-1"))
        .await
        .expect("get should succeed")
        .expect("record should survive");
    assert!(!record.requested);
    assert_eq!(fx.cache.expiry_metrics().entries_rearmed, 1);
}

#[tokio::test]
async fn test_expiry_pass_skips_rows_with_unknown_strategy() {
    let fx = fixture();
    let (first, first_payload) = enrollment_payload("E-1", "S-1", "SC-1");
    let (second, second_payload) = enrollment_payload("E-2", "S-2", "SC-2");
    fx.cache
        .cache_if_needed(&first, "Enrollment", ZONE, &first_payload, None)
        .await
        .expect("ingest should succeed");
    fx.cache
        .cache_if_needed(&second, "Enrollment", ZONE, &second_payload, None)
        .await
        .expect("ingest should succeed");

    let past = Utc::now() - chrono::Duration::minutes(1);
    fx.store
        .entry_reschedule(&entry_key("Enrollment", "E-1"), past, ExpiryStrategy::Unknown)
        .await
        .expect("reschedule should succeed");
    fx.store
        .entry_reschedule(&entry_key("Enrollment", "E-2"), past, ExpiryStrategy::Expire)
        .await
        .expect("reschedule should succeed");

    fx.cache.run_expiry_pass().await;

    // The bad row is left alone; the rest of the batch is processed.
    assert!(fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .is_some());
    assert!(fx
        .store
        .entry_get(&entry_key("Enrollment", "E-2"))
        .await
        .expect("get should succeed")
        .is_none());
    assert!(fx.cache.expiry_metrics().errors >= 1);
}

#[tokio::test]
async fn test_request_pass_marks_records_requested() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    fx.cache.run_request_pass("Student").await;

    let issued = fx.channel.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].0, "Student");
    assert_eq!(issued[0].1, vec!["S-1".to_string()]);
    assert_eq!(issued[0].2, ZONE);

    let record = fx
        .store
        .record_get(&record_key("Student", "S-1"))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert!(record.requested);
    assert!(record.requested_at.is_some());

    // A second pass has nothing left to request.
    fx.cache.run_request_pass("Student").await;
    assert_eq!(fx.channel.issued().len(), 1);
}

#[tokio::test]
async fn test_request_pass_tolerates_failing_channel() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    fx.channel.set_failing(true);
    fx.cache.run_request_pass("Student").await;

    let record = fx
        .store
        .record_get(&record_key("Student", "S-1"))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert!(!record.requested, "failed request must stay unrequested");
    assert!(fx.cache.request_metrics().errors >= 1);

    // The zone recovers; the next pass picks the record up again.
    fx.channel.set_failing(false);
    fx.cache.run_request_pass("Student").await;
    let record = fx
        .store
        .record_get(&record_key("Student", "S-1"))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert!(record.requested);
}

#[tokio::test]
async fn test_flush_pass_keeps_entry_when_sink_fails() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");
    fx.cache
        .remove_satisfied_dependency("Student", &FlatKey::from("S-1"), ZONE)
        .await
        .expect("remove should succeed");
    fx.cache
        .remove_satisfied_dependency("School", &FlatKey::from("SC-1"), ZONE)
        .await
        .expect("remove should succeed");

    fx.sink.set_failing(true);
    fx.cache.run_flush_pass("Enrollment").await;
    assert!(fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .is_some());

    fx.sink.set_failing(false);
    fx.cache.run_flush_pass("Enrollment").await;
    assert!(fx
        .store
        .entry_get(&entry_key("Enrollment", "E-1"))
        .await
        .expect("get should succeed")
        .is_none());
    assert_eq!(fx.sink.resumed().len(), 1);
}

#[tokio::test]
async fn test_flush_preserves_event_kind() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(
            &instance,
            "Enrollment",
            ZONE,
            &payload,
            Some(EventKind::Change),
        )
        .await
        .expect("ingest should succeed");
    fx.cache
        .remove_satisfied_dependency("Student", &FlatKey::from("S-1"), ZONE)
        .await
        .expect("remove should succeed");
    fx.cache
        .remove_satisfied_dependency("School", &FlatKey::from("SC-1"), ZONE)
        .await
        .expect("remove should succeed");

    fx.cache.run_flush_pass("Enrollment").await;
    let resumed = fx.sink.resumed();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].2, Some(EventKind::Change));
}

// ============================================================================
// SERVICE SURFACE & LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_graph_queries_on_the_service() {
    let fx = fixture();
    assert!(fx.cache.has_potential_dependencies("Enrollment"));
    assert!(!fx.cache.has_potential_dependencies("Student"));
    assert!(!fx.cache.has_potential_dependencies("Mystery"));
    assert!(fx.cache.is_depended_upon("Student"));
    assert!(fx.cache.is_depended_upon("School"));
    assert!(!fx.cache.is_depended_upon("Enrollment"));
}

#[tokio::test]
async fn test_remove_satisfied_instance_derives_the_key() {
    let fx = fixture();
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    let student = JsonReader::new(json!({ "@RefId": "S-1" }));
    let parents = fx
        .cache
        .remove_satisfied_instance(&student, "Student", ZONE)
        .await
        .expect("remove should succeed");
    assert_eq!(parents, 1);
}

#[tokio::test]
async fn test_housekeeping_lifecycle() {
    let fast = JobSchedule::new(Duration::from_millis(10), Duration::from_millis(25));
    let mut settings = CacheSettings::default();
    settings.expiry_check = fast;
    settings.default_request = fast;
    settings.default_flush = fast;
    let fx = fixture_with_settings(settings);

    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    fx.cache
        .cache_if_needed(&instance, "Enrollment", ZONE, &payload, None)
        .await
        .expect("ingest should succeed");

    let scheduler = fx.cache.start_housekeeping();
    // One expiry job, request jobs for Student and School, a flush job for
    // Enrollment and one for Roster.
    assert_eq!(scheduler.job_names().len(), 5);

    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.shutdown().await;

    // The request jobs ran and issued queries for both dependencies.
    let issued = fx.channel.issued();
    assert!(issued.iter().any(|(t, _, _)| t == "Student"));
    assert!(issued.iter().any(|(t, _, _)| t == "School"));
    assert!(fx.cache.request_metrics().requests_issued >= 2);
    assert!(fx.cache.expiry_metrics().cycles >= 1);
}

#[tokio::test]
async fn test_compute_remaining_distinguishes_empty_cases() {
    let fx = fixture();
    let resolver = tether_cache::DependencyResolver::new(
        graph(),
        fx.store.clone() as Arc<dyn CacheStore>,
        fx.target.clone(),
        AGENT,
    );
    let scope = Scope::new(APP, ZONE);

    // No edges at all.
    let student = JsonReader::new(json!({ "@RefId": "S-1" }));
    let resolved = resolver
        .compute_remaining(&student, "Student", &scope, "{}")
        .await
        .expect("resolution should succeed");
    assert_eq!(resolved.discovered, 0);
    assert!(resolved.remaining.is_empty());

    // Edges present but all satisfiable downstream.
    fx.target.add("Student", "S-1");
    fx.target.add("School", "SC-1");
    let (instance, payload) = enrollment_payload("E-1", "S-1", "SC-1");
    let resolved = resolver
        .compute_remaining(&instance, "Enrollment", &scope, &payload)
        .await
        .expect("resolution should succeed");
    assert_eq!(resolved.discovered, 2);
    assert!(resolved.remaining.is_empty());
}
