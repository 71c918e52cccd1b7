//! Integration tests for the sync coordinator, driven through in-memory
//! display and external fakes.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use atlas_db::catalog::Catalog;
use atlas_db::{Database, queries};
use atlas_sync::coordinator::{RetryPolicy, SyncCoordinator};
use atlas_sync::reconcile::reconcile;
use atlas_sync::{DisplaySurface, ExternalCatalog, ExternalRoom, SyncError};
use atlas_types::models::{Deployment, Room, RoomDraft, RoomType};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeSurface {
    next_id: AtomicI64,
    renders: Mutex<Vec<(i64, String, i64)>>,
    removals: Mutex<Vec<(i64, i64)>>,
    failing: Mutex<HashSet<i64>>,
}

impl FakeSurface {
    fn fail_deployment(&self, id: i64) {
        self.failing.lock().unwrap().insert(id);
    }

    fn heal_deployment(&self, id: i64) {
        self.failing.lock().unwrap().remove(&id);
    }

    fn renders(&self) -> Vec<(i64, String, i64)> {
        self.renders.lock().unwrap().clone()
    }

    fn removals(&self) -> Vec<(i64, i64)> {
        self.removals.lock().unwrap().clone()
    }
}

impl DisplaySurface for FakeSurface {
    fn render<'a>(
        &'a self,
        deployment: &'a Deployment,
        room: &'a Room,
    ) -> BoxFuture<'a, Result<i64, SyncError>> {
        async move {
            if self.failing.lock().unwrap().contains(&deployment.id) {
                return Err(SyncError::Transient("display channel missing".into()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.renders
                .lock()
                .unwrap()
                .push((deployment.id, room.name.clone(), room.revision));
            Ok(id)
        }
        .boxed()
    }

    fn remove<'a>(
        &'a self,
        deployment: &'a Deployment,
        message_id: i64,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            self.removals
                .lock()
                .unwrap()
                .push((deployment.id, message_id));
            Ok(())
        }
        .boxed()
    }
}

#[derive(Default)]
struct FakeExternal {
    fail_remaining: AtomicU32,
    upserts: Mutex<Vec<(String, i64)>>,
    deletes: Mutex<Vec<String>>,
    export_rooms: Mutex<Vec<ExternalRoom>>,
}

impl FakeExternal {
    fn upserts(&self) -> Vec<(String, i64)> {
        self.upserts.lock().unwrap().clone()
    }

    fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

impl ExternalCatalog for FakeExternal {
    fn upsert_room<'a>(&'a self, room: &'a Room) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            if self.fail_remaining.load(Ordering::SeqCst) > 0 {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(SyncError::Transient("connection reset".into()));
            }
            self.upserts
                .lock()
                .unwrap()
                .push((room.name.clone(), room.revision));
            Ok(())
        }
        .boxed()
    }

    fn delete_room<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            self.deletes.lock().unwrap().push(name.to_string());
            Ok(())
        }
        .boxed()
    }

    fn export(&self) -> BoxFuture<'_, Result<Vec<ExternalRoom>, SyncError>> {
        async move { Ok(self.export_rooms.lock().unwrap().clone()) }.boxed()
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Arc<Database>,
    catalog: Catalog,
    coordinator: SyncCoordinator,
    surface: Arc<FakeSurface>,
    external: Arc<FakeExternal>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("atlas.db")).unwrap());
    let catalog = Catalog::new(Arc::clone(&db));
    let surface = Arc::new(FakeSurface::default());
    let external = Arc::new(FakeExternal::default());
    let coordinator = SyncCoordinator::new(
        Arc::clone(&db),
        Arc::clone(&surface) as Arc<dyn DisplaySurface>,
        Some(Arc::clone(&external) as Arc<dyn ExternalCatalog>),
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        },
    );
    Harness {
        _dir: dir,
        db,
        catalog,
        coordinator,
        surface,
        external,
    }
}

fn draft(name: &str) -> RoomDraft {
    RoomDraft {
        name: name.to_string(),
        room_type: RoomType::Balancer,
        description: "A compact 4-to-4 balancer design".to_string(),
        tags: vec![],
        image_urls: (0..4).map(|i| format!("https://img.example/{i}.png")).collect(),
        ss: false,
        pss: false,
    }
}

#[tokio::test]
async fn fan_out_renders_every_deployment() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();
    h.catalog.register_deployment(2, "http://dep2.local".into()).await.unwrap();

    let room = h.catalog.document(draft("Compact Belt Balancer"), 100, None).await.unwrap();
    h.coordinator.sync_room_now(room.id, room.revision).await;

    let renders = h.surface.renders();
    assert_eq!(renders.len(), 2);
    assert!(renders.iter().any(|(dep, _, _)| *dep == 1));
    assert!(renders.iter().any(|(dep, _, _)| *dep == 2));

    for dep in [1, 2] {
        let entry = queries::replica_entry(&h.db, dep, room.id).unwrap().unwrap();
        assert_eq!(entry.applied_revision, 1);
        assert!(entry.message_id.is_some());
    }

    assert_eq!(h.external.upserts(), vec![("Compact Belt Balancer".to_string(), 1)]);
}

#[tokio::test]
async fn stale_rebuild_after_newer_one_is_a_noop() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();

    h.catalog.document(draft("Loop"), 100, None).await.unwrap();
    let room = h.catalog.set_description("Loop", "v2".into(), 100).await.unwrap();
    assert_eq!(room.revision, 2);

    h.coordinator.sync_room_now(room.id, 2).await;
    assert_eq!(h.surface.renders().len(), 1);

    // A stalled task for the older revision arrives late.
    h.coordinator.sync_room_now(room.id, 1).await;

    let renders = h.surface.renders();
    assert_eq!(renders.len(), 1, "stale rebuild must not re-render");
    assert_eq!(renders[0].2, 2);
    let entry = queries::replica_entry(&h.db, 1, room.id).unwrap().unwrap();
    assert_eq!(entry.applied_revision, 2);
}

#[tokio::test]
async fn one_failing_deployment_does_not_block_the_rest() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();
    h.catalog.register_deployment(2, "http://dep2.local".into()).await.unwrap();
    h.surface.fail_deployment(1);

    let room = h.catalog.document(draft("Resilient"), 100, None).await.unwrap();
    h.coordinator.sync_room_now(room.id, room.revision).await;

    let renders = h.surface.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].0, 2);

    // The failed pair is left rebuild-pending, not half-rendered.
    let entry = queries::replica_entry(&h.db, 1, room.id).unwrap().unwrap();
    assert_eq!(entry.applied_revision, 0);
    assert!(entry.message_id.is_none());

    // Next trigger heals it; the healthy pair is already current.
    h.surface.heal_deployment(1);
    h.coordinator.sync_room_now(room.id, room.revision).await;
    let renders = h.surface.renders();
    assert_eq!(renders.len(), 2);
    assert!(renders.iter().any(|(dep, _, _)| *dep == 1));
}

#[tokio::test]
async fn external_exhaustion_marks_sync_pending_and_retry_clears_it() {
    let h = harness();
    let room = h.catalog.document(draft("Flaky Link"), 100, None).await.unwrap();

    h.external.fail_remaining.store(10, Ordering::SeqCst);
    h.coordinator.sync_room_now(room.id, room.revision).await;

    let pending = queries::list_sync_pending(&h.db).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "Flaky Link");
    assert!(h.external.upserts().is_empty());

    // Network recovers; the next trigger drains the pending set.
    h.external.fail_remaining.store(0, Ordering::SeqCst);
    h.coordinator.retry_pending().await;

    assert!(queries::list_sync_pending(&h.db).unwrap().is_empty());
    assert_eq!(h.external.upserts(), vec![("Flaky Link".to_string(), 1)]);
}

#[tokio::test]
async fn delete_takes_down_messages_and_external_copy() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();

    let room = h.catalog.document(draft("Doomed"), 100, None).await.unwrap();
    h.coordinator.sync_room_now(room.id, room.revision).await;
    let entry = queries::replica_entry(&h.db, 1, room.id).unwrap().unwrap();
    let message_id = entry.message_id.unwrap();

    let (deleted, entries) = h.catalog.delete("Doomed").await.unwrap();
    assert!(queries::replica_entry(&h.db, 1, room.id).unwrap().is_none());

    h.coordinator.delete_room_now(deleted, entries).await;
    assert!(h.surface.removals().contains(&(1, message_id)));
    assert_eq!(h.external.deletes(), vec!["Doomed".to_string()]);
}

#[tokio::test]
async fn rename_invalidates_and_rerenders_under_new_name() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();

    let room = h.catalog.document(draft("Old Name"), 100, None).await.unwrap();
    h.coordinator.sync_room_now(room.id, room.revision).await;

    let renamed = h.catalog.rename("Old Name", "New Name", 200).await.unwrap();
    h.coordinator
        .rename_room_now(renamed.id, renamed.revision, "Old Name".to_string())
        .await;

    let renders = h.surface.renders();
    assert_eq!(renders.last().unwrap().1, "New Name");
    assert!(h.external.deletes().contains(&"Old Name".to_string()));
    assert!(h.external.upserts().iter().any(|(name, rev)| name == "New Name" && *rev == 2));
}

#[tokio::test]
async fn cancelled_reset_leaves_entries_invalidated_not_partial() {
    let h = harness();
    h.catalog.register_deployment(1, "http://dep1.local".into()).await.unwrap();
    let a = h.catalog.document(draft("Room A"), 100, None).await.unwrap();
    let b = h.catalog.document(draft("Room B"), 100, None).await.unwrap();
    h.coordinator.sync_room_now(a.id, 1).await;
    h.coordinator.sync_room_now(b.id, 1).await;
    let baseline = h.surface.renders().len();

    let token = CancellationToken::new();
    token.cancel();
    h.coordinator.run_global_reset(None, token).await;

    // No renders happened, but every entry is in recoverable
    // rebuild-pending state.
    assert_eq!(h.surface.renders().len(), baseline);
    for room in [&a, &b] {
        let entry = queries::replica_entry(&h.db, 1, room.id).unwrap().unwrap();
        assert_eq!(entry.applied_revision, 0);
    }

    // A fresh reset reconciles without manual intervention.
    h.coordinator.run_global_reset(None, CancellationToken::new()).await;
    assert_eq!(h.surface.renders().len(), baseline + 2);
    for room in [&a, &b] {
        let entry = queries::replica_entry(&h.db, 1, room.id).unwrap().unwrap();
        assert_eq!(entry.applied_revision, 1);
    }
}

#[tokio::test]
async fn reconcile_pulls_pushes_and_respects_local_wins() {
    let h = harness();

    // Local-only room: should be pushed.
    h.catalog.document(draft("Local Only"), 100, None).await.unwrap();

    // Shared room where local is newer: external copy must lose.
    let shared = h.catalog.document(draft("Shared"), 100, None).await.unwrap();

    let export = vec![
        ExternalRoom {
            room_name: "Remote Only".to_string(),
            description: "documented elsewhere".to_string(),
            images: (0..4).map(|i| format!("https://ext.example/{i}.png")).collect(),
            documented_by: 900,
            tags: vec!["imported".to_string()],
            roomtype: "storage".to_string(),
            ss: false,
            pss: false,
            last_edited: Some(Utc::now()),
            last_edited_by: None,
            revision: None,
        },
        ExternalRoom {
            room_name: "Shared".to_string(),
            description: "stale remote copy".to_string(),
            images: (0..4).map(|i| format!("https://ext.example/s{i}.png")).collect(),
            documented_by: 900,
            tags: vec![],
            roomtype: "balancer".to_string(),
            ss: false,
            pss: false,
            last_edited: Some(shared.updated_at - ChronoDuration::hours(1)),
            last_edited_by: None,
            revision: None,
        },
    ];
    *h.external.export_rooms.lock().unwrap() = export;

    let summary = reconcile(&h.catalog, h.external.as_ref(), &h.coordinator)
        .await
        .unwrap();

    assert_eq!(summary.pulled, 1);
    assert_eq!(summary.pushed, 2);

    let pulled = h.catalog.get("Remote Only").await.unwrap().unwrap();
    assert_eq!(pulled.created_by, 900);
    assert_eq!(pulled.tags, vec!["imported"]);

    // The stale remote copy did not clobber the local one.
    let local = h.catalog.get("Shared").await.unwrap().unwrap();
    assert_eq!(local.description, "A compact 4-to-4 balancer design");

    let upserts = h.external.upserts();
    assert!(upserts.iter().any(|(name, _)| name == "Local Only"));
    assert!(upserts.iter().any(|(name, _)| name == "Shared"));
}
