//! Fan-out of catalog mutations to replica displays and the external
//! system of record.
//!
//! Every mutation is durable in the catalog before any work here starts,
//! so a crashed or failed fan-out loses nothing: the next trigger
//! reconciles from stored replica state.

use std::sync::Arc;
use std::time::Duration;

use atlas_db::lock::KeyedLocks;
use atlas_db::{Database, queries};
use atlas_types::error::CatalogError;
use atlas_types::events::CatalogEvent;
use atlas_types::models::{Deployment, ReplicaEntry, Room};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{DisplaySurface, ExternalCatalog, SyncError};

/// Bounded exponential backoff for outbound external calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    db: Arc<Database>,
    surface: Arc<dyn DisplaySurface>,
    external: Option<Arc<dyn ExternalCatalog>>,
    retry: RetryPolicy,
    /// Rebuilds for the same (deployment, room) pair apply in sequence so
    /// a stalled older task can never overwrite a newer render.
    pair_locks: KeyedLocks<(i64, Uuid)>,
    /// At most one bulk reset runs at a time; a new one cancels the old.
    bulk: tokio::sync::Mutex<Option<CancellationToken>>,
}

impl SyncCoordinator {
    pub fn new(
        db: Arc<Database>,
        surface: Arc<dyn DisplaySurface>,
        external: Option<Arc<dyn ExternalCatalog>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                surface,
                external,
                retry,
                pair_locks: KeyedLocks::new(),
                bulk: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn external(&self) -> Option<Arc<dyn ExternalCatalog>> {
        self.inner.external.clone()
    }

    // -- Triggers (fire-and-forget, called after a mutation commits) --

    /// Dispatch one change notification. Bulk resets go through
    /// [`SyncCoordinator::global_reset`] so the caller can hold the
    /// cancellation token.
    pub fn notify(&self, event: CatalogEvent) {
        match event {
            CatalogEvent::RoomUpserted { room_id, revision } => {
                self.room_changed(room_id, revision);
            }
            CatalogEvent::RoomRenamed {
                room_id,
                revision,
                old_name,
            } => {
                self.room_renamed(room_id, revision, old_name);
            }
            CatalogEvent::RoomDeleted { room, entries } => {
                self.room_deleted(room, entries);
            }
            CatalogEvent::GlobalReset { deployment_id } => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.global_reset(deployment_id).await;
                });
            }
        }
    }

    pub fn room_changed(&self, room_id: Uuid, revision: i64) {
        let this = self.clone();
        tokio::spawn(async move {
            this.sync_room_now(room_id, revision).await;
        });
    }

    pub fn room_renamed(&self, room_id: Uuid, revision: i64, old_name: String) {
        let this = self.clone();
        tokio::spawn(async move {
            this.rename_room_now(room_id, revision, old_name).await;
        });
    }

    pub fn room_deleted(&self, room: Room, entries: Vec<ReplicaEntry>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.delete_room_now(room, entries).await;
        });
    }

    /// Invalidate and re-render the whole catalog, for one deployment or
    /// all of them. Returns the token cancelling the run.
    pub async fn global_reset(&self, deployment_id: Option<i64>) -> CancellationToken {
        let token = CancellationToken::new();
        {
            let mut bulk = self.inner.bulk.lock().await;
            if let Some(previous) = bulk.take() {
                previous.cancel();
            }
            *bulk = Some(token.clone());
        }
        let this = self.clone();
        let run_token = token.clone();
        tokio::spawn(async move {
            this.run_global_reset(deployment_id, run_token).await;
        });
        token
    }

    // -- Awaitable units of work --

    /// Rebuild every deployment's rendering of one room, then push it to
    /// the external system. One failing pair never blocks the rest.
    pub async fn sync_room_now(&self, room_id: Uuid, revision: i64) {
        let deployments = match block(&self.inner.db, queries::list_deployments).await {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!("Fan-out for room {} could not list deployments: {}", room_id, e);
                return;
            }
        };

        let mut handles = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                this.rebuild_pair(&deployment, room_id, revision).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        self.push_external_now(room_id).await;
    }

    pub async fn rename_room_now(&self, room_id: Uuid, revision: i64, old_name: String) {
        if let Err(e) = block(&self.inner.db, move |db| {
            queries::invalidate_room_entries(db, room_id)
        })
        .await
        {
            warn!("Could not invalidate entries for renamed room {}: {}", room_id, e);
        }

        // The external catalog is keyed by name, so the old record has to go.
        if let Some(external) = &self.inner.external {
            if let Err(e) = self
                .with_retry(|| external.delete_room(&old_name))
                .await
            {
                warn!("External delete of old name '{}' failed: {}", old_name, e);
            }
        }

        self.sync_room_now(room_id, revision).await;
    }

    pub async fn delete_room_now(&self, room: Room, entries: Vec<ReplicaEntry>) {
        let deployments = match block(&self.inner.db, queries::list_deployments).await {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!("Takedown for room '{}' could not list deployments: {}", room.name, e);
                Vec::new()
            }
        };

        for entry in entries {
            let Some(message_id) = entry.message_id else {
                continue;
            };
            let Some(deployment) = deployments.iter().find(|d| d.id == entry.deployment_id)
            else {
                continue;
            };
            if let Err(e) = self.inner.surface.remove(deployment, message_id).await {
                // The entry is already gone from storage; the display will
                // also be cleaned by the deployment's next channel rebuild.
                warn!(
                    "Could not remove message {} for deleted room '{}' in deployment {}: {}",
                    message_id, room.name, entry.deployment_id, e
                );
            }
        }

        if let Some(external) = &self.inner.external {
            if let Err(e) = self.with_retry(|| external.delete_room(&room.name)).await {
                error!(
                    "External delete of room '{}' failed after retries: {}",
                    room.name, e
                );
            }
        }
    }

    /// Walk the catalog and rebuild every (room, deployment) pair in
    /// scope. Entries are invalidated up front, so cancellation leaves
    /// rebuild-pending state, never a half-rendered one.
    pub async fn run_global_reset(&self, deployment_id: Option<i64>, token: CancellationToken) {
        if let Err(e) = block(&self.inner.db, move |db| {
            queries::invalidate_deployment_entries(db, deployment_id)
        })
        .await
        {
            warn!("Global reset could not invalidate entries: {}", e);
            return;
        }

        let deployments = match block(&self.inner.db, queries::list_deployments).await {
            Ok(deployments) => deployments
                .into_iter()
                .filter(|d| deployment_id.is_none_or(|id| d.id == id))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("Global reset could not list deployments: {}", e);
                return;
            }
        };
        let rooms = match block(&self.inner.db, queries::list_rooms).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!("Global reset could not list rooms: {}", e);
                return;
            }
        };

        info!(
            "Global reset: {} rooms across {} deployment(s)",
            rooms.len(),
            deployments.len()
        );

        let mut handles = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let this = self.clone();
            let rooms = rooms.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                for room in rooms {
                    if token.is_cancelled() {
                        info!("Global reset cancelled for deployment {}", deployment.id);
                        return;
                    }
                    this.rebuild_pair(&deployment, room.id, room.revision).await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Rebuild one (deployment, room) pair. Idempotent: re-running for a
    /// revision the replica already carries is a no-op, and an older task
    /// arriving after a newer one is discarded.
    pub async fn rebuild_pair(&self, deployment: &Deployment, room_id: Uuid, revision: i64) {
        let _guard = self
            .inner
            .pair_locks
            .acquire((deployment.id, room_id))
            .await;

        let deployment_id = deployment.id;
        let entry = match block(&self.inner.db, move |db| {
            queries::replica_entry(db, deployment_id, room_id)
        })
        .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Rebuild ({}, {}) could not read entry: {}", deployment_id, room_id, e);
                return;
            }
        };

        if let Some(entry) = &entry {
            if entry.applied_revision >= revision {
                debug!(
                    "Rebuild ({}, {}) skipped: replica at revision {} >= {}",
                    deployment_id, room_id, entry.applied_revision, revision
                );
                return;
            }
        }

        let room = match block(&self.inner.db, move |db| queries::get_room_by_id(db, room_id)).await
        {
            Ok(Some(room)) => room,
            Ok(None) => {
                debug!("Rebuild ({}, {}) skipped: room is gone", deployment_id, room_id);
                return;
            }
            Err(e) => {
                warn!("Rebuild ({}, {}) could not read room: {}", deployment_id, room_id, e);
                return;
            }
        };

        // Take the stale message down first so the channel never shows two
        // renderings of one room.
        if let Some(message_id) = entry.as_ref().and_then(|e| e.message_id) {
            if let Err(e) = self.inner.surface.remove(deployment, message_id).await {
                debug!(
                    "Stale message {} removal failed in deployment {}: {}",
                    message_id, deployment_id, e
                );
            }
        }

        match self.inner.surface.render(deployment, &room).await {
            Ok(message_id) => {
                let applied = room.revision;
                if let Err(e) = block(&self.inner.db, move |db| {
                    queries::record_render(db, deployment_id, room_id, message_id, applied)
                })
                .await
                {
                    warn!("Rebuild ({}, {}) could not record render: {}", deployment_id, room_id, e);
                }
            }
            Err(e) => {
                warn!(
                    "Render of '{}' failed in deployment {} (retried on next sync): {}",
                    room.name, deployment_id, e
                );
                if let Err(e) = block(&self.inner.db, move |db| {
                    queries::clear_entry(db, deployment_id, room_id)
                })
                .await
                {
                    warn!("Rebuild ({}, {}) could not clear entry: {}", deployment_id, room_id, e);
                }
            }
        }
    }

    /// Push one room to the external system with bounded backoff. After
    /// the last attempt the room is marked sync-pending and left for the
    /// next trigger — the local catalog is never rolled back.
    pub async fn push_external_now(&self, room_id: Uuid) {
        let Some(external) = &self.inner.external else {
            return;
        };

        let room = match block(&self.inner.db, move |db| queries::get_room_by_id(db, room_id)).await
        {
            Ok(Some(room)) => room,
            Ok(None) => return,
            Err(e) => {
                warn!("External push could not read room {}: {}", room_id, e);
                return;
            }
        };

        match self.with_retry(|| external.upsert_room(&room)).await {
            Ok(()) => {
                if let Err(e) =
                    block(&self.inner.db, move |db| queries::set_sync_pending(db, room_id, false))
                        .await
                {
                    warn!("Could not clear sync-pending on '{}': {}", room.name, e);
                }
            }
            Err(SyncError::Permanent(e)) => {
                // The remote rejected the payload (e.g. too few usable
                // images); retrying the same revision cannot succeed.
                warn!("External push of '{}' rejected: {}", room.name, e);
            }
            Err(SyncError::Transient(e)) => {
                error!(
                    "External push of '{}' (revision {}) failed after {} attempts: {}",
                    room.name, room.revision, self.inner.retry.attempts, e
                );
                if let Err(e) =
                    block(&self.inner.db, move |db| queries::set_sync_pending(db, room_id, true))
                        .await
                {
                    warn!("Could not mark '{}' sync-pending: {}", room.name, e);
                }
            }
        }
    }

    /// Re-push every room whose last external sync never confirmed.
    pub async fn retry_pending(&self) {
        let pending = match block(&self.inner.db, queries::list_sync_pending).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Could not list sync-pending rooms: {}", e);
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        info!("Retrying external sync for {} pending room(s)", pending.len());
        for room in pending {
            self.push_external_now(room.id).await;
        }
    }

    async fn with_retry<'a, F>(&self, mut call: F) -> Result<(), SyncError>
    where
        F: FnMut() -> futures_util::future::BoxFuture<'a, Result<(), SyncError>>,
    {
        let mut delay = self.inner.retry.base_delay;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(()) => return Ok(()),
                Err(SyncError::Permanent(e)) => return Err(SyncError::Permanent(e)),
                Err(SyncError::Transient(e)) => {
                    if attempt >= self.inner.retry.attempts {
                        return Err(SyncError::Transient(e));
                    }
                    debug!("Attempt {} failed, retrying in {:?}: {}", attempt, delay, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

async fn block<T, F>(db: &Arc<Database>, f: F) -> Result<T, CatalogError>
where
    F: FnOnce(&Database) -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| CatalogError::Fatal(format!("blocking task failed: {e}")))?
}
