//! Periodic bidirectional reconcile with the external system of record.
//!
//! A two-node replication with no true conflict resolution: both sides are
//! diffed by last-update time, the newer copy wins, and the local catalog
//! wins ties. Convergence is eventual — each cycle closes whatever gap the
//! per-mutation pushes left behind.

use std::time::Duration;

use atlas_db::catalog::Catalog;
use atlas_types::error::CatalogError;
use chrono::Utc;
use tracing::{info, warn};

use crate::coordinator::SyncCoordinator;
use crate::{ExternalCatalog, SyncError};

const MIN_PUSH_IMAGES: usize = 4;

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub pushed: usize,
    pub pulled: usize,
    pub skipped: usize,
}

pub async fn reconcile(
    catalog: &Catalog,
    external: &dyn ExternalCatalog,
    coordinator: &SyncCoordinator,
) -> Result<ReconcileSummary, SyncError> {
    let remote = external.export().await?;
    let local = catalog
        .list()
        .await
        .map_err(|e| SyncError::Transient(e.to_string()))?;

    let mut summary = ReconcileSummary::default();
    let remote_by_name: std::collections::HashMap<String, &crate::ExternalRoom> = remote
        .iter()
        .map(|r| (r.room_name.to_lowercase(), r))
        .collect();

    // Pull: rooms missing locally or newer externally.
    let now = Utc::now();
    for ext in &remote {
        let key = ext.room_name.to_lowercase();
        let local_room = local.iter().find(|r| r.name.to_lowercase() == key);
        let pull = match local_room {
            None => true,
            Some(local_room) => ext.last_edited.is_some_and(|ts| ts > local_room.updated_at),
        };
        if !pull {
            continue;
        }

        let imported = ext.clone().into_imported(now);
        if imported.draft.image_urls.len() < MIN_PUSH_IMAGES {
            warn!(
                "Skipping pull of '{}': only {} usable image URLs",
                imported.draft.name,
                imported.draft.image_urls.len()
            );
            summary.skipped += 1;
            continue;
        }

        match catalog.import(imported).await {
            Ok(room) => {
                summary.pulled += 1;
                // The displays now lag the imported copy.
                coordinator.sync_room_now(room.id, room.revision).await;
            }
            Err(CatalogError::Conflict(e)) => {
                // A local write landed while we were reconciling; local wins.
                info!("Pull of '{}' lost to a local write: {}", ext.room_name, e);
                summary.skipped += 1;
            }
            Err(e) => {
                warn!("Pull of '{}' failed: {}", ext.room_name, e);
                summary.skipped += 1;
            }
        }
    }

    // Push: rooms missing externally or newer locally.
    for room in &local {
        let key = room.name.to_lowercase();
        let push = match remote_by_name.get(&key) {
            None => true,
            Some(ext) => ext.last_edited.is_none_or(|ts| room.updated_at > ts),
        };
        if !push {
            continue;
        }

        let usable = room
            .image_urls
            .iter()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .count();
        if usable < MIN_PUSH_IMAGES {
            warn!(
                "Skipping push of '{}': only {} usable image URLs (need {})",
                room.name, usable, MIN_PUSH_IMAGES
            );
            summary.skipped += 1;
            continue;
        }

        coordinator.push_external_now(room.id).await;
        summary.pushed += 1;
    }

    info!(
        "Reconcile complete: {} pushed, {} pulled, {} skipped",
        summary.pushed, summary.pulled, summary.skipped
    );
    Ok(summary)
}

/// Background loop: retry pending pushes, then run a full reconcile.
pub async fn run_reconcile_loop(
    catalog: Catalog,
    coordinator: SyncCoordinator,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        coordinator.retry_pending().await;

        let Some(external) = coordinator.external() else {
            continue;
        };
        if let Err(e) = reconcile(&catalog, external.as_ref(), &coordinator).await {
            warn!("Reconcile cycle failed: {}", e);
        }
    }
}
