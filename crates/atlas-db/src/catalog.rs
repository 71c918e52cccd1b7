//! The catalog store: the single component allowed to write room, edit
//! history, and bug report records.
//!
//! Every mutation serializes per room key (lowercased name) through
//! [`KeyedLocks`], so a second writer always observes the first writer's
//! committed revision. Reads never take the key lock. The blocking rusqlite
//! work runs on the tokio blocking pool.

use std::sync::Arc;

use atlas_types::error::CatalogError;
use atlas_types::models::{
    BugReport, Deployment, ImportedRoom, ReplicaEntry, ReportStatus, Room, RoomDraft, RoomType,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::lock::KeyedLocks;
use crate::{Database, queries};

#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
    locks: Arc<KeyedLocks<String>>,
}

impl Catalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Database) -> Result<T, CatalogError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| CatalogError::Fatal(format!("blocking task failed: {e}")))?
    }

    // -- Reads --

    /// Case-insensitive lookup by room name.
    pub async fn get(&self, name: &str) -> Result<Option<Room>, CatalogError> {
        let name = name.to_string();
        self.run_blocking(move |db| queries::get_room(db, &name)).await
    }

    pub async fn list(&self) -> Result<Vec<Room>, CatalogError> {
        self.run_blocking(queries::list_rooms).await
    }

    pub async fn history(&self, room_id: Uuid) -> Result<Vec<atlas_types::models::EditHistoryEntry>, CatalogError> {
        self.run_blocking(move |db| queries::room_history(db, room_id)).await
    }

    // -- Room mutations --

    /// Document a brand-new room at revision 1.
    pub async fn document(
        &self,
        draft: RoomDraft,
        documented_by: i64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Room, CatalogError> {
        check_image_count(&draft.image_urls)?;
        let _guard = self.locks.acquire(draft.name.to_lowercase()).await;
        let now = timestamp.unwrap_or_else(Utc::now);
        self.run_blocking(move |db| {
            let room = Room {
                id: Uuid::new_v4(),
                name: draft.name,
                room_type: draft.room_type,
                description: draft.description,
                tags: draft.tags,
                image_urls: draft.image_urls,
                ss: draft.ss,
                pss: draft.pss,
                created_by: documented_by,
                edited_by: None,
                created_at: now,
                updated_at: now,
                revision: 1,
            };
            queries::insert_room(db, &room, documented_by)?;
            Ok(room)
        })
        .await
    }

    /// Full replace of an existing room's documentation. The image list is
    /// replaced wholesale; the original documenter is retained.
    pub async fn redocument(
        &self,
        draft: RoomDraft,
        edited_by: i64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Room, CatalogError> {
        check_image_count(&draft.image_urls)?;
        let _guard = self.locks.acquire(draft.name.to_lowercase()).await;
        let now = timestamp.unwrap_or_else(Utc::now);
        self.run_blocking(move |db| {
            let before = queries::get_room(db, &draft.name)?.ok_or_else(|| {
                CatalogError::not_found(format!("Room '{}' does not exist", draft.name))
            })?;
            let mut after = before.clone();
            after.room_type = draft.room_type;
            after.description = draft.description;
            after.tags = draft.tags;
            after.image_urls = draft.image_urls;
            after.ss = draft.ss;
            after.pss = draft.pss;
            after.edited_by = Some(edited_by);
            after.updated_at = now;
            after.revision += 1;
            queries::update_room(db, &before, &after, edited_by)?;
            Ok(after)
        })
        .await
    }

    pub async fn set_room_type(
        &self,
        name: &str,
        room_type: RoomType,
        edited_by: i64,
    ) -> Result<Room, CatalogError> {
        self.mutate(name, edited_by, move |room| room.room_type = room_type)
            .await
    }

    /// Merge new tags into the existing ordered set, keeping first-seen
    /// order and dropping duplicates.
    pub async fn set_tags(
        &self,
        name: &str,
        tags: Vec<String>,
        edited_by: i64,
    ) -> Result<Room, CatalogError> {
        self.mutate(name, edited_by, move |room| {
            for tag in tags {
                if !room.tags.contains(&tag) {
                    room.tags.push(tag);
                }
            }
        })
        .await
    }

    pub async fn set_description(
        &self,
        name: &str,
        description: String,
        edited_by: i64,
    ) -> Result<Room, CatalogError> {
        self.mutate(name, edited_by, move |room| room.description = description)
            .await
    }

    /// Rename a room, carrying its history forward. Fails `Conflict` when
    /// the target name is taken; the source room is left untouched.
    pub async fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        edited_by: i64,
    ) -> Result<Room, CatalogError> {
        // Lock both keys in sorted order so two crossing renames cannot
        // deadlock.
        let old_key = old_name.to_lowercase();
        let new_key = new_name.to_lowercase();
        let _guards = if old_key == new_key {
            (self.locks.acquire(old_key).await, None)
        } else if old_key < new_key {
            let a = self.locks.acquire(old_key).await;
            let b = self.locks.acquire(new_key).await;
            (a, Some(b))
        } else {
            let b = self.locks.acquire(new_key).await;
            let a = self.locks.acquire(old_key).await;
            (a, Some(b))
        };

        let old_name = old_name.to_string();
        let new_name = new_name.to_string();
        self.run_blocking(move |db| {
            let before = queries::get_room(db, &old_name)?.ok_or_else(|| {
                CatalogError::not_found(format!("Room '{old_name}' does not exist"))
            })?;
            let mut after = before.clone();
            after.name = new_name;
            after.edited_by = Some(edited_by);
            after.updated_at = Utc::now();
            after.revision += 1;
            queries::update_room(db, &before, &after, edited_by)?;
            Ok(after)
        })
        .await
    }

    /// Delete a room and its history. Returns the deleted room plus its
    /// replica entries so the coordinator can take down rendered messages.
    pub async fn delete(&self, name: &str) -> Result<(Room, Vec<ReplicaEntry>), CatalogError> {
        let _guard = self.locks.acquire(name.to_lowercase()).await;
        let name = name.to_string();
        self.run_blocking(move |db| queries::delete_room(db, &name)).await
    }

    /// Upsert a room from the external system of record.
    ///
    /// Local writes win: if the local copy is at least as new as the
    /// imported one, the import is rejected with `Conflict` and the caller
    /// retries after the next reconcile. An accepted import is a normal
    /// mutation — one history entry, revision + 1.
    pub async fn import(&self, imported: ImportedRoom) -> Result<Room, CatalogError> {
        check_image_count(&imported.draft.image_urls)?;
        let _guard = self.locks.acquire(imported.draft.name.to_lowercase()).await;
        self.run_blocking(move |db| {
            let editor = imported.edited_by.unwrap_or(imported.documented_by);
            match queries::get_room(db, &imported.draft.name)? {
                Some(before) => {
                    if before.updated_at >= imported.updated_at {
                        return Err(CatalogError::conflict(format!(
                            "Local copy of '{}' is newer",
                            before.name
                        )));
                    }
                    let mut after = before.clone();
                    after.room_type = imported.draft.room_type;
                    after.description = imported.draft.description;
                    after.tags = imported.draft.tags;
                    after.image_urls = imported.draft.image_urls;
                    after.ss = imported.draft.ss;
                    after.pss = imported.draft.pss;
                    after.edited_by = Some(editor);
                    after.updated_at = imported.updated_at;
                    after.revision += 1;
                    queries::update_room(db, &before, &after, editor)?;
                    Ok(after)
                }
                None => {
                    let room = Room {
                        id: Uuid::new_v4(),
                        name: imported.draft.name,
                        room_type: imported.draft.room_type,
                        description: imported.draft.description,
                        tags: imported.draft.tags,
                        image_urls: imported.draft.image_urls,
                        ss: imported.draft.ss,
                        pss: imported.draft.pss,
                        created_by: imported.documented_by,
                        edited_by: imported.edited_by,
                        created_at: imported.updated_at,
                        updated_at: imported.updated_at,
                        revision: 1,
                    };
                    queries::insert_room(db, &room, editor)?;
                    Ok(room)
                }
            }
        })
        .await
    }

    async fn mutate<F>(&self, name: &str, edited_by: i64, f: F) -> Result<Room, CatalogError>
    where
        F: FnOnce(&mut Room) + Send + 'static,
    {
        let _guard = self.locks.acquire(name.to_lowercase()).await;
        let name = name.to_string();
        self.run_blocking(move |db| {
            let before = queries::get_room(db, &name)?
                .ok_or_else(|| CatalogError::not_found(format!("Room '{name}' does not exist")))?;
            let mut after = before.clone();
            f(&mut after);
            after.edited_by = Some(edited_by);
            after.updated_at = Utc::now();
            after.revision += 1;
            queries::update_room(db, &before, &after, edited_by)?;
            Ok(after)
        })
        .await
    }

    // -- Bug reports --

    pub async fn report_bug(
        &self,
        room_name: &str,
        reporter: i64,
        description: String,
    ) -> Result<i64, CatalogError> {
        let room_name = room_name.to_string();
        self.run_blocking(move |db| {
            let room = queries::get_room(db, &room_name)?.ok_or_else(|| {
                CatalogError::not_found(format!("Room '{room_name}' does not exist"))
            })?;
            // Reports keep the canonical stored spelling of the name.
            queries::insert_report(db, &room.name, reporter, &description, Utc::now())
        })
        .await
    }

    pub async fn bug_reports(
        &self,
        room_name: Option<String>,
        include_resolved: bool,
    ) -> Result<Vec<BugReport>, CatalogError> {
        self.run_blocking(move |db| {
            queries::list_reports(db, room_name.as_deref(), include_resolved)
        })
        .await
    }

    pub async fn get_report(&self, id: i64) -> Result<Option<BugReport>, CatalogError> {
        self.run_blocking(move |db| queries::get_report(db, id)).await
    }

    pub async fn resolve_report(&self, id: i64, resolved_by: i64) -> Result<(), CatalogError> {
        self.run_blocking(move |db| queries::close_report(db, id, ReportStatus::Resolved, resolved_by))
            .await
    }

    pub async fn delete_report(&self, id: i64, deleted_by: i64) -> Result<(), CatalogError> {
        self.run_blocking(move |db| queries::close_report(db, id, ReportStatus::Deleted, deleted_by))
            .await
    }

    // -- Deployments --

    pub async fn register_deployment(
        &self,
        id: i64,
        display_url: String,
    ) -> Result<(), CatalogError> {
        self.run_blocking(move |db| queries::upsert_deployment(db, id, &display_url, Utc::now()))
            .await
    }

    pub async fn remove_deployment(&self, id: i64) -> Result<(), CatalogError> {
        self.run_blocking(move |db| queries::remove_deployment(db, id)).await
    }

    pub async fn deployments(&self) -> Result<Vec<Deployment>, CatalogError> {
        self.run_blocking(queries::list_deployments).await
    }
}

/// The HTTP layer validates image counts before calling in; a violation
/// here means a caller skipped validation.
fn check_image_count(image_urls: &[String]) -> Result<(), CatalogError> {
    if !(4..=10).contains(&image_urls.len()) {
        return Err(CatalogError::Fatal(format!(
            "image list length {} outside [4, 10]",
            image_urls.len()
        )));
    }
    Ok(())
}
