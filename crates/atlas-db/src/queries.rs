use atlas_types::error::CatalogError;
use atlas_types::models::{
    BugReport, Deployment, EditHistoryEntry, EncounterEvent, FieldChange, ReplicaEntry,
    ReportStatus, Room,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{DeploymentRow, EncounterRow, ReplicaRow, ReportRow, RoomRow, SessionRow};
use crate::{Database, db_err};

type DbResult<T> = Result<T, CatalogError>;

/// Timestamps are stored as fixed-width RFC 3339 so that string comparison
/// in SQL orders them correctly.
pub fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const ROOM_COLS: &str = "id, name, room_type, description, tags, image_urls, ss, pss, \
     created_by, edited_by, created_at, updated_at, revision";

fn room_row(row: &rusqlite::Row) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        room_type: row.get(2)?,
        description: row.get(3)?,
        tags: row.get(4)?,
        image_urls: row.get(5)?,
        ss: row.get(6)?,
        pss: row.get(7)?,
        created_by: row.get(8)?,
        edited_by: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        revision: row.get(12)?,
    })
}

// -- Rooms --

pub fn get_room(db: &Database, name: &str) -> DbResult<Option<Room>> {
    db.with_conn(|conn| query_room_by_name(conn, name))
}

pub fn get_room_by_id(db: &Database, id: Uuid) -> DbResult<Option<Room>> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {ROOM_COLS} FROM rooms WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let row = stmt
            .query_row([id.to_string()], room_row)
            .optional()
            .map_err(db_err)?;
        Ok(row.map(RoomRow::into_room))
    })
}

pub fn list_rooms(db: &Database) -> DbResult<Vec<Room>> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {ROOM_COLS} FROM rooms ORDER BY updated_at");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], room_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(RoomRow::into_room).collect())
    })
}

pub fn query_room_by_name(conn: &Connection, name: &str) -> DbResult<Option<Room>> {
    let sql = format!("SELECT {ROOM_COLS} FROM rooms WHERE LOWER(name) = LOWER(?1)");
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let row = stmt.query_row([name], room_row).optional().map_err(db_err)?;
    Ok(row.map(RoomRow::into_room))
}

/// Create a room together with its first history entry. Fails `Conflict`
/// if the name is already taken (case-insensitive).
pub fn insert_room(db: &Database, room: &Room, editor: i64) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        if query_room_by_name(&tx, &room.name)?.is_some() {
            return Err(CatalogError::conflict(format!(
                "Room '{}' is already documented",
                room.name
            )));
        }
        persist_room(&tx, None, room, editor)?;
        tx.commit().map_err(db_err)
    })
}

/// Apply a mutation to an existing room and append its history entry.
///
/// When the name changes, the target name must be free; `Conflict`
/// otherwise.
pub fn update_room(db: &Database, before: &Room, after: &Room, editor: i64) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        if before.name.to_lowercase() != after.name.to_lowercase() {
            if let Some(existing) = query_room_by_name(&tx, &after.name)? {
                if existing.id != before.id {
                    return Err(CatalogError::conflict(format!(
                        "Room '{}' already exists",
                        after.name
                    )));
                }
            }
        }
        persist_room(&tx, Some(before), after, editor)?;
        tx.commit().map_err(db_err)
    })
}

/// Delete a room, its history, and its replica entries. Returns the room
/// and the entries as they stood, so the coordinator can take down the
/// rendered messages.
pub fn delete_room(db: &Database, name: &str) -> DbResult<(Room, Vec<ReplicaEntry>)> {
    db.with_conn_mut(|conn| {
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let room = query_room_by_name(&tx, name)?
            .ok_or_else(|| CatalogError::not_found(format!("Room '{name}' does not exist")))?;
        let entries = query_entries_for_room(&tx, room.id)?;
        tx.execute("DELETE FROM rooms WHERE id = ?1", [room.id.to_string()])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok((room, entries))
    })
}

fn persist_room(
    conn: &Connection,
    before: Option<&Room>,
    after: &Room,
    editor: i64,
) -> DbResult<()> {
    let expected = before.map_or(1, |r| r.revision + 1);
    if after.revision != expected {
        return Err(CatalogError::Fatal(format!(
            "revision regression on room '{}': expected {}, got {}",
            after.name, expected, after.revision
        )));
    }

    match before {
        None => {
            conn.execute(
                "INSERT INTO rooms (id, name, room_type, description, tags, image_urls, ss, pss, \
                 created_by, edited_by, created_at, updated_at, revision) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    after.id.to_string(),
                    after.name,
                    after.room_type.as_str(),
                    after.description,
                    serde_json::to_string(&after.tags).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&after.image_urls).unwrap_or_else(|_| "[]".into()),
                    after.ss,
                    after.pss,
                    after.created_by,
                    after.edited_by,
                    ts(&after.created_at),
                    ts(&after.updated_at),
                    after.revision,
                ],
            )
            .map_err(db_err)?;
        }
        Some(_) => {
            let updated = conn
                .execute(
                    "UPDATE rooms SET name = ?2, room_type = ?3, description = ?4, tags = ?5, \
                     image_urls = ?6, ss = ?7, pss = ?8, edited_by = ?9, updated_at = ?10, \
                     revision = ?11, sync_pending = 0 \
                     WHERE id = ?1 AND revision = ?11 - 1",
                    params![
                        after.id.to_string(),
                        after.name,
                        after.room_type.as_str(),
                        after.description,
                        serde_json::to_string(&after.tags).unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&after.image_urls).unwrap_or_else(|_| "[]".into()),
                        after.ss,
                        after.pss,
                        after.edited_by,
                        ts(&after.updated_at),
                        after.revision,
                    ],
                )
                .map_err(db_err)?;
            // The WHERE clause re-checks the stored revision; a miss means
            // a writer slipped past the per-key lock.
            if updated != 1 {
                return Err(CatalogError::Fatal(format!(
                    "revision regression on room '{}': concurrent write at revision {}",
                    after.name, after.revision
                )));
            }
        }
    }

    conn.execute(
        "INSERT INTO edit_history (room_id, editor, at, revision, changes) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            after.id.to_string(),
            editor,
            ts(&after.updated_at),
            after.revision,
            serde_json::to_string(&diff_fields(before, after)).unwrap_or_else(|_| "[]".into()),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn diff_fields(before: Option<&Room>, after: &Room) -> Vec<FieldChange> {
    fn push(changes: &mut Vec<FieldChange>, field: &str, before: String, after: String) {
        if before != after {
            changes.push(FieldChange {
                field: field.to_string(),
                before,
                after,
            });
        }
    }

    let mut changes = Vec::new();
    let b = |f: fn(&Room) -> String| before.map(f).unwrap_or_default();
    push(&mut changes, "name", b(|r| r.name.clone()), after.name.clone());
    push(
        &mut changes,
        "room_type",
        b(|r| r.room_type.as_str().to_string()),
        after.room_type.as_str().to_string(),
    );
    push(
        &mut changes,
        "description",
        b(|r| r.description.clone()),
        after.description.clone(),
    );
    push(
        &mut changes,
        "tags",
        b(|r| r.tags.join(", ")),
        after.tags.join(", "),
    );
    push(
        &mut changes,
        "image_urls",
        b(|r| r.image_urls.join(", ")),
        after.image_urls.join(", "),
    );
    push(&mut changes, "ss", b(|r| r.ss.to_string()), after.ss.to_string());
    push(&mut changes, "pss", b(|r| r.pss.to_string()), after.pss.to_string());
    changes
}

// -- Edit history --

pub fn room_history(db: &Database, room_id: Uuid) -> DbResult<Vec<EditHistoryEntry>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT room_id, editor, at, revision, changes FROM edit_history \
                 WHERE room_id = ?1 ORDER BY revision",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([room_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(room_id_raw, editor, at, revision, changes)| EditHistoryEntry {
                room_id: room_id_raw.parse().unwrap_or_default(),
                editor,
                at: DateTime::parse_from_rfc3339(&at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
                revision,
                changes: serde_json::from_str(&changes).unwrap_or_default(),
            })
            .collect())
    })
}

// -- Sync-pending sentinel --

pub fn set_sync_pending(db: &Database, room_id: Uuid, pending: bool) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE rooms SET sync_pending = ?2 WHERE id = ?1",
            params![room_id.to_string(), pending],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

pub fn list_sync_pending(db: &Database) -> DbResult<Vec<Room>> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {ROOM_COLS} FROM rooms WHERE sync_pending = 1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], room_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(RoomRow::into_room).collect())
    })
}

// -- Bug reports --

pub fn insert_report(
    db: &Database,
    room_name: &str,
    reporter: i64,
    description: &str,
    at: DateTime<Utc>,
) -> DbResult<i64> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO bug_reports (room_name, reporter, description, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![room_name, reporter, description, ts(&at)],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    })
}

fn report_row(row: &rusqlite::Row) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        room_name: row.get(1)?,
        reporter: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        closed_by: row.get(6)?,
    })
}

const REPORT_COLS: &str = "id, room_name, reporter, description, status, created_at, closed_by";

pub fn get_report(db: &Database, id: i64) -> DbResult<Option<BugReport>> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {REPORT_COLS} FROM bug_reports WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let row = stmt.query_row([id], report_row).optional().map_err(db_err)?;
        Ok(row.map(ReportRow::into_report))
    })
}

pub fn list_reports(
    db: &Database,
    room_name: Option<&str>,
    include_resolved: bool,
) -> DbResult<Vec<BugReport>> {
    db.with_conn(|conn| {
        let status_filter = if include_resolved {
            "status != 'deleted'"
        } else {
            "status = 'open'"
        };
        let (sql, args) = match room_name {
            Some(name) => (
                format!(
                    "SELECT {REPORT_COLS} FROM bug_reports \
                     WHERE LOWER(room_name) = LOWER(?1) AND {status_filter} ORDER BY id"
                ),
                vec![name.to_string()],
            ),
            None => (
                format!(
                    "SELECT {REPORT_COLS} FROM bug_reports WHERE {status_filter} ORDER BY id"
                ),
                Vec::new(),
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), report_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(ReportRow::into_report).collect())
    })
}

/// Resolve or soft-delete a report. Resolution only applies to open
/// reports; deletion to anything not already deleted.
pub fn close_report(db: &Database, id: i64, status: ReportStatus, by: i64) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        let guard = match status {
            ReportStatus::Resolved => "status = 'open'",
            ReportStatus::Deleted => "status != 'deleted'",
            ReportStatus::Open => {
                return Err(CatalogError::Fatal("reports cannot be reopened".into()));
            }
        };
        let sql = format!(
            "UPDATE bug_reports SET status = ?2, closed_by = ?3 WHERE id = ?1 AND {guard}"
        );
        let updated = conn
            .execute(&sql, params![id, status.as_str(), by])
            .map_err(db_err)?;
        if updated == 0 {
            return Err(CatalogError::not_found(format!("No report with ID {id}")));
        }
        Ok(())
    })
}

// -- Deployments --

pub fn upsert_deployment(db: &Database, id: i64, display_url: &str, at: DateTime<Utc>) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO deployments (id, display_url, registered_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET display_url = excluded.display_url",
            params![id, display_url, ts(&at)],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

pub fn remove_deployment(db: &Database, id: i64) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        let removed = conn
            .execute("DELETE FROM deployments WHERE id = ?1", [id])
            .map_err(db_err)?;
        if removed == 0 {
            return Err(CatalogError::not_found(format!("No deployment {id}")));
        }
        Ok(())
    })
}

pub fn list_deployments(db: &Database) -> DbResult<Vec<Deployment>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, display_url, registered_at FROM deployments ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DeploymentRow {
                    id: row.get(0)?,
                    display_url: row.get(1)?,
                    registered_at: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(DeploymentRow::into_deployment).collect())
    })
}

// -- Replica entries --

fn replica_row(row: &rusqlite::Row) -> rusqlite::Result<ReplicaRow> {
    Ok(ReplicaRow {
        deployment_id: row.get(0)?,
        room_id: row.get(1)?,
        message_id: row.get(2)?,
        applied_revision: row.get(3)?,
    })
}

pub fn replica_entry(
    db: &Database,
    deployment_id: i64,
    room_id: Uuid,
) -> DbResult<Option<ReplicaEntry>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT deployment_id, room_id, message_id, applied_revision \
                 FROM replica_entries WHERE deployment_id = ?1 AND room_id = ?2",
            )
            .map_err(db_err)?;
        let row = stmt
            .query_row(params![deployment_id, room_id.to_string()], replica_row)
            .optional()
            .map_err(db_err)?;
        Ok(row.map(ReplicaRow::into_entry))
    })
}

pub fn record_render(
    db: &Database,
    deployment_id: i64,
    room_id: Uuid,
    message_id: i64,
    revision: i64,
) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO replica_entries (deployment_id, room_id, message_id, applied_revision) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(deployment_id, room_id) DO UPDATE SET \
             message_id = excluded.message_id, applied_revision = excluded.applied_revision",
            params![deployment_id, room_id.to_string(), message_id, revision],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

/// Mark an entry rebuild-pending. The message id is retained so the next
/// rebuild can take the stale message down first.
pub fn invalidate_room_entries(db: &Database, room_id: Uuid) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE replica_entries SET applied_revision = 0 WHERE room_id = ?1",
            [room_id.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

pub fn invalidate_deployment_entries(db: &Database, deployment_id: Option<i64>) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        match deployment_id {
            Some(id) => conn
                .execute(
                    "UPDATE replica_entries SET applied_revision = 0 WHERE deployment_id = ?1",
                    [id],
                )
                .map_err(db_err)?,
            None => conn
                .execute("UPDATE replica_entries SET applied_revision = 0", [])
                .map_err(db_err)?,
        };
        Ok(())
    })
}

/// Record a failed render: rebuild still pending and no live message.
pub fn clear_entry(db: &Database, deployment_id: i64, room_id: Uuid) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO replica_entries (deployment_id, room_id, message_id, applied_revision) \
             VALUES (?1, ?2, NULL, 0) \
             ON CONFLICT(deployment_id, room_id) DO UPDATE SET \
             message_id = NULL, applied_revision = 0",
            params![deployment_id, room_id.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

pub fn entries_for_room(db: &Database, room_id: Uuid) -> DbResult<Vec<ReplicaEntry>> {
    db.with_conn(|conn| query_entries_for_room(conn, room_id))
}

fn query_entries_for_room(conn: &Connection, room_id: Uuid) -> DbResult<Vec<ReplicaEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT deployment_id, room_id, message_id, applied_revision \
             FROM replica_entries WHERE room_id = ?1",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([room_id.to_string()], replica_row)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows.into_iter().map(ReplicaRow::into_entry).collect())
}

// -- Scanner sessions --

pub fn insert_session(
    db: &Database,
    id: Uuid,
    password_hash: &str,
    scanner_version: &str,
    at: DateTime<Utc>,
) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO sessions (id, password_hash, scanner_version, created_at, last_activity_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id.to_string(), password_hash, scanner_version, ts(&at)],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

pub fn get_session(db: &Database, id: &str) -> DbResult<Option<SessionRow>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT id, password_hash, scanner_version, created_at, last_activity_at, \
                 encounter_count, state FROM sessions WHERE id = ?1",
            )
            .map_err(db_err)?;
        let row = stmt
            .query_row([id], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    password_hash: row.get(1)?,
                    scanner_version: row.get(2)?,
                    created_at: row.get(3)?,
                    last_activity_at: row.get(4)?,
                    encounter_count: row.get(5)?,
                    state: row.get(6)?,
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(row)
    })
}

/// Transition out of `active`. Terminal states never transition again;
/// returns false if the session was not active.
pub fn set_session_state(db: &Database, id: Uuid, state: &str) -> DbResult<bool> {
    db.with_conn_mut(|conn| {
        let updated = conn
            .execute(
                "UPDATE sessions SET state = ?2 WHERE id = ?1 AND state = 'active'",
                params![id.to_string(), state],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    })
}

pub fn touch_session(db: &Database, id: Uuid, at: DateTime<Utc>) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE sessions SET last_activity_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&at)],
        )
        .map_err(db_err)?;
        Ok(())
    })
}

/// Append one encounter event and bump the session's counter, atomically.
pub fn record_encounter(
    db: &Database,
    session_id: Uuid,
    room_name: &str,
    at: DateTime<Utc>,
) -> DbResult<()> {
    db.with_conn_mut(|conn| {
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO encounters (session_id, room_name, at) VALUES (?1, ?2, ?3)",
            params![session_id.to_string(), room_name, ts(&at)],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE sessions SET encounter_count = encounter_count + 1, last_activity_at = ?2 \
             WHERE id = ?1",
            params![session_id.to_string(), ts(&at)],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    })
}

/// TTL sweep: every active session created before the cutoff expires,
/// regardless of activity since.
pub fn expire_sessions_before(db: &Database, cutoff: DateTime<Utc>) -> DbResult<usize> {
    db.with_conn_mut(|conn| {
        let expired = conn
            .execute(
                "UPDATE sessions SET state = 'expired' \
                 WHERE state = 'active' AND created_at < ?1",
                [ts(&cutoff)],
            )
            .map_err(db_err)?;
        Ok(expired)
    })
}

pub fn session_encounters(db: &Database, session_id: Uuid) -> DbResult<Vec<EncounterEvent>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT session_id, room_name, at FROM encounters \
                 WHERE session_id = ?1 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([session_id.to_string()], |row| {
                Ok(EncounterRow {
                    session_id: row.get(0)?,
                    room_name: row.get(1)?,
                    at: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(EncounterRow::into_event).collect())
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
