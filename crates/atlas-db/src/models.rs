//! Database row types — these map directly to SQLite rows.
//! Distinct from the atlas-types domain models to keep the DB layer honest
//! about what is actually stored.

use atlas_types::models::{
    BugReport, Deployment, EncounterEvent, ReplicaEntry, ReportStatus, Room, RoomType,
    ScannerSession, SessionState,
};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub room_type: String,
    pub description: String,
    pub tags: String,
    pub image_urls: String,
    pub ss: bool,
    pub pss: bool,
    pub created_by: i64,
    pub edited_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub revision: i64,
}

impl RoomRow {
    pub fn into_room(self) -> Room {
        Room {
            id: parse_uuid(&self.id, "room id"),
            name: self.name,
            room_type: RoomType::parse(&self.room_type),
            description: self.description,
            tags: parse_string_list(&self.tags, &self.id, "tags"),
            image_urls: parse_string_list(&self.image_urls, &self.id, "image_urls"),
            ss: self.ss,
            pss: self.pss,
            created_by: self.created_by,
            edited_by: self.edited_by,
            created_at: parse_ts(&self.created_at, &self.id, "created_at"),
            updated_at: parse_ts(&self.updated_at, &self.id, "updated_at"),
            revision: self.revision,
        }
    }
}

pub struct SessionRow {
    pub id: String,
    pub password_hash: String,
    pub scanner_version: String,
    pub created_at: String,
    pub last_activity_at: String,
    pub encounter_count: i64,
    pub state: String,
}

impl SessionRow {
    pub fn into_session(self) -> ScannerSession {
        ScannerSession {
            id: parse_uuid(&self.id, "session id"),
            scanner_version: self.scanner_version,
            created_at: parse_ts(&self.created_at, &self.id, "created_at"),
            last_activity_at: parse_ts(&self.last_activity_at, &self.id, "last_activity_at"),
            encounter_count: self.encounter_count,
            state: SessionState::parse(&self.state),
        }
    }
}

pub struct ReportRow {
    pub id: i64,
    pub room_name: String,
    pub reporter: i64,
    pub description: String,
    pub status: String,
    pub created_at: String,
    pub closed_by: Option<i64>,
}

impl ReportRow {
    pub fn into_report(self) -> BugReport {
        let id = self.id.to_string();
        BugReport {
            id: self.id,
            room_name: self.room_name,
            reporter: self.reporter,
            description: self.description,
            status: ReportStatus::parse(&self.status),
            created_at: parse_ts(&self.created_at, &id, "created_at"),
            closed_by: self.closed_by,
        }
    }
}

pub struct DeploymentRow {
    pub id: i64,
    pub display_url: String,
    pub registered_at: String,
}

impl DeploymentRow {
    pub fn into_deployment(self) -> Deployment {
        let id = self.id.to_string();
        Deployment {
            id: self.id,
            display_url: self.display_url,
            registered_at: parse_ts(&self.registered_at, &id, "registered_at"),
        }
    }
}

pub struct ReplicaRow {
    pub deployment_id: i64,
    pub room_id: String,
    pub message_id: Option<i64>,
    pub applied_revision: i64,
}

impl ReplicaRow {
    pub fn into_entry(self) -> ReplicaEntry {
        ReplicaEntry {
            deployment_id: self.deployment_id,
            room_id: parse_uuid(&self.room_id, "replica room id"),
            message_id: self.message_id,
            applied_revision: self.applied_revision,
        }
    }
}

pub struct EncounterRow {
    pub session_id: String,
    pub room_name: String,
    pub at: String,
}

impl EncounterRow {
    pub fn into_event(self) -> EncounterEvent {
        EncounterEvent {
            session_id: parse_uuid(&self.session_id, "encounter session id"),
            room_name: self.room_name,
            at: parse_ts(&self.at, &self.session_id, "at"),
        }
    }
}

fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

fn parse_ts(s: &str, row: &str, field: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row '{}': {}", field, s, row, e);
            DateTime::default()
        })
}

fn parse_string_list(s: &str, row: &str, field: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, s, row, e);
        Vec::new()
    })
}
