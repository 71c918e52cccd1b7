use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a documented room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Balancer,
    Production,
    Logistics,
    Storage,
    Landmark,
    Puzzle,
    Unclassified,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balancer => "balancer",
            Self::Production => "production",
            Self::Logistics => "logistics",
            Self::Storage => "storage",
            Self::Landmark => "landmark",
            Self::Puzzle => "puzzle",
            Self::Unclassified => "unclassified",
        }
    }

    /// Parse the stored text form. Unknown values fall back to
    /// `Unclassified` so a stale row never poisons a read path.
    pub fn parse(s: &str) -> Self {
        match s {
            "balancer" => Self::Balancer,
            "production" => Self::Production,
            "logistics" => Self::Logistics,
            "storage" => Self::Storage,
            "landmark" => Self::Landmark,
            "puzzle" => Self::Puzzle,
            _ => Self::Unclassified,
        }
    }
}

/// A documented room: the unit of the shared catalog.
///
/// `name` is case-preserving but unique case-insensitively; `revision`
/// strictly increases by one on every accepted mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub room_type: RoomType,
    pub description: String,
    pub tags: Vec<String>,
    pub image_urls: Vec<String>,
    pub ss: bool,
    pub pss: bool,
    pub created_by: i64,
    pub edited_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: i64,
}

/// Field payload for document/redocument before it becomes a [`Room`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDraft {
    pub name: String,
    pub room_type: RoomType,
    pub description: String,
    pub tags: Vec<String>,
    pub image_urls: Vec<String>,
    pub ss: bool,
    pub pss: bool,
}

/// A room as received from the external system of record during a
/// reconcile pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedRoom {
    pub draft: RoomDraft,
    pub documented_by: i64,
    pub edited_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// One field-level change recorded in the edit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

/// Append-only history entry: never mutated, never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub room_id: Uuid,
    pub editor: i64,
    pub at: DateTime<Utc>,
    pub revision: i64,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Resolved,
    Deleted,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => Self::Resolved,
            "deleted" => Self::Deleted,
            _ => Self::Open,
        }
    }
}

/// A user-filed issue against a room. Soft-deleted only: delete flips the
/// status, the record is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugReport {
    pub id: i64,
    pub room_name: String,
    pub reporter: i64,
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub closed_by: Option<i64>,
}

/// One chat-server installation displaying the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub display_url: String,
    pub registered_at: DateTime<Utc>,
}

/// Which rendered message currently displays a room in a deployment.
///
/// `message_id = None` or `applied_revision = 0` means the entry is
/// invalidated and a rebuild is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaEntry {
    pub deployment_id: i64,
    pub room_id: Uuid,
    pub message_id: Option<i64>,
    pub applied_revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Ended,
    Expired,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "ended" => Self::Ended,
            _ => Self::Expired,
        }
    }
}

/// An ephemeral scanner session. The password itself is never stored,
/// only its hash; expiry is absolute from `created_at`, not sliding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSession {
    pub id: Uuid,
    pub scanner_version: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub encounter_count: i64,
    pub state: SessionState,
}

/// Append-only record of a room sighting during a scanning session.
/// Stores the name as submitted — scanners report rooms before anyone
/// has documented them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterEvent {
    pub session_id: Uuid,
    pub room_name: String,
    pub at: DateTime<Utc>,
}

/// Profile data served by the injected identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub profile_picture_url: String,
}
