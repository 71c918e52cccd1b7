use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BugReport, Room, RoomType, UserProfile};

// -- Shared envelopes --

/// Uniform error payload. `code` is the machine-readable discriminator;
/// `error` is the human wording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub success: bool,
    pub message: String,
}

impl OkResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// -- Research surface (shared static key via x-api-key header) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentRoomRequest {
    pub room_name: String,
    pub room_type: RoomType,
    pub image_urls: Vec<String>,
    pub description: String,
    pub documented_by: i64,
    #[serde(default)]
    pub ss: bool,
    #[serde(default)]
    pub pss: bool,
    pub tags: Option<Vec<String>>,
    /// Client-supplied documentation time; receipt time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedocumentRoomRequest {
    pub room_name: String,
    pub room_type: RoomType,
    pub image_urls: Vec<String>,
    pub description: String,
    pub documented_by: i64,
    pub edited_by: i64,
    #[serde(default)]
    pub ss: bool,
    #[serde(default)]
    pub pss: bool,
    pub tags: Option<Vec<String>>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoomTypeRequest {
    pub room_name: String,
    pub room_type: RoomType,
    pub edited_by: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTagsRequest {
    pub room_name: String,
    pub tags: Vec<String>,
    pub edited_by: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRoomRequest {
    pub old_name: String,
    pub new_name: String,
    pub edited_by: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteDocRequest {
    pub room_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub success: bool,
    pub room: Room,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResearcherRoleResponse {
    pub user_id: i64,
    pub research_level: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfileResponse {
    pub user_id: i64,
    #[serde(flatten)]
    pub profile: UserProfile,
}

// -- Bug reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportBugRequest {
    pub room_name: String,
    pub description: String,
    pub reported_by: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportFiledResponse {
    pub success: bool,
    pub report_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BugReportQuery {
    pub room_name: Option<String>,
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BugReportsResponse {
    pub success: bool,
    pub reports: Vec<BugReport>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveReportRequest {
    pub report_id: i64,
    pub resolved_by: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteReportRequest {
    pub report_id: i64,
    pub deleted_by: i64,
}

// -- Deployment registry --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterDeploymentRequest {
    pub deployment_id: i64,
    pub display_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveDeploymentRequest {
    pub deployment_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct GlobalResetRequest {
    pub deployment_id: Option<i64>,
}

// -- Scanner surface (per-session credential) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRequest {
    pub scanner_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub success: bool,
    pub session_id: Uuid,
    /// One-time password, returned exactly once. Only its hash survives.
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub success: bool,
    pub latest_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEndRequest {
    pub session_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomInfoRequest {
    pub room_name: String,
    pub session_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomEncounteredRequest {
    pub session_id: String,
    pub password: String,
    pub room_name: String,
}
