use std::time::Duration;

use atlas_types::models::{ImportedRoom, Room, RoomDraft, RoomType};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{SyncError, net_err};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wire form of a room on the external system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRoom {
    pub room_name: String,
    pub description: String,
    pub images: Vec<String>,
    pub documented_by: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub roomtype: String,
    #[serde(default)]
    pub ss: bool,
    #[serde(default)]
    pub pss: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<i64>,
    /// The local revision this payload represents. The remote treats an
    /// upsert it has already applied as success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

impl ExternalRoom {
    pub fn from_room(room: &Room) -> Self {
        Self {
            room_name: room.name.clone(),
            description: room.description.clone(),
            images: room.image_urls.clone(),
            documented_by: room.created_by,
            tags: room.tags.clone(),
            roomtype: room.room_type.as_str().to_string(),
            ss: room.ss,
            pss: room.pss,
            last_edited: Some(room.updated_at),
            last_edited_by: room.edited_by,
            revision: Some(room.revision),
        }
    }

    /// Convert the wire form into an import, dropping image references
    /// that are not real URLs (the external side has sent file paths) and
    /// capping the list at the catalog's 10-image maximum.
    pub fn into_imported(self, fallback_ts: DateTime<Utc>) -> ImportedRoom {
        let mut image_urls: Vec<String> = self
            .images
            .into_iter()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .collect();
        image_urls.truncate(10);
        ImportedRoom {
            draft: RoomDraft {
                name: self.room_name,
                room_type: RoomType::parse(&self.roomtype),
                description: self.description,
                tags: self.tags,
                image_urls,
                ss: self.ss,
                pss: self.pss,
            },
            documented_by: self.documented_by,
            edited_by: self.last_edited_by,
            updated_at: self.last_edited.unwrap_or(fallback_ts),
        }
    }
}

/// Outbound half of the bidirectional catalog sync.
pub trait ExternalCatalog: Send + Sync + 'static {
    /// Idempotent upsert keyed by (name, revision).
    fn upsert_room<'a>(&'a self, room: &'a Room) -> BoxFuture<'a, Result<(), SyncError>>;

    fn delete_room<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), SyncError>>;

    /// Full catalog export for the periodic reconcile.
    fn export(&self) -> BoxFuture<'_, Result<Vec<ExternalRoom>, SyncError>>;
}

pub struct HttpExternal {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    #[allow(dead_code)]
    success: bool,
    rooms: Vec<ExternalRoom>,
}

impl HttpExternal {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl ExternalCatalog for HttpExternal {
    fn upsert_room<'a>(&'a self, room: &'a Room) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            let url = format!("{}/upload-room", self.base_url);
            let payload = ExternalRoom::from_room(room);
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(CALL_TIMEOUT)
                .json(&payload)
                .send()
                .await
                .map_err(net_err)?;

            let status = resp.status();
            // 409 means the remote is already at this revision.
            if status.is_success() || status.as_u16() == 409 {
                return Ok(());
            }
            let body = resp.text().await.unwrap_or_default();
            Err(SyncError::from_status(status, body))
        }
        .boxed()
    }

    fn delete_room<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            let url = format!("{}/room/{}/delete", self.base_url, name);
            let resp = self
                .client
                .delete(&url)
                .bearer_auth(&self.api_key)
                .timeout(CALL_TIMEOUT)
                .send()
                .await
                .map_err(net_err)?;

            let status = resp.status();
            if status.is_success() || status.as_u16() == 404 {
                return Ok(());
            }
            let body = resp.text().await.unwrap_or_default();
            Err(SyncError::from_status(status, body))
        }
        .boxed()
    }

    fn export(&self) -> BoxFuture<'_, Result<Vec<ExternalRoom>, SyncError>> {
        async move {
            let url = format!("{}/database/export", self.base_url);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .timeout(EXPORT_TIMEOUT)
                .send()
                .await
                .map_err(net_err)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SyncError::from_status(status, body));
            }
            let body: ExportResponse = resp.json().await.map_err(net_err)?;
            Ok(body.rooms)
        }
        .boxed()
    }
}
