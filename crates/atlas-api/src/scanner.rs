//! Scanner surface: every call authenticates with a per-session credential
//! rather than the shared key, and every authenticated call passes the
//! rate limiter before doing anything else.

use axum::{Json, extract::State, response::IntoResponse};
use tracing::{debug, info};
use uuid::Uuid;

use atlas_types::api::{
    OkResponse, RoomEncounteredRequest, RoomInfoRequest, RoomResponse, SessionEndRequest,
    SessionRequest, SessionResponse, VersionResponse,
};
use atlas_types::error::CatalogError;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn check_version(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> impl IntoResponse {
    info!("Scanner version check: {}", req.scanner_version);
    Json(VersionResponse {
        success: true,
        latest_version: state.scanner_version.clone(),
    })
}

/// The only unauthenticated scanner call.
pub async fn request_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("Scanner session requested (version: {})", req.scanner_version);
    let (session_id, password) = state.sessions.create(req.scanner_version).await?;
    Ok(Json(SessionResponse {
        success: true,
        session_id,
        password,
    }))
}

pub async fn get_roominfo(
    State(state): State<AppState>,
    Json(req): Json<RoomInfoRequest>,
) -> ApiResult<impl IntoResponse> {
    let session_id = parse_session_id(&req.session_id)?;
    state.limiter.check(session_id)?;
    state.sessions.authenticate(&req.session_id, &req.password).await?;

    debug!("Scanner requesting room info for '{}'", req.room_name);
    let room = state.catalog.get(&req.room_name).await?.ok_or_else(|| {
        CatalogError::not_found(format!(
            "Room '{}' does not exist in the database.",
            req.room_name
        ))
    })?;
    Ok(Json(RoomResponse {
        success: true,
        room,
    }))
}

pub async fn room_encountered(
    State(state): State<AppState>,
    Json(req): Json<RoomEncounteredRequest>,
) -> ApiResult<impl IntoResponse> {
    let session_id = parse_session_id(&req.session_id)?;
    state.limiter.check(session_id)?;
    state.sessions.authenticate(&req.session_id, &req.password).await?;

    state.sessions.record_encounter(session_id, &req.room_name).await?;
    info!(
        "Session '{}' logged encountered room '{}'",
        session_id, req.room_name
    );
    Ok(Json(OkResponse::new(format!(
        "Room '{}' has been logged for session '{}'.",
        req.room_name, session_id
    ))))
}

pub async fn end_session(
    State(state): State<AppState>,
    Json(req): Json<SessionEndRequest>,
) -> ApiResult<impl IntoResponse> {
    let session_id = parse_session_id(&req.session_id)?;
    state.limiter.check(session_id)?;
    state.sessions.authenticate(&req.session_id, &req.password).await?;

    state.sessions.end(session_id).await?;
    state.limiter.forget(session_id);
    Ok(Json(OkResponse::new(format!(
        "Session '{session_id}' has been ended."
    ))))
}

/// A session id that does not even parse cannot exist; answer exactly as
/// for a wrong credential.
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| CatalogError::Unauthorized.into())
}
