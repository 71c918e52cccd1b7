use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use atlas_types::api::{
    DeleteDocRequest, DocumentRoomRequest, GlobalResetRequest, OkResponse,
    RedocumentRoomRequest, RegisterDeploymentRequest, RemoveDeploymentRequest,
    RenameRoomRequest, ResearcherRoleResponse, SetRoomTypeRequest, SetTagsRequest,
    UserProfileResponse, UserQuery,
};
use atlas_types::error::CatalogError;
use atlas_types::events::CatalogEvent;
use atlas_types::models::RoomDraft;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

const MIN_IMAGES: usize = 4;
const MAX_IMAGES: usize = 10;

pub async fn health() -> impl IntoResponse {
    Json(OkResponse::new("atlas is online"))
}

pub async fn get_researcher_role(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    Json(ResearcherRoleResponse {
        user_id: query.user_id,
        research_level: state.roles.research_level(query.user_id),
    })
}

pub async fn get_user_profile(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<impl IntoResponse> {
    let profile = state
        .roles
        .user_profile(query.user_id)
        .ok_or_else(|| CatalogError::not_found(format!("No profile for user {}", query.user_id)))?;
    Ok(Json(UserProfileResponse {
        user_id: query.user_id,
        profile,
    }))
}

pub async fn document_room(
    State(state): State<AppState>,
    Json(req): Json<DocumentRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.room_name.trim().is_empty() {
        return Err(ApiError::bad_request("room_name must not be empty"));
    }
    let image_urls = normalize_images(req.image_urls)?;

    let draft = RoomDraft {
        name: req.room_name,
        room_type: req.room_type,
        description: req.description,
        tags: req.tags.unwrap_or_default(),
        image_urls,
        ss: req.ss,
        pss: req.pss,
    };
    let room = state
        .catalog
        .document(draft, req.documented_by, req.timestamp)
        .await?;
    state.sync.notify(CatalogEvent::RoomUpserted {
        room_id: room.id,
        revision: room.revision,
    });

    info!("Documented '{}'", room.name);
    Ok((
        StatusCode::CREATED,
        Json(OkResponse::new(format!(
            "Room '{}' has been documented.",
            room.name
        ))),
    ))
}

pub async fn redocument_room(
    State(state): State<AppState>,
    Json(req): Json<RedocumentRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let image_urls = normalize_images(req.image_urls)?;

    let draft = RoomDraft {
        name: req.room_name,
        room_type: req.room_type,
        description: req.description,
        tags: req.tags.unwrap_or_default(),
        image_urls,
        ss: req.ss,
        pss: req.pss,
    };
    let room = state
        .catalog
        .redocument(draft, req.edited_by, req.timestamp)
        .await?;
    state.sync.notify(CatalogEvent::RoomUpserted {
        room_id: room.id,
        revision: room.revision,
    });

    info!("Redocumented '{}' at revision {}", room.name, room.revision);
    Ok(Json(OkResponse::new(format!(
        "Room '{}' has been redocumented.",
        room.name
    ))))
}

pub async fn set_roomtype(
    State(state): State<AppState>,
    Json(req): Json<SetRoomTypeRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state
        .catalog
        .set_room_type(&req.room_name, req.room_type, req.edited_by)
        .await?;
    state.sync.notify(CatalogEvent::RoomUpserted {
        room_id: room.id,
        revision: room.revision,
    });

    Ok(Json(OkResponse::new(format!(
        "Room '{}' has been updated to type '{}'.",
        room.name,
        room.room_type.as_str()
    ))))
}

pub async fn set_tags(
    State(state): State<AppState>,
    Json(req): Json<SetTagsRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state
        .catalog
        .set_tags(&req.room_name, req.tags, req.edited_by)
        .await?;
    state.sync.notify(CatalogEvent::RoomUpserted {
        room_id: room.id,
        revision: room.revision,
    });

    Ok(Json(OkResponse::new(format!(
        "Room '{}' has been updated with tags: {}.",
        room.name,
        room.tags.join(", ")
    ))))
}

pub async fn rename_room(
    State(state): State<AppState>,
    Json(req): Json<RenameRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.new_name.trim().is_empty() {
        return Err(ApiError::bad_request("new_name must not be empty"));
    }
    let room = state
        .catalog
        .rename(&req.old_name, &req.new_name, req.edited_by)
        .await?;
    state.sync.notify(CatalogEvent::RoomRenamed {
        room_id: room.id,
        revision: room.revision,
        old_name: req.old_name.clone(),
    });

    info!("Renamed room '{}' -> '{}'", req.old_name, room.name);
    Ok(Json(OkResponse::new(format!(
        "Room '{}' has been renamed to '{}'.",
        req.old_name, room.name
    ))))
}

pub async fn deletedoc(
    State(state): State<AppState>,
    Json(req): Json<DeleteDocRequest>,
) -> ApiResult<impl IntoResponse> {
    let (room, entries) = state.catalog.delete(&req.room_name).await?;
    let name = room.name.clone();
    state.sync.notify(CatalogEvent::RoomDeleted { room, entries });

    info!("Deleted documentation for '{}'", name);
    Ok(Json(OkResponse::new(format!(
        "Documentation for room '{name}' has been deleted."
    ))))
}

pub async fn register_deployment(
    State(state): State<AppState>,
    Json(req): Json<RegisterDeploymentRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .catalog
        .register_deployment(req.deployment_id, req.display_url)
        .await?;
    // A new deployment starts from an empty display channel.
    state.sync.notify(CatalogEvent::GlobalReset {
        deployment_id: Some(req.deployment_id),
    });

    info!("Registered deployment {}", req.deployment_id);
    Ok((
        StatusCode::CREATED,
        Json(OkResponse::new(format!(
            "Deployment {} registered; catalog render scheduled.",
            req.deployment_id
        ))),
    ))
}

pub async fn remove_deployment(
    State(state): State<AppState>,
    Json(req): Json<RemoveDeploymentRequest>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.remove_deployment(req.deployment_id).await?;
    Ok(Json(OkResponse::new(format!(
        "Deployment {} removed.",
        req.deployment_id
    ))))
}

pub async fn global_reset(
    State(state): State<AppState>,
    Json(req): Json<GlobalResetRequest>,
) -> ApiResult<impl IntoResponse> {
    state.sync.notify(CatalogEvent::GlobalReset {
        deployment_id: req.deployment_id,
    });
    Ok(Json(OkResponse::new(
        "Full catalog rebuild scheduled.".to_string(),
    )))
}

fn normalize_images(mut urls: Vec<String>) -> Result<Vec<String>, ApiError> {
    urls.truncate(MAX_IMAGES);
    if urls.len() < MIN_IMAGES {
        return Err(ApiError::bad_request(format!(
            "At least {MIN_IMAGES} image references are required"
        )));
    }
    Ok(urls)
}
