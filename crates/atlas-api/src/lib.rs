pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod reports;
pub mod roles;
pub mod rooms;
pub mod scanner;
pub mod sessions;

use std::sync::Arc;

use atlas_db::catalog::Catalog;
use atlas_sync::SyncCoordinator;
use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::rate_limit::RateLimiter;
use crate::roles::RoleProvider;
use crate::sessions::SessionManager;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub catalog: Catalog,
    pub sync: SyncCoordinator,
    pub sessions: SessionManager,
    pub limiter: RateLimiter,
    pub roles: Arc<dyn RoleProvider>,
    pub api_key: String,
    pub scanner_version: String,
}

/// Assemble both HTTP surfaces: the shared-key research routes and the
/// per-session scanner routes.
pub fn router(state: AppState) -> Router {
    let open = Router::new()
        .route("/", get(rooms::health))
        .route("/scanner/check_version", post(scanner::check_version))
        .route("/scanner/request_session", post(scanner::request_session))
        .route("/scanner/get_roominfo", post(scanner::get_roominfo))
        .route("/scanner/room_encountered", post(scanner::room_encountered))
        .route("/scanner/end_session", post(scanner::end_session))
        .with_state(state.clone());

    let keyed = Router::new()
        .route("/get_researcher_role", get(rooms::get_researcher_role))
        .route("/get_user_profile", get(rooms::get_user_profile))
        .route("/document_room", post(rooms::document_room))
        .route("/redocument_room", post(rooms::redocument_room))
        .route("/set_roomtype", post(rooms::set_roomtype))
        .route("/set_tags", post(rooms::set_tags))
        .route("/rename_room", post(rooms::rename_room))
        .route("/deletedoc", delete(rooms::deletedoc))
        .route("/report_bug", post(reports::report_bug))
        .route("/bug_reports", get(reports::bug_reports))
        .route("/resolve_report", post(reports::resolve_report))
        .route("/delete_report", delete(reports::delete_report))
        .route("/register_deployment", post(rooms::register_deployment))
        .route("/remove_deployment", delete(rooms::remove_deployment))
        .route("/global_reset", post(rooms::global_reset))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .with_state(state);

    open.merge(keyed)
}
