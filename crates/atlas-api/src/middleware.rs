use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared static key gate for the research surface. A missing or wrong key
/// gets the same uniform body either way.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(state.api_key.as_str()) {
        return ApiError::unauthorized().into_response();
    }
    next.run(req).await
}
