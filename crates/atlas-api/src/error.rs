use atlas_types::api::ErrorResponse;
use atlas_types::error::CatalogError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP-facing error: a status code plus the uniform JSON payload.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: "Unauthorized".to_string(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let status = match &e {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Conflict(_) => StatusCode::CONFLICT,
            CatalogError::Unauthorized => StatusCode::UNAUTHORIZED,
            CatalogError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            CatalogError::SessionInvalid => StatusCode::UNAUTHORIZED,
            CatalogError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CatalogError::Fatal(_) => {
                error!("{}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}
