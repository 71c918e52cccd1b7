use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use atlas_types::api::{
    BugReportQuery, BugReportsResponse, DeleteReportRequest, OkResponse, ReportBugRequest,
    ReportFiledResponse, ResolveReportRequest,
};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

const MIN_DESCRIPTION: usize = 30;
const MAX_DESCRIPTION: usize = 1000;

pub async fn report_bug(
    State(state): State<AppState>,
    Json(req): Json<ReportBugRequest>,
) -> ApiResult<impl IntoResponse> {
    let length = req.description.chars().count();
    if !(MIN_DESCRIPTION..=MAX_DESCRIPTION).contains(&length) {
        return Err(ApiError::bad_request(format!(
            "Report description must be between {MIN_DESCRIPTION} and {MAX_DESCRIPTION} characters"
        )));
    }

    let report_id = state
        .catalog
        .report_bug(&req.room_name, req.reported_by, req.description)
        .await?;

    info!("Bug report #{} filed for '{}'", report_id, req.room_name);
    Ok((
        StatusCode::CREATED,
        Json(ReportFiledResponse {
            success: true,
            report_id,
        }),
    ))
}

pub async fn bug_reports(
    State(state): State<AppState>,
    Query(query): Query<BugReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let reports = state
        .catalog
        .bug_reports(query.room_name, query.include_resolved)
        .await?;
    Ok(Json(BugReportsResponse {
        success: true,
        reports,
    }))
}

pub async fn resolve_report(
    State(state): State<AppState>,
    Json(req): Json<ResolveReportRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .catalog
        .resolve_report(req.report_id, req.resolved_by)
        .await?;
    Ok(Json(OkResponse::new(format!(
        "Report #{} marked as resolved.",
        req.report_id
    ))))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Json(req): Json<DeleteReportRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .catalog
        .delete_report(req.report_id, req.deleted_by)
        .await?;
    Ok(Json(OkResponse::new(format!(
        "Report #{} deleted.",
        req.report_id
    ))))
}
