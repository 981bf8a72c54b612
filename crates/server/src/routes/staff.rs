use axum::{
    Json,
    extract::{Path, State},
};

use campuswatch_api::{
    ProjectStatsResponse, ReportListResponse, ReviewReportRequest, ReviewReportResponse, service,
};

use crate::error::ApiErr;
use crate::routes::auth::StaffUser;
use crate::storage::Db;

/// GET /api/staff/reports — pending reports, newest first.
pub async fn pending_reports(
    State(db): State<Db>,
    _staff: StaffUser,
) -> Result<Json<ReportListResponse>, ApiErr> {
    let reports = db.pending_reports().map_err(ApiErr::from)?;
    Ok(Json(ReportListResponse { reports }))
}

/// PUT /api/staff/reports/{id} — move a pending report to a terminal state.
/// A report that was already reviewed stays as reviewed; the second call
/// gets a conflict.
pub async fn review_report(
    State(db): State<Db>,
    StaffUser(reviewer): StaffUser,
    Path(report_id): Path<i64>,
    Json(req): Json<ReviewReportRequest>,
) -> Result<Json<ReviewReportResponse>, ApiErr> {
    let status = service::validate_review_status(&req.status).map_err(ApiErr::from)?;

    db.review_report(report_id, status, reviewer.id)
        .map_err(ApiErr::from)?;

    tracing::info!(report_id, status = %status, reviewer = %reviewer.login, "report reviewed");

    Ok(Json(ReviewReportResponse {
        message: "Report reviewed successfully".into(),
    }))
}

/// GET /api/staff/project-stats — most-reported projects for the dashboard.
pub async fn project_stats(
    State(db): State<Db>,
    _staff: StaffUser,
) -> Result<Json<ProjectStatsResponse>, ApiErr> {
    let projects = db.most_reported_projects().map_err(ApiErr::from)?;
    Ok(Json(ProjectStatsResponse { projects }))
}
