use axum::{Json, extract::State, http::StatusCode};

use campuswatch_api::{
    CreateReportRequest, CreateReportResponse, ReasonListResponse, service,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::Db;

/// POST /api/reports — submit a misconduct report (authenticated).
///
/// After the insert, the pending count for the (student, project) pair is
/// checked against the notification threshold. The notification insert is
/// best-effort by design: the report is already committed, so a failure
/// here is logged and dropped rather than surfaced to the reporter.
pub async fn create_report(
    State(db): State<Db>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<CreateReportResponse>), ApiErr> {
    let req = service::validate_report(&req).map_err(ApiErr::from)?;

    let report_id = db.create_report(user.id, &req).map_err(ApiErr::from)?;

    let pending = db
        .pending_report_count(&req.reported_student_login, &req.project_name)
        .map_err(ApiErr::from)?;

    if service::threshold_reached(pending) {
        if let Err(e) = db.create_staff_notification(
            &req.reported_student_login,
            &req.project_name,
            pending,
        ) {
            tracing::warn!(
                report_id,
                "staff notification insert failed, report stands: {e}"
            );
        } else {
            tracing::info!(
                student = %req.reported_student_login,
                project = %req.project_name,
                count = pending,
                "staff notified"
            );
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateReportResponse {
            message: "Report submitted successfully".into(),
            report_id,
        }),
    ))
}

/// GET /api/report-reasons — public reference data.
pub async fn report_reasons(State(db): State<Db>) -> Result<Json<ReasonListResponse>, ApiErr> {
    let reasons = db.report_reasons().map_err(ApiErr::from)?;
    Ok(Json(ReasonListResponse { reasons }))
}
