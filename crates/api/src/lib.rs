//! Shared API types and pure helpers for campuswatch.
//!
//! This crate is the single source of truth for request/response shapes, the
//! error taxonomy, and everything that can be computed without touching HTTP
//! or the database. The Axum server keeps its route handlers as thin adapters
//! over these types.

use serde::{Deserialize, Serialize};

pub mod crypto;
pub mod oauth;
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Lifecycle status of a misconduct report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a stored status string. Unknown values are a data error.
    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ServiceError::Internal(format!(
                "unknown report status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// A campus member known to the local directory.
///
/// `login` is the provider-side identifier and the unique join key; `id` is
/// local to our store. `is_staff` is only ever provisioned directly against
/// the database — no code path here sets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub is_staff: bool,
    pub created_at: String,
}

/// Profile fields written on (re-)login or campus sync. Never carries the
/// staff flag: upserts must not be able to grant or revoke it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub display_name: String,
}

/// A misconduct report. Reporter/subject/reason/explanation are immutable
/// after creation; only the status (plus review metadata) changes, once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub reported_student_login: String,
    pub project_name: String,
    pub reason: String,
    pub explanation: String,
    pub status: ReportStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<i64>,
}

/// Static reference data seeded at schema init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportReason {
    pub id: i64,
    pub reason: String,
    pub description: String,
}

/// Row inserted when the pending-report count for a (student, project) pair
/// reaches the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffNotification {
    pub id: i64,
    pub reported_student_login: String,
    pub project_name: String,
    pub report_count: i64,
    pub notification_sent_at: String,
    pub resolved: bool,
}

/// Per-reporter trust statistics, recomputed wholesale from resolved reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReportStats {
    pub user_id: i64,
    pub total_reports: i64,
    pub approved_reports: i64,
    pub rejected_reports: i64,
    pub false_report_ratio: f64,
    pub warned: bool,
}

/// Aggregate ranking row for the staff dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReportStats {
    pub project_name: String,
    pub total_reports: i64,
    pub pending_reports: i64,
    pub approved_reports: i64,
    pub rejected_reports: i64,
    pub reported_students: i64,
}

/// Identity-provider profile of an authenticated campus member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub display_name: String,
}

/// Directory search hit (local or live provider search).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSearchResult {
    pub login: String,
    pub display_name: String,
    pub email: String,
}

// ─── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReportRequest {
    pub reported_student_login: String,
    pub project_name: String,
    pub reason: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReportRequest {
    pub status: String,
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReportResponse {
    pub message: String,
    pub report_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewReportResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportListResponse {
    pub reports: Vec<Report>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReasonListResponse {
    pub reasons: Vec<ReportReason>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentSearchResponse {
    pub students: Vec<StudentSearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectListResponse {
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectStatsResponse {
    pub projects: Vec<ProjectReportStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserCountResponse {
    pub total_users: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncUsersResponse {
    pub message: String,
    pub count: usize,
    pub requested_by: String,
}

/// Session introspection (debug-oriented). When the session cookie verifies
/// but the login has no directory row, `in_database` is false and `hint`
/// tells the caller to re-login.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub authenticated: bool,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub in_database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

// ─── Error Taxonomy ──────────────────────────────────────────────────────────

/// Service-level errors, independent of any HTTP framework.
///
/// `UpstreamAuth` covers identity-provider token-exchange and profile-fetch
/// failures; `UpstreamApi` covers every other non-200/decode failure from the
/// provider. Store and upstream errors are never retried — the first failure
/// maps straight to a client-visible response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    UpstreamAuth(String),
    UpstreamApi(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::UpstreamAuth(_) | Self::UpstreamApi(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::UpstreamAuth(m)
            | Self::UpstreamApi(m)
            | Self::Internal(m) => m,
        }
    }

    /// Build a closure that adds context to a DB/IO error and returns `Internal`.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::{ReportStatus, ServiceError};

    #[test]
    fn report_status_round_trips_through_strings() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::Approved,
            ReportStatus::Rejected,
        ] {
            let parsed = ReportStatus::parse(status.as_str()).expect("known status");
            assert_eq!(parsed, status);
        }
        assert!(ReportStatus::parse("escalated").is_err());
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        assert_eq!(ServiceError::UpstreamAuth("x".into()).status_code(), 502);
        assert_eq!(ServiceError::UpstreamApi("x".into()).status_code(), 502);
        assert_eq!(ServiceError::Forbidden("x".into()).status_code(), 403);
        assert_ne!(
            ServiceError::Unauthorized("x".into()).status_code(),
            ServiceError::Forbidden("x".into()).status_code()
        );
    }
}
