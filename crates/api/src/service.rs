//! Shared business logic — framework-agnostic pure functions.
//!
//! Route handlers extract inputs from the request and delegate the actual
//! rules here, so the threshold rule and validation stay unit-testable
//! without a running server.

use crate::{CreateReportRequest, ReportStatus, ServiceError};

// ─── Report Validation ───────────────────────────────────────────────────────

/// Pending-report count at which staff are notified about a
/// (student, project) pair.
pub const NOTIFICATION_THRESHOLD: i64 = 3;

/// Whether a pending-report count warrants a staff notification.
///
/// The rule is level-triggered: every submission at or past the threshold
/// notifies again, not just the crossing one.
pub fn threshold_reached(pending_count: i64) -> bool {
    pending_count >= NOTIFICATION_THRESHOLD
}

/// Validate and normalize a report submission. All four fields are required;
/// surrounding whitespace is stripped.
pub fn validate_report(req: &CreateReportRequest) -> Result<CreateReportRequest, ServiceError> {
    let field = |name: &str, value: &str| -> Result<String, ServiceError> {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            return Err(ServiceError::BadRequest(format!("{name} is required")));
        }
        Ok(trimmed)
    };

    Ok(CreateReportRequest {
        reported_student_login: field("reported_student_login", &req.reported_student_login)?,
        project_name: field("project_name", &req.project_name)?,
        reason: field("reason", &req.reason)?,
        explanation: field("explanation", &req.explanation)?,
    })
}

/// Validate a review decision. Only the two terminal states are acceptable;
/// a report can never be moved back to pending.
pub fn validate_review_status(status: &str) -> Result<ReportStatus, ServiceError> {
    match ReportStatus::parse(status.trim()) {
        Ok(ReportStatus::Approved) => Ok(ReportStatus::Approved),
        Ok(ReportStatus::Rejected) => Ok(ReportStatus::Rejected),
        _ => Err(ServiceError::BadRequest(
            "status must be 'approved' or 'rejected'".into(),
        )),
    }
}

// ─── Reporter Statistics ─────────────────────────────────────────────────────

/// Fraction of a reporter's resolved reports that were rejected.
/// Zero when the reporter has no resolved reports (no division by zero).
pub fn false_report_ratio(total: i64, rejected: i64) -> f64 {
    if total > 0 {
        rejected as f64 / total as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateReportRequest {
        CreateReportRequest {
            reported_student_login: "jdoe".into(),
            project_name: "libft".into(),
            reason: "plagiarism".into(),
            explanation: "identical diff".into(),
        }
    }

    #[test]
    fn threshold_is_level_triggered() {
        assert!(!threshold_reached(2));
        assert!(threshold_reached(3));
        assert!(threshold_reached(4));
    }

    #[test]
    fn validate_report_trims_fields() {
        let mut req = request();
        req.project_name = "  libft  ".into();
        let normalized = validate_report(&req).expect("valid request");
        assert_eq!(normalized.project_name, "libft");
    }

    #[test]
    fn validate_report_names_the_missing_field() {
        let mut req = request();
        req.explanation = "   ".into();
        let err = validate_report(&req).expect_err("blank explanation must fail");
        assert!(err.message().contains("explanation"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn review_status_accepts_only_terminal_states() {
        assert_eq!(
            validate_review_status("approved").expect("approved is terminal"),
            ReportStatus::Approved
        );
        assert_eq!(
            validate_review_status("rejected").expect("rejected is terminal"),
            ReportStatus::Rejected
        );
        assert!(validate_review_status("pending").is_err());
        assert!(validate_review_status("garbage").is_err());
    }

    #[test]
    fn false_report_ratio_handles_empty_history() {
        assert_eq!(false_report_ratio(0, 0), 0.0);
        assert!((false_report_ratio(3, 1) - 1.0 / 3.0).abs() < f64::EPSILON);
    }
}
