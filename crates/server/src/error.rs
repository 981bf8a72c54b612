use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use campuswatch_api::ServiceError;

/// Unified API error type.
///
/// Produces `{"error": "<message>"}` JSON responses for every handler.
pub struct ApiErr {
    status: StatusCode,
    message: String,
}

impl ApiErr {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        // Store internals stay in the log, not in the response body.
        let message = match &e {
            ServiceError::Internal(m) => {
                tracing::error!("{m}");
                "internal server error".to_string()
            }
            other => other.message().to_string(),
        };
        Self {
            status: StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_keep_their_status() {
        let err: ApiErr = ServiceError::Forbidden("staff access required".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let err: ApiErr = ServiceError::UpstreamApi("campus listing returned 500".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_details_are_not_client_visible() {
        let err: ApiErr = ServiceError::Internal("insert report: UNIQUE constraint".into()).into();
        assert_eq!(err.message, "internal server error");
    }
}
