//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fieldhq_lifecycle::LifecycleError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Internal details stay in the logs
            ApiError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::OrgNotFound(_) => ApiError::NotFound,
            LifecycleError::NoAdminUser(msg) => {
                ApiError::BadRequest(format!("No admin user for organisation: {msg}"))
            }
            LifecycleError::InvalidPlan(msg) | LifecycleError::InvalidInput(msg) => {
                ApiError::BadRequest(msg)
            }
            LifecycleError::ConfirmationMismatch => {
                ApiError::BadRequest(err.to_string())
            }
            e @ LifecycleError::PendingDowngradeConflict { .. }
            | e @ LifecycleError::SeatCapacityBelowUsage { .. }
            | e @ LifecycleError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            LifecycleError::Database(msg) => ApiError::Database(msg),
            LifecycleError::Transport(msg) | LifecycleError::Internal(msg) => {
                tracing::error!(error = %msg, "Lifecycle failure");
                ApiError::Internal
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_errors_map_to_http_statuses() {
        let cases = [
            (
                ApiError::from(LifecycleError::OrgNotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(LifecycleError::ConfirmationMismatch),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LifecycleError::InvalidTransition {
                    action: "cancel".into(),
                    state: "cancelled".into(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(LifecycleError::Transport("smtp down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
