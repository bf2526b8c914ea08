use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Field name → messages, reported back to the client on validation failures.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: FieldErrors,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("CSRF token missing or invalid")]
    CsrfMismatch,

    #[error("Job status is '{current}' and cannot be changed to '{requested}'")]
    TerminalStateViolation { current: String, requested: String },

    #[error("A job cannot be created with status '{0}'")]
    TerminalOnCreate(String),

    #[error("At most {max} custom statuses are allowed")]
    StatusLimitExceeded { max: usize },

    #[error("Upstream service error: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        AppError::Validation {
            message: format!("{field}: {message}"),
            fields,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation { message, .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::DuplicateEmail => {
                (StatusCode::BAD_REQUEST, "DUPLICATE_EMAIL", self.to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                self.to_string(),
            ),
            AppError::NotLoggedIn => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::AuthenticationFailed(reason) => {
                tracing::warn!("Authentication failed: {reason}");
                (
                    StatusCode::UNAUTHORIZED,
                    "AUTHENTICATION_FAILED",
                    "Authentication failed".to_string(),
                )
            }
            AppError::CsrfMismatch => (StatusCode::FORBIDDEN, "CSRF_MISMATCH", self.to_string()),
            AppError::TerminalStateViolation { .. } => (
                StatusCode::BAD_REQUEST,
                "TERMINAL_STATE_VIOLATION",
                self.to_string(),
            ),
            AppError::TerminalOnCreate(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INITIAL_STATUS",
                self.to_string(),
            ),
            AppError::StatusLimitExceeded { .. } => (
                StatusCode::BAD_REQUEST,
                "STATUS_LIMIT_EXCEEDED",
                self.to_string(),
            ),
            AppError::Upstream { message, retryable } => {
                tracing::error!("Upstream error: {message}");
                let status = if *retryable {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                (
                    status,
                    "UPSTREAM_ERROR",
                    "The optimization service is unavailable, please retry later".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        match &self {
            AppError::Validation { fields, .. } if !fields.is_empty() => {
                error["fields"] = json!(fields);
            }
            AppError::Upstream { retryable, .. } => {
                error["retryable"] = json!(retryable);
            }
            _ => {}
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_carries_fields() {
        let (status, body) = body_json(AppError::invalid("email", "must not be empty")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["fields"]["email"][0], "must not be empty");
    }

    #[tokio::test]
    async fn test_internal_error_does_not_leak_detail() {
        let (status, body) =
            body_json(AppError::Internal(anyhow::anyhow!("connection refused at 10.0.0.3"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = body.to_string();
        assert!(!text.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_upstream_error_marks_retryable() {
        let (status, body) = body_json(AppError::Upstream {
            message: "503 from provider".to_string(),
            retryable: true,
        })
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_terminal_violation_is_bad_request() {
        let (status, body) = body_json(AppError::TerminalStateViolation {
            current: "Rejected".to_string(),
            requested: "Applied".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "TERMINAL_STATE_VIOLATION");
    }
}
