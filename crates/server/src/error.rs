//! Unified error handling for the server.
//!
//! Handlers return `Result<_, AppError>`. Client-caused failures become JSON
//! bodies the dashboard can show directly; everything else is logged, sent
//! to Sentry, and reported as a generic 500.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use stockroom_core::ValidationErrors;

use crate::db::RepositoryError;
use crate::services::{AuthError, SessionError};

/// Alert shown for any failed sign-in.
pub const AUTH_FAILURE_ALERT: &str = "Invalid email or password.";

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials. Never says which half was wrong.
    #[error("invalid credentials")]
    AuthFailure,

    /// No live session.
    #[error("unauthorized")]
    Unauthorized,

    /// Absent, or outside the caller's store. The two are indistinguishable.
    #[error("not found")]
    NotFound,

    /// Field-level validation failure listing every violated field.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Missing or mismatched forgery protection token.
    #[error("invalid authenticity token")]
    InvalidAuthenticityToken,

    /// A row lock could not be acquired in time, even after a retry.
    #[error("concurrency timeout")]
    ConcurrencyTimeout,

    /// Storage failure.
    #[error("database error: {0}")]
    Repository(RepositoryError),

    /// Session store failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Invalid(errors) => Self::Validation(errors),
            RepositoryError::LockTimeout => Self::ConcurrencyTimeout,
            RepositoryError::Conflict(message) => {
                Self::Validation(ValidationErrors::single("base", message))
            }
            other => Self::Repository(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::AuthFailure,
            AuthError::Invalid(errors) => Self::Validation(errors),
            AuthError::Repository(e) => e.into(),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::AuthFailure => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "alert": AUTH_FAILURE_ALERT })),
            )
                .into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "You need to sign in before continuing." })),
            )
                .into_response(),
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
            }
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "errors": errors.full_messages(),
                    "fields": errors.by_field(),
                })),
            )
                .into_response(),
            Self::InvalidAuthenticityToken => {
                tracing::warn!("rejected request with invalid authenticity token");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "Invalid authenticity token" })),
                )
                    .into_response()
            }
            Self::ConcurrencyTimeout => {
                tracing::warn!("row lock wait exhausted");
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "The product is busy. Please try again." })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                response
            }
            Self::Repository(_) | Self::Session(_) | Self::Internal(_) => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Request error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Set the Sentry user context from an identity.
pub fn set_sentry_user(user_id: i32, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_repository_errors_map_to_request_errors() {
        assert!(matches!(
            AppError::from(RepositoryError::NotFound),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(RepositoryError::LockTimeout),
            AppError::ConcurrencyTimeout
        ));
        assert!(matches!(
            AppError::from(RepositoryError::DataCorruption("bad".into())),
            AppError::Repository(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::InvalidCredentials),
            AppError::AuthFailure
        ));
    }

    #[tokio::test]
    async fn test_auth_failure_body() {
        let response = AppError::AuthFailure.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await,
            json!({ "alert": "Invalid email or password." })
        );
    }

    #[tokio::test]
    async fn test_validation_body_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "can't be blank");
        errors.add("sku", "has already been taken");

        let response = AppError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(
            body["errors"],
            json!(["Name can't be blank", "Sku has already been taken"])
        );
        assert_eq!(body["fields"]["sku"], json!(["has already been taken"]));
    }

    #[test]
    fn test_concurrency_timeout_is_retryable() {
        let response = AppError::ConcurrencyTimeout.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(get_status(AppError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_status(AppError::InvalidAuthenticityToken),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Internal("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
