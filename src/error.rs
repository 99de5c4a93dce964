use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::errors::AuthError;
use crate::users::repo::StoreError;
use crate::users::validation::{ErrorCode, FieldErrors, ValidationError};

/// Every failure a handler can end in. Each variant maps to exactly one status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AuthenticationFailed(String),
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(errors) if errors.has_code(ErrorCode::Unique) => {
                StatusCode::CONFLICT
            }
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationFailed(_) | ApiError::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => {
                warn!(%status, %errors, "validation failed");
                (status, Json(errors)).into_response()
            }
            ApiError::Internal(e) => {
                error!(error = ?e, "unexpected error");
                (
                    status,
                    Json(json!({ "detail": "An unexpected error occurred." })),
                )
                    .into_response()
            }
            other => (status, Json(json!({ "detail": other.to_string() }))).into_response(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::AuthenticationFailed(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            // Lost a race with a concurrent writer: same answer as the pre-check.
            StoreError::Duplicate(field) => {
                ApiError::Validation(FieldErrors::single(field, ErrorCode::Unique))
            }
            StoreError::NotFound(_) => ApiError::NotFound("User not found.".into()),
            StoreError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Fields(errors) => ApiError::Validation(errors),
            ValidationError::Store(e) => e.into(),
        }
    }
}
