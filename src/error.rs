use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{mailer::MailError, repository::RepoError};

/// Field name used for errors that are not attributable to a single input field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// FieldErrors
///
/// Field-attributed validation messages, serialized as `{"field": ["msg", ...]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// ApiError
///
/// The error taxonomy surfaced to HTTP callers. Every handler returns
/// `Result<_, ApiError>`; the `IntoResponse` impl below owns the status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or conflicting input (reserved username, bad year, duplicate review).
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    /// No credentials, or credentials that do not resolve to a live user.
    #[error("authentication credentials were not provided or are invalid")]
    NotAuthenticated,

    /// Authenticated, but the action is not allowed for this actor.
    #[error("you do not have permission to perform this action")]
    PermissionDenied,

    #[error("not found")]
    NotFound,

    /// The mail collaborator refused or failed to deliver. Never retried here.
    #[error("mail delivery failed: {0}")]
    MailDelivery(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-message validation error on one field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    /// Converts accumulated field errors into `Err` only when any were recorded.
    pub fn check(errors: FieldErrors) -> Result<(), ApiError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MailDelivery(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepoError> for ApiError {
    /// Storage constraint violations become field errors here so raw database
    /// errors never leak to the caller.
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict { constraint } => conflict_to_validation(&constraint),
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Database(e) => ApiError::Internal(e),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::MailDelivery(err.to_string())
    }
}

/// Maps a named uniqueness constraint to the field it protects.
fn conflict_to_validation(constraint: &str) -> ApiError {
    match constraint {
        "users_username_unique" => {
            ApiError::field("username", "A user with that username already exists.")
        }
        "users_email_unique" => ApiError::field("email", "A user with that email already exists."),
        "categories_slug_unique" | "genres_slug_unique" => {
            ApiError::field("slug", "An object with this slug already exists.")
        }
        "reviews_author_title_unique" => ApiError::field(
            NON_FIELD_ERRORS,
            "You have already reviewed this title.",
        ),
        other => ApiError::field(NON_FIELD_ERRORS, format!("Unique constraint violated: {other}")),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::Internal(message) => {
                // Detail stays in the logs; the caller gets a generic message.
                tracing::error!("internal error: {}", message);
                json!({ "detail": "Internal server error." })
            }
            ApiError::MailDelivery(message) => {
                tracing::error!("mail delivery failure: {}", message);
                json!({ "detail": format!("Failed to send confirmation code: {message}") })
            }
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
