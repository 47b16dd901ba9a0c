//! Error taxonomy of the HTTP layer and the `Notice` redirect response.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    /// A single field rejected after looking at stored state (e.g. email taken).
    #[error("{message}")]
    Field {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("login required")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Field {
            field,
            message: message.into(),
        }
    }
}

/// JSON problem body returned for every error.
#[derive(Debug, Serialize)]
struct ErrorBody {
    title: &'static str,
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, errors) = match &self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "There were validation errors with your request.",
                Some(parse_validation_errors(errors)),
            ),
            ApiError::Field { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "There were validation errors with your request.",
                Some(vec![FieldError {
                    field: field.to_string(),
                    message: message.clone(),
                }]),
            ),
            ApiError::Json(rejection) => (rejection.status(), "Malformed request body.", None),
            ApiError::Multipart(rejection) => (rejection.status(), "Malformed upload.", None),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid username or password.",
                None,
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Please log in to access this page.",
                None,
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You don't have permission to do that.",
                None,
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found.", None),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "server returned 500 status");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.", None)
            }
        };

        let detail = match &self {
            ApiError::Internal(_) => String::new(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            title,
            status: status.as_u16(),
            detail,
            errors,
        };

        (status, Json(body)).into_response()
    }
}

/// A user-facing message plus where to go next, sent as `303 See Other`.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub message: String,
    pub location: String,
}

impl Notice {
    pub fn new(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: location.into(),
        }
    }
}

impl IntoResponse for Notice {
    fn into_response(self) -> Response {
        (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, self.location.clone())],
            Json(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_is_a_see_other_redirect() {
        let response = Notice::new("Done.", "/login").into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::field("email", "Email already registered.").into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
