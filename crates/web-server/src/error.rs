use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use database::DbError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    /// The request could not be decoded into the expected shape.
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Converts our custom `AppError` into an HTTP response.
///
/// Rule violations keep their message; driver failures are logged and
/// replaced with a generic one.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::Database(DbError::NotFound(message)) => {
                (StatusCode::NOT_FOUND, message.to_string())
            }
            AppError::Database(DbError::Conflict(message)) => {
                (StatusCode::BAD_REQUEST, message.to_string())
            }
            AppError::Database(db_err) => {
                tracing::error!(error = ?db_err, "Database error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::Validation(message) => {
                tracing::debug!(%message, "Rejected malformed request.");
                (StatusCode::UNPROCESSABLE_ENTITY, message)
            }
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}
