//! Error types for the Lectio server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::epub::EpubError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("EPUB error: {0}")]
    Epub(#[from] EpubError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
///
/// Every failed request answers with `{success: false, error, details?}`.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Epub(e) => {
                let status = match e {
                    EpubError::MalformedArchive(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    EpubError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    EpubError::ChapterNotFound { .. } => StatusCode::NOT_FOUND,
                    EpubError::ChapterContentMissing(_) => StatusCode::NOT_FOUND,
                    EpubError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match e {
                    EpubError::MalformedArchive(_) => "Failed to process EPUB file".to_string(),
                    EpubError::UnsupportedFileType(_) => "Only EPUB files are accepted".to_string(),
                    EpubError::ChapterNotFound { .. } => "Chapter not found".to_string(),
                    EpubError::ChapterContentMissing(_) => "Chapter content not found".to_string(),
                    EpubError::Io(_) => "IO error".to_string(),
                };
                if status.is_server_error() {
                    tracing::error!("EPUB error: {}", e);
                } else {
                    tracing::warn!("EPUB error: {}", e);
                }
                (status, message, Some(e.to_string()))
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Serialization error".to_string(),
                    None,
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: message,
            details,
        });

        (status, body).into_response()
    }
}
