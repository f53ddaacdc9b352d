use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Every failure a request can end in. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid or inaccessible path")]
    InvalidPath(PathBuf),

    #[error("Access denied")]
    AccessDenied(PathBuf),

    #[error("Path not found")]
    NotFound(PathBuf),

    #[error("Not a directory")]
    NotADirectory(PathBuf),

    #[error("{message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Thumbnail generation not supported for this format")]
    UnsupportedMediaType(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("Unable to process image")]
    Thumbnail(String),

    #[error("Shared folder store failure")]
    Storage(#[from] StoreError),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::InvalidPath(_) | ApiError::NotADirectory(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Unreadable { .. }
            | ApiError::Thumbnail(_)
            | ApiError::Storage(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a filesystem error on `path` to `NotFound` or `Unreadable`.
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error, message: &str) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound(path)
        } else {
            ApiError::Unreadable {
                path,
                message: message.to_string(),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }

        // 416 carries no body, only the size the client should have asked within.
        if let ApiError::RangeNotSatisfiable { size } = self {
            let content_range = HeaderValue::from_str(&format!("bytes */{}", size))
                .unwrap_or_else(|_| HeaderValue::from_static("bytes */0"));
            return (status, [(header::CONTENT_RANGE, content_range)]).into_response();
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors raised by the SQLite-backed shared folder store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::AccessDenied(PathBuf::from("/x")).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::InvalidRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ApiError::RangeNotSatisfiable { size: 100 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[test]
    fn test_from_io_not_found() {
        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(
            ApiError::from_io("/missing", &err, "Unable to open file"),
            ApiError::NotFound(_)
        ));

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            ApiError::from_io("/secret", &err, "Unable to open file"),
            ApiError::Unreadable { .. }
        ));
    }

    #[test]
    fn test_range_response_has_no_body_and_content_range() {
        let response = ApiError::RangeNotSatisfiable { size: 100 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */100"
        );
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
