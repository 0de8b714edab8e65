//! Error types for the dataset export service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Dataset export errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or empty request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The (project, form) scope does not exist
    #[error("Form not found: projects/{project_id}/forms/{form_id}")]
    FormNotFound { project_id: String, form_id: String },

    /// A listed record could not be found when fetched
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Reading a single record failed
    #[error("Failed to fetch record '{record_id}': {message}")]
    RecordFetch { record_id: String, message: String },

    /// Object storage reported the path missing
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// A classified file reference points at a missing object
    #[error("Referenced file not found: {0}")]
    ReferenceNotFound(String),

    /// A classified file reference could not be downloaded
    #[error("Failed to fetch referenced file '{path}': {message}")]
    ReferenceFetch { path: String, message: String },

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Archive encoder error
    #[error("Compression error: {0}")]
    Compression(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[cfg(feature = "gcp")]
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a record fetch error
    pub fn record_fetch(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecordFetch {
            record_id: record_id.into(),
            message: message.into(),
        }
    }

    /// Create a reference fetch error
    pub fn reference_fetch(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReferenceFetch {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a compression error
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status and response text for this error
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid Request"),
            Error::Compression(_) => (StatusCode::BAD_REQUEST, "Compression Error"),
            Error::FormNotFound { .. } => (StatusCode::NOT_FOUND, "Form Not Found"),
            Error::RecordNotFound(_) | Error::RecordFetch { .. } => {
                (StatusCode::BAD_GATEWAY, "Record Fetch Error")
            }
            Error::ObjectNotFound(_)
            | Error::ReferenceNotFound(_)
            | Error::ReferenceFetch { .. } => (StatusCode::BAD_GATEWAY, "Reference Fetch Error"),
            #[cfg(feature = "gcp")]
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "Upstream Error"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration Error"),
            Error::Storage(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage Error")
            }
            Error::Json(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error")
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        tracing::error!("Dataset generation failed ({}): {}", status, self);
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_map_to_bad_request() {
        let (status, message) = Error::InvalidRequest("project_id".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Invalid Request");

        let (status, message) = Error::compression("deflate failed").status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Compression Error");
    }

    #[test]
    fn test_fetch_errors_map_to_bad_gateway() {
        let (status, _) = Error::record_fetch("r1", "timeout").status_and_message();
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = Error::ReferenceNotFound("private/images/a.jpg".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_local_errors_map_to_server_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let (status, message) = Error::from(io).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Storage Error");

        let (status, message) = Error::internal("encoder panicked").status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal Error");
    }
}
