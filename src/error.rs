//! Error types for the file storage agent

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::connector::ConnectorError;
use crate::protocol::ProtocolError;
use crate::uploader::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("S3 error: {0}")]
    Storage(#[from] StorageError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Storage-specific errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

impl StorageError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionFailed(_) | StorageError::Timeout(_) | StorageError::SdkError(_)
        )
    }
}

/// Message channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Message channel closed")]
    ChannelClosed,

    #[error("No handler for recipient: {0}")]
    UnknownRecipient(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Protocol(e) => {
                tracing::warn!("Rejected message: {}", e);
                (StatusCode::BAD_REQUEST, "invalid_message", e.to_string())
            }
            AppError::Runtime(RuntimeError::ChannelClosed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "Agent is shutting down".to_string(),
            ),
            AppError::Runtime(RuntimeError::UnknownRecipient(to)) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Unknown recipient: {}", to),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                match e {
                    StorageError::ObjectNotFound(key) => (
                        StatusCode::NOT_FOUND,
                        "not_found",
                        format!("Object not found: {}", key),
                    ),
                    StorageError::BucketNotFound(bucket) => (
                        StatusCode::NOT_FOUND,
                        "not_found",
                        format!("Bucket not found: {}", bucket),
                    ),
                    StorageError::AccessDenied(_) => (
                        StatusCode::FORBIDDEN,
                        "access_denied",
                        "Access denied".to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    ),
                }
            }
            AppError::Connector(e) => {
                tracing::error!("Connector error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "connector_error",
                    "Connector error".to_string(),
                )
            }
            AppError::Upload(e) => {
                tracing::error!("Upload error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upload_error",
                    "Upload error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
