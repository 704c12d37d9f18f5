// Request path error types
use axum::{http::StatusCode, response::IntoResponse};

use crate::database::store::StoreError;
use crate::jsonapi::{Document, ErrorObject, ErrorSource, Reply};

/// Detail rendered for every error that is not safe to disclose
pub const INTERNAL_DETAIL: &str = "internal server error";

/// Request error with an HTTP status classification.
///
/// Every variant except `Internal` carries a message that is rendered verbatim
/// to the client. `Internal` messages are logged and replaced by a generic
/// detail when rendered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    // 400 Bad Request
    #[error("{detail}")]
    BadRequest { detail: String, pointer: Option<String> },

    // 401 Unauthorized
    #[error("{0}")]
    Unauthorized(String),

    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 405 Method Not Allowed
    #[error("{0}")]
    MethodNotAllowed(String),

    // 409 Conflict
    #[error("{0}")]
    Conflict(String),

    // 413 Payload Too Large
    #[error("{0}")]
    PayloadTooLarge(String),

    // Safe error raised by a callback at the status of its pipeline point
    #[error("{detail}")]
    Status { status: u16, detail: String },

    // 500 Internal Server Error
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest { .. } => 400,
            Error::Unauthorized(_) => 401,
            Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::Conflict(_) => 409,
            Error::PayloadTooLarge(_) => 413,
            Error::Status { status, .. } => *status,
            Error::Internal(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            Error::BadRequest { detail, .. } => detail,
            Error::Unauthorized(msg) => msg,
            Error::NotFound(msg) => msg,
            Error::MethodNotAllowed(msg) => msg,
            Error::Conflict(msg) => msg,
            Error::PayloadTooLarge(msg) => msg,
            Error::Status { detail, .. } => detail,
            Error::Internal(_) => INTERNAL_DETAIL,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }

    /// Convert to a JSON:API error object
    pub fn to_object(&self) -> ErrorObject {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        ErrorObject {
            status: status.as_u16().to_string(),
            title: status
                .canonical_reason()
                .map(|reason| reason.to_ascii_lowercase())
                .unwrap_or_default(),
            detail: Some(self.message().to_string()),
            source: match self {
                Error::BadRequest { pointer: Some(pointer), .. } => Some(ErrorSource {
                    pointer: Some(pointer.clone()),
                    parameter: None,
                }),
                _ => None,
            },
        }
    }

    /// Convert to a JSON:API error document
    pub fn to_document(&self) -> Document {
        Document::errors(vec![self.to_object()])
    }
}

// Static constructor methods
impl Error {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Error::BadRequest { detail: detail.into(), pointer: None }
    }

    pub fn bad_request_pointer(detail: impl Into<String>, pointer: impl Into<String>) -> Self {
        Error::BadRequest { detail: detail.into(), pointer: Some(pointer.into()) }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Error::MethodNotAllowed(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Error::PayloadTooLarge(message.into())
    }

    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Error::Status { status, detail: detail.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Error::conflict("document is not unique"),
            StoreError::Timeout => Error::internal("request timed out"),
            other => Error::internal(format!("store error: {}", other)),
        }
    }
}

impl From<crate::jsonapi::RequestError> for Error {
    fn from(err: crate::jsonapi::RequestError) -> Self {
        use crate::jsonapi::RequestError;

        match err {
            RequestError::NotFound(msg) => Error::not_found(msg),
            RequestError::MethodNotAllowed(msg) => Error::method_not_allowed(msg),
            other => Error::bad_request(other.to_string()),
        }
    }
}

impl From<crate::database::RecordError> for Error {
    fn from(err: crate::database::RecordError) -> Self {
        Error::internal(format!("record error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal(format!("serialization error: {}", err))
    }
}

impl From<axum::extract::rejection::BytesRejection> for Error {
    fn from(rejection: axum::extract::rejection::BytesRejection) -> Self {
        match rejection.status().as_u16() {
            413 => Error::payload_too_large("document too large"),
            status => Error::status(status, rejection.body_text()),
        }
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        Reply::error(&self).into_response()
    }
}
