use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::Document;
use crate::error::Error;

/// Media type of JSON:API documents
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Document(Document),
    /// Free-form JSON produced by actions
    Json(Value),
    /// Raw bytes with a content type, produced by actions
    Bytes(String, Vec<u8>),
    Empty,
}

/// Outgoing response of the framework
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Reply {
    pub fn new(status: StatusCode, body: Body) -> Self {
        Self { status, headers: HeaderMap::new(), body }
    }

    /// Respond with a JSON:API document
    pub fn document(status: StatusCode, document: Document) -> Self {
        Self::new(status, Body::Document(document))
    }

    /// Respond with plain JSON
    pub fn json(status: StatusCode, value: Value) -> Self {
        Self::new(status, Body::Json(value))
    }

    pub fn bytes(status: StatusCode, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(status, Body::Bytes(content_type.into(), bytes))
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Body::Empty)
    }

    /// Render an error as an error document
    pub fn error(err: &Error) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::document(status, err.to_document())
    }

    /// The document body, if any
    pub fn as_document(&self) -> Option<&Document> {
        match &self.body {
            Body::Document(document) => Some(document),
            _ => None,
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let (content_type, bytes) = match self.body {
            Body::Empty => {
                let mut response = self.status.into_response();
                response.headers_mut().extend(self.headers);
                return response;
            }
            Body::Document(document) => (MEDIA_TYPE.to_string(), serde_json::to_vec(&document)),
            Body::Json(value) => ("application/json".to_string(), serde_json::to_vec(&value)),
            Body::Bytes(content_type, bytes) => (content_type, Ok(bytes)),
        };

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to serialize response body: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut response = (self.status, bytes).into_response();
        let headers = response.headers_mut();
        headers.extend(self.headers);
        match HeaderValue::from_str(&content_type) {
            Ok(value) => {
                headers.insert(header::CONTENT_TYPE, value);
            }
            Err(_) => {
                tracing::warn!("Invalid content type '{}' in reply", content_type);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_errors_as_documents() {
        let reply = Reply::error(&Error::not_found("resource not found"));
        assert_eq!(reply.status, StatusCode::NOT_FOUND);

        let document = reply.as_document().unwrap();
        assert_eq!(document.errors.len(), 1);
        assert_eq!(document.errors[0].detail.as_deref(), Some("resource not found"));
    }

    #[test]
    fn sets_media_type() {
        let response = Reply::document(StatusCode::OK, Document::many(vec![])).into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], MEDIA_TYPE);

        let response = Reply::empty(StatusCode::NO_CONTENT).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
