// JSON:API wire structures: documents, parsed requests and replies

pub mod document;
pub mod reply;
pub mod request;

pub use document::{Data, Document, ErrorObject, ErrorSource, Links, Resource};
pub use reply::{Body, Reply, MEDIA_TYPE};
pub use request::{ActionNames, Intent, Request, RequestError};
