// Per-request state flowing through a controller pipeline
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::database::{Record, Session, Store};
use crate::error::Error;
use crate::filter::{Filter, Sort};
use crate::group::Group;
use crate::jsonapi::{Document, Request};
use crate::types::Operation;

/// Request context.
///
/// Created once per inbound request and owned by it. Relationship traversal
/// runs nested sub-contexts that borrow the parent's storage session and
/// therefore its transaction.
pub struct Context {
    /// Operation derived from the request intent
    pub operation: Operation,
    pub method: Method,
    pub request: Request,
    /// Parsed request document, for intents that carry one
    pub document: Option<Document>,
    pub headers: HeaderMap,
    /// Raw request body
    pub body: Bytes,

    /// Base query constraints such as the resource id
    pub selector: Vec<Filter>,
    /// Additional constraints from filter parameters and authorizers
    pub filters: Vec<Filter>,
    /// Constraints applied when resolving has-one and has-many relationships,
    /// keyed by field name
    pub relationship_filters: HashMap<String, Vec<Filter>>,
    pub sorting: Vec<Sort>,

    /// Field names that may be read for this request
    pub readable_fields: Vec<String>,
    /// Field names that may be written for this request
    pub writable_fields: Vec<String>,

    pub model: Option<Record>,
    pub models: Vec<Record>,
    /// Stored version of the model, captured on Update
    pub original: Option<Record>,

    pub response: Option<Document>,
    pub response_code: StatusCode,

    /// Free-form values shared between callbacks
    pub data: HashMap<String, Value>,

    pub(crate) session: Option<Box<dyn Session>>,
    /// Set on sub-requests that resolve relationships of a parent resource
    pub(crate) preload: bool,
    nested: bool,
    group: Arc<Group>,
}

impl Context {
    pub(crate) fn new(group: Arc<Group>, method: Method, request: Request, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            operation: Operation::List,
            method,
            request,
            document: None,
            headers,
            body,
            selector: Vec::new(),
            filters: Vec::new(),
            relationship_filters: HashMap::new(),
            sorting: Vec::new(),
            readable_fields: Vec::new(),
            writable_fields: Vec::new(),
            model: None,
            models: Vec::new(),
            original: None,
            response: None,
            response_code: StatusCode::OK,
            data: HashMap::new(),
            session: None,
            preload: false,
            nested: false,
            group,
        }
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.group.store()
    }

    /// Storage session of the request. Non-action operations run inside a
    /// transaction, actions get an autocommit session.
    pub fn session(&mut self) -> Result<&mut (dyn Session + 'static), Error> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| Error::internal("no storage session"))
    }

    /// Selector and filters combined
    pub fn query(&self) -> Filter {
        Filter::and(self.selector.iter().chain(self.filters.iter()).cloned().collect())
    }

    /// Whether this context serves a sub-request of another controller
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn record(&self) -> Result<&Record, Error> {
        self.model.as_ref().ok_or_else(|| Error::internal("no model loaded"))
    }

    pub fn record_mut(&mut self) -> Result<&mut Record, Error> {
        self.model.as_mut().ok_or_else(|| Error::internal("no model loaded"))
    }

    /// Derive a context for a virtual request. The session moves to the
    /// child and must be handed back with `restore`.
    pub(crate) fn sub_context(&mut self, request: Request) -> Context {
        let mut sub = Context::new(
            self.group.clone(),
            Method::GET,
            request,
            self.headers.clone(),
            Bytes::new(),
        );
        sub.data = self.data.clone();
        sub.session = self.session.take();
        sub.nested = true;
        sub
    }

    pub(crate) fn restore(&mut self, sub: &mut Context) {
        self.session = sub.session.take();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("operation", &self.operation)
            .field("request", &self.request)
            .field("selector", &self.selector)
            .field("filters", &self.filters)
            .field("sorting", &self.sorting)
            .field("readable_fields", &self.readable_fields)
            .field("writable_fields", &self.writable_fields)
            .field("response_code", &self.response_code)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}
