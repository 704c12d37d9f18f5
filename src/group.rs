// Registry of controllers and the request boundary
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit},
    http::{HeaderMap, Method, Uri},
    Router,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::config;
use crate::context::Context;
use crate::controller::{ConfigError, Controller};
use crate::database::Store;
use crate::error::Error;
use crate::jsonapi::{Reply, Request};

/// Inbound HTTP request as seen by the group
#[derive(Debug, Clone, Default)]
pub struct Incoming {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Incoming {
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };

        Self {
            method,
            path: path.to_string(),
            query,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Controllers keyed by resource type, sharing one store.
///
/// Controllers resolve each other through the group when traversing
/// relationships.
///
/// ```ignore
/// let mut group = Group::new(Arc::new(MemoryStore::new()));
/// group.add(posts)?.add(comments)?;
/// let group = group.finish()?;
/// let app = group.endpoint("/api");
/// ```
pub struct Group {
    store: Arc<dyn Store>,
    controllers: HashMap<String, Arc<Controller>>,
}

impl Group {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            controllers: HashMap::new(),
        }
    }

    /// Prepare and register a controller
    pub fn add(&mut self, mut controller: Controller) -> Result<&mut Self, ConfigError> {
        controller.prepare()?;

        let resource_type = controller.meta().plural_name.clone();
        if self.controllers.contains_key(&resource_type) {
            return Err(ConfigError::DuplicateController(resource_type));
        }

        tracing::debug!("Registered controller for {}", resource_type);
        self.controllers.insert(resource_type, Arc::new(controller));
        Ok(self)
    }

    /// Check that every relationship can be resolved and freeze the group
    pub fn finish(self) -> Result<Arc<Self>, ConfigError> {
        for controller in self.controllers.values() {
            let meta = controller.meta();

            for field in meta.relationships() {
                let Some(rel) = &field.relationship else {
                    continue;
                };

                let related = self.controllers.get(&rel.related_type).ok_or_else(|| {
                    ConfigError::MissingRelatedController {
                        model: meta.name.clone(),
                        related: rel.related_type.clone(),
                    }
                })?;

                if let Some(inverse) = rel.cardinality.inverse() {
                    let stored = related
                        .meta()
                        .relationship(inverse)
                        .and_then(|field| field.relationship.as_ref())
                        .map(|inverse| inverse.cardinality.is_stored())
                        .unwrap_or(false);

                    if !stored {
                        return Err(ConfigError::MissingInverse {
                            model: meta.name.clone(),
                            field: field.name.clone(),
                            inverse: inverse.to_string(),
                            related: rel.related_type.clone(),
                        });
                    }
                }
            }
        }

        tracing::info!("Controller group ready with {} resource types", self.controllers.len());
        Ok(Arc::new(self))
    }

    pub fn controller(&self, resource_type: &str) -> Option<Arc<Controller>> {
        self.controllers.get(resource_type).cloned()
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Handle a request and render every failure as an error document.
    pub async fn handle(self: &Arc<Self>, prefix: &str, incoming: Incoming) -> Reply {
        match self.dispatch(prefix, incoming).await {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_internal() {
                    tracing::error!("Request failed: {}", err);
                } else {
                    tracing::debug!("Request rejected with {}: {}", err.status_code(), err.message());
                }
                Reply::error(&err)
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, prefix: &str, incoming: Incoming) -> Result<Reply, Error> {
        let resource_type = Request::resource_type(&incoming.path, prefix)?;
        let controller = self
            .controller(&resource_type)
            .ok_or_else(|| Error::not_found("resource type not found"))?;

        let request = Request::parse(
            &incoming.method,
            &incoming.path,
            incoming.query.as_deref(),
            prefix,
            &controller.action_names(),
        )?;

        let mut ctx = Context::new(self.clone(), incoming.method, request, incoming.headers, incoming.body);
        let reply = controller.handle(&mut ctx, None, true).await?;

        Ok(reply.unwrap_or_else(|| Reply::empty(ctx.response_code)))
    }

    /// Largest request body accepted by any controller of the group
    pub fn body_limit(&self) -> usize {
        self.controllers
            .values()
            .map(|controller| controller.body_limit())
            .max()
            .unwrap_or(config().controller.document_limit)
    }

    /// Router answering every path below `prefix` with the group.
    ///
    /// Bodies are read up to the largest limit of the group; the controllers
    /// then apply their own limits.
    pub fn endpoint(self: Arc<Self>, prefix: &str) -> Router {
        let prefix = prefix.to_string();
        let limit = self.body_limit();

        Router::new()
            .fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Result<Bytes, BytesRejection>| {
                let group = self.clone();
                let prefix = prefix.clone();
                async move {
                    let body = match body {
                        Ok(body) => body,
                        Err(rejection) => return Reply::error(&Error::from(rejection)),
                    };
                    let incoming = Incoming {
                        method,
                        path: uri.path().to_string(),
                        query: uri.query().map(str::to_string),
                        headers,
                        body,
                    };
                    group.handle(&prefix, incoming).await
                }
            })
            .layer(DefaultBodyLimit::max(limit))
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.controllers.keys().collect();
        types.sort();
        f.debug_struct("Group").field("controllers", &types).finish()
    }
}
