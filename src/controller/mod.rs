// Resource controller for one model type
//
// A controller owns the request lifecycle of a single resource type: it
// maps intents to operations, runs them inside a storage transaction and
// calls the registered callbacks at the fixed pipeline points. Controllers
// are configured with a consuming builder, prepared once when added to a
// `Group` and immutable afterwards.

mod actions;
mod load;
mod operations;
mod relationships;
mod resource;

pub use resource::pagination_links;

use axum::http::StatusCode;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::callback::{Action, Callback, Matcher};
use crate::config::config;
use crate::context::Context;
use crate::error::Error;
use crate::filter::Filter;
use crate::jsonapi::{ActionNames, Document, Intent, Reply};
use crate::meta::{is_id, Flag, Kind, Meta, Model};
use crate::types::Operation;

/// Misconfiguration detected while preparing controllers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("controller for {0} registered twice")]
    DuplicateController(String),

    #[error("invalid action name '{name}' on {model}")]
    InvalidActionName { model: String, name: String },

    #[error("{model} enables {flag} but has no {kind} field flagged for it")]
    MissingFlaggedField { model: String, flag: String, kind: String },

    #[error("{model} lists unknown or unsuitable field '{field}' as {list}")]
    UnknownField { model: String, field: String, list: String },

    #[error("{model} relates to {related} which has no controller")]
    MissingRelatedController { model: String, related: String },

    #[error("{model}.{field} names inverse '{inverse}' which {related} does not store")]
    MissingInverse { model: String, field: String, inverse: String, related: String },
}

/// Controller for the resources of one model.
///
/// ```ignore
/// let posts = Controller::for_model::<Post>()
///     .filter("published")
///     .sorter("title")
///     .validator(TimestampValidator)
///     .soft_delete(true);
/// ```
pub struct Controller {
    meta: Arc<Meta>,

    /// Field names clients may filter on
    filters: Vec<String>,
    /// Field names clients may sort by
    sorters: Vec<String>,

    authorizers: Vec<Arc<dyn Callback>>,
    validators: Vec<Arc<dyn Callback>>,
    decorators: Vec<Arc<dyn Callback>>,
    notifiers: Vec<Arc<dyn Callback>>,

    /// Maximum page size, forces pagination when set
    list_limit: u64,
    document_limit: Option<usize>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,

    collection_actions: BTreeMap<String, Action>,
    resource_actions: BTreeMap<String, Action>,

    tolerate_violations: bool,
    idempotent_create: bool,
    consistent_update: bool,
    soft_delete: bool,

    supported: Matcher,
}

impl Controller {
    pub fn new(meta: Arc<Meta>) -> Self {
        Self {
            meta,
            filters: Vec::new(),
            sorters: Vec::new(),
            authorizers: Vec::new(),
            validators: Vec::new(),
            decorators: Vec::new(),
            notifiers: Vec::new(),
            list_limit: 0,
            document_limit: None,
            read_timeout: None,
            write_timeout: None,
            collection_actions: BTreeMap::new(),
            resource_actions: BTreeMap::new(),
            tolerate_violations: false,
            idempotent_create: false,
            consistent_update: false,
            soft_delete: false,
            supported: Matcher::all(),
        }
    }

    pub fn for_model<T: Model>() -> Self {
        Self::new(T::meta())
    }

    // ========================================
    // Builder
    // ========================================

    pub fn filter(mut self, field: &str) -> Self {
        self.filters.push(field.to_string());
        self
    }

    pub fn sorter(mut self, field: &str) -> Self {
        self.sorters.push(field.to_string());
        self
    }

    pub fn authorizer(mut self, callback: impl Callback + 'static) -> Self {
        self.authorizers.push(Arc::new(callback));
        self
    }

    pub fn validator(mut self, callback: impl Callback + 'static) -> Self {
        self.validators.push(Arc::new(callback));
        self
    }

    pub fn decorator(mut self, callback: impl Callback + 'static) -> Self {
        self.decorators.push(Arc::new(callback));
        self
    }

    pub fn notifier(mut self, callback: impl Callback + 'static) -> Self {
        self.notifiers.push(Arc::new(callback));
        self
    }

    pub fn list_limit(mut self, limit: u64) -> Self {
        self.list_limit = limit;
        self
    }

    pub fn document_limit(mut self, limit: usize) -> Self {
        self.document_limit = Some(limit);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn collection_action(mut self, name: &str, action: Action) -> Self {
        self.collection_actions.insert(name.to_string(), action);
        self
    }

    pub fn resource_action(mut self, name: &str, action: Action) -> Self {
        self.resource_actions.insert(name.to_string(), action);
        self
    }

    /// Drop non-writable attributes and relationships from inbound
    /// documents instead of rejecting them
    pub fn tolerate_violations(mut self, enabled: bool) -> Self {
        self.tolerate_violations = enabled;
        self
    }

    pub fn idempotent_create(mut self, enabled: bool) -> Self {
        self.idempotent_create = enabled;
        self
    }

    pub fn consistent_update(mut self, enabled: bool) -> Self {
        self.consistent_update = enabled;
        self
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    /// Restrict the operations the controller accepts
    pub fn supported(mut self, matcher: Matcher) -> Self {
        self.supported = matcher;
        self
    }

    // ========================================
    // Preparation
    // ========================================

    /// Apply defaults and check the configuration against the descriptor.
    pub(crate) fn prepare(&mut self) -> Result<(), ConfigError> {
        let defaults = &config().controller;

        self.document_limit.get_or_insert(defaults.document_limit);
        self.read_timeout.get_or_insert(defaults.read_timeout());
        self.write_timeout.get_or_insert(defaults.write_timeout());

        for (name, action) in self.collection_actions.iter_mut().chain(self.resource_actions.iter_mut()) {
            let reserved = name.is_empty()
                || name == "relationships"
                || is_id(name)
                || self.meta.relationship(name).is_some();
            if reserved {
                return Err(ConfigError::InvalidActionName {
                    model: self.meta.name.clone(),
                    name: name.clone(),
                });
            }

            action.body_limit.get_or_insert(defaults.action_body_limit);
            action.timeout.get_or_insert(defaults.action_timeout());
        }

        if self.soft_delete {
            self.check_flag(Flag::SoftDelete, Kind::Timestamp, true)?;
        }
        if self.idempotent_create {
            self.check_flag(Flag::IdempotentCreate, Kind::String, false)?;
        }
        if self.consistent_update {
            self.check_flag(Flag::ConsistentUpdate, Kind::String, false)?;
        }

        for field in self.meta.fields() {
            if field.filterable && !self.filters.contains(&field.name) {
                self.filters.push(field.name.clone());
            }
            if field.sortable && !self.sorters.contains(&field.name) {
                self.sorters.push(field.name.clone());
            }
        }

        for name in &self.filters {
            let filterable = self.meta.field(name).map(|field| {
                field.storage_name.is_some() && field.is_exposed()
            });
            if filterable != Some(true) {
                return Err(self.unknown_field(name, "filter"));
            }
        }

        for name in &self.sorters {
            let sortable = self.meta.field(name).map(|field| {
                field.storage_name.is_some() && field.attribute.is_some()
            });
            if sortable != Some(true) {
                return Err(self.unknown_field(name, "sorter"));
            }
        }

        tracing::debug!(
            "Prepared controller for {} ({} filters, {} sorters, {} actions)",
            self.meta.plural_name,
            self.filters.len(),
            self.sorters.len(),
            self.collection_actions.len() + self.resource_actions.len()
        );

        Ok(())
    }

    fn check_flag(&self, flag: Flag, kind: Kind, optional: bool) -> Result<(), ConfigError> {
        let valid = self
            .meta
            .flagged(flag)
            .map(|field| field.kind == kind && field.optional == optional && field.storage_name.is_some())
            .unwrap_or(false);

        if valid {
            Ok(())
        } else {
            Err(ConfigError::MissingFlaggedField {
                model: self.meta.name.clone(),
                flag: format!("{:?}", flag),
                kind: format!("{}{:?}", if optional { "optional " } else { "" }, kind),
            })
        }
    }

    fn unknown_field(&self, field: &str, list: &str) -> ConfigError {
        ConfigError::UnknownField {
            model: self.meta.name.clone(),
            field: field.to_string(),
            list: list.to_string(),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    /// Registered action names, needed to parse request paths
    pub fn action_names(&self) -> ActionNames {
        ActionNames {
            collection: self.collection_actions.keys().cloned().collect(),
            resource: self.resource_actions.keys().cloned().collect(),
        }
    }

    /// Largest request body any operation of this controller accepts
    pub(crate) fn body_limit(&self) -> usize {
        let defaults = &config().controller;
        self.collection_actions
            .values()
            .chain(self.resource_actions.values())
            .map(|action| action.body_limit.unwrap_or(defaults.action_body_limit))
            .fold(self.document_limit.unwrap_or(defaults.document_limit), usize::max)
    }

    /// Condition excluding soft deleted documents, if soft delete is enabled
    pub fn soft_delete_filter(&self) -> Option<Filter> {
        if !self.soft_delete {
            return None;
        }
        self.meta
            .flagged(Flag::SoftDelete)
            .and_then(|field| field.storage_name.clone())
            .map(Filter::missing)
    }

    // ========================================
    // Dispatch
    // ========================================

    /// Handle a request in the given context.
    ///
    /// Top level requests open a transaction that is committed only when the
    /// operation succeeds. Nested contexts reuse the session of their parent
    /// and only leave their result in the context. The `selector` seeds the
    /// base query of the operation.
    pub fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        selector: Option<Vec<Filter>>,
        write: bool,
    ) -> BoxFuture<'a, Result<Option<Reply>, Error>> {
        Box::pin(async move {
            let intent = ctx.request.intent;

            if intent.document_expected() {
                if ctx.body.len() > self.document_limit.unwrap_or(config().controller.document_limit) {
                    return Err(Error::payload_too_large("document too large"));
                }
                ctx.document = Some(Document::parse(&ctx.body)?);
            }

            if !ctx.request.has_valid_id() {
                return Err(Error::bad_request("invalid resource id"));
            }

            ctx.operation = operation_for(intent);
            if !self.supported.matches(ctx) {
                return Err(Error::method_not_allowed("unsupported operation"));
            }

            ctx.selector = selector.unwrap_or_default();
            ctx.filters.clear();
            ctx.relationship_filters.clear();
            ctx.readable_fields = self.initial_fields(&ctx.request, true)?;
            ctx.writable_fields = self.initial_fields(&ctx.request, false)?;

            if ctx.is_nested() {
                tracing::debug!("Nested {} {} ({})", self.meta.plural_name, intent, ctx.operation);
            } else {
                tracing::info!("Handling {} {} ({})", self.meta.plural_name, intent, ctx.operation);
            }

            if ctx.operation.is_action() {
                ctx.session = Some(ctx.store().session().await?);
                let result = self.run_action(ctx).await;
                ctx.session = None;
                return result.map(Some);
            }

            if ctx.is_nested() {
                self.run_operation(ctx).await?;
            } else {
                ctx.session = Some(ctx.store().begin().await?);
                let result = deadline(self.timeout_for(intent), self.run_operation(ctx)).await;
                let session = ctx.session.take();
                result?;
                if let Some(session) = session {
                    session.commit().await?;
                }
            }

            if !write {
                return Ok(None);
            }

            let reply = match ctx.response.take() {
                Some(document) => Reply::document(ctx.response_code, document),
                None => Reply::empty(ctx.response_code),
            };
            Ok(Some(reply))
        })
    }

    async fn run_operation(&self, ctx: &mut Context) -> Result<(), Error> {
        match ctx.request.intent {
            Intent::ListResources => self.list(ctx).await,
            Intent::FindResource => self.find(ctx).await,
            Intent::CreateResource => self.create(ctx).await,
            Intent::UpdateResource => self.update(ctx).await,
            Intent::DeleteResource => self.delete(ctx).await,
            Intent::GetRelatedResources => self.get_related_resources(ctx).await,
            Intent::GetRelationship => self.get_relationship(ctx).await,
            Intent::SetRelationship => self.set_relationship(ctx).await,
            Intent::AppendToRelationship => self.modify_relationship(ctx, true).await,
            Intent::RemoveFromRelationship => self.modify_relationship(ctx, false).await,
            Intent::CollectionAction | Intent::ResourceAction => {
                Err(Error::internal("actions cannot run as operations"))
            }
        }
    }

    fn timeout_for(&self, intent: Intent) -> Option<Duration> {
        if operation_for(intent).is_read() {
            self.read_timeout
        } else {
            self.write_timeout
        }
    }

    fn respond(&self, ctx: &mut Context, status: StatusCode, document: Option<Document>) {
        ctx.response = document;
        ctx.response_code = status;
    }
}

/// Operation used for callbacks and permissions of an intent
pub(crate) fn operation_for(intent: Intent) -> Operation {
    match intent {
        Intent::ListResources => Operation::List,
        Intent::FindResource | Intent::GetRelatedResources | Intent::GetRelationship => Operation::Find,
        Intent::CreateResource => Operation::Create,
        Intent::UpdateResource
        | Intent::SetRelationship
        | Intent::AppendToRelationship
        | Intent::RemoveFromRelationship => Operation::Update,
        Intent::DeleteResource => Operation::Delete,
        Intent::CollectionAction => Operation::CollectionAction,
        Intent::ResourceAction => Operation::ResourceAction,
    }
}

/// Bound a future by an optional timeout
pub(crate) async fn deadline<T>(
    limit: Option<Duration>,
    future: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| Error::internal("request timed out"))?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn meta() -> Arc<Meta> {
        Arc::new(
            Meta::build("Post", "posts")
                .attribute("title", Kind::String)
                .filterable()
                .attribute("token", Kind::String)
                .hidden("deleted_at", Kind::Timestamp)
                .optional()
                .flag(Flag::SoftDelete)
                .to_one("author", "users")
                .has_many("comments", "comments", "post")
                .finish()
                .unwrap(),
        )
    }

    fn noop() -> Action {
        Action::sync(&[Method::POST], |_| Ok(Reply::empty(StatusCode::OK)))
    }

    #[test]
    fn maps_intents_to_operations() {
        assert_eq!(operation_for(Intent::GetRelatedResources), Operation::Find);
        assert_eq!(operation_for(Intent::AppendToRelationship), Operation::Update);
        assert_eq!(operation_for(Intent::ResourceAction), Operation::ResourceAction);
    }

    #[test]
    fn prepares_defaults_and_whitelists() {
        let mut controller = Controller::new(meta()).collection_action("stats", noop());
        controller.prepare().unwrap();

        assert_eq!(controller.filters, vec!["title"]);
        assert!(controller.document_limit.is_some());
        assert!(controller.read_timeout.is_some());
        assert!(controller.collection_actions["stats"].body_limit.is_some());
        assert_eq!(controller.action_names().collection, vec!["stats"]);
    }

    #[test]
    fn rejects_reserved_action_names() {
        for name in ["", "relationships", "comments", "6f1c7a1e-34a4-4b4e-9a55-1d1e0f6f3c10"] {
            let mut controller = Controller::new(meta()).resource_action(name, noop());
            assert!(matches!(controller.prepare(), Err(ConfigError::InvalidActionName { .. })), "{}", name);
        }
    }

    #[test]
    fn checks_flagged_fields() {
        let mut controller = Controller::new(meta()).soft_delete(true);
        assert!(controller.prepare().is_ok());
        assert!(controller.soft_delete_filter().is_some());

        let mut controller = Controller::new(meta()).consistent_update(true);
        assert!(matches!(controller.prepare(), Err(ConfigError::MissingFlaggedField { .. })));
    }

    #[test]
    fn rejects_unknown_filters_and_sorters() {
        let mut controller = Controller::new(meta()).filter("nope");
        assert!(matches!(controller.prepare(), Err(ConfigError::UnknownField { .. })));

        let mut controller = Controller::new(meta()).sorter("author");
        assert!(matches!(controller.prepare(), Err(ConfigError::UnknownField { .. })));

        let mut controller = Controller::new(meta()).filter("comments");
        assert!(matches!(controller.prepare(), Err(ConfigError::UnknownField { .. })));
    }

    #[tokio::test]
    async fn deadline_times_out() {
        let result: Result<(), Error> = deadline(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(Error::internal("request timed out")));
    }
}
