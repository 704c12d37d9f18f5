use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::error::CallbackError;
use crate::context::Context;
use crate::types::Operation;

/// Pipeline points at which callbacks run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Authorizer, // before loading, after the base query is set
    Validator,  // after input is assigned, before persisting
    Decorator,  // after loading or persisting
    Notifier,   // after the response is composed
    Action,     // action handlers
}

impl Stage {
    /// Status used to render safe errors raised at this stage
    pub fn status(&self) -> u16 {
        match self {
            Stage::Authorizer => 401,
            Stage::Validator | Stage::Action => 400,
            Stage::Decorator | Stage::Notifier => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Authorizer => "authorizer",
            Stage::Validator => "validator",
            Stage::Decorator => "decorator",
            Stage::Notifier => "notifier",
            Stage::Action => "action",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over a request context. Gates callbacks and decides which
/// operations a controller supports.
#[derive(Clone)]
pub struct Matcher(Arc<dyn Fn(&Context) -> bool + Send + Sync>);

impl Matcher {
    /// Match every request
    pub fn all() -> Self {
        Self(Arc::new(|_| true))
    }

    /// Match the listed operations
    pub fn only(operations: &[Operation]) -> Self {
        let operations = operations.to_vec();
        Self(Arc::new(move |ctx| operations.contains(&ctx.operation)))
    }

    /// Match everything but the listed operations
    pub fn except(operations: &[Operation]) -> Self {
        let operations = operations.to_vec();
        Self(Arc::new(move |ctx| !operations.contains(&ctx.operation)))
    }

    pub fn custom(predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, ctx: &Context) -> bool {
        (self.0)(ctx)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matcher")
    }
}

/// Hook run by a controller at one of its pipeline points.
///
/// A callback may mutate the context (add filters, change the model, set
/// data for later callbacks) or fail the request. Safe errors are shown to
/// the client with the status of the stage the callback is registered at.
#[async_trait]
pub trait Callback: Send + Sync {
    /// Name for logging and debugging
    fn name(&self) -> &str;

    /// Whether the callback applies to this request
    fn matches(&self, _ctx: &Context) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError>;
}

type Handler = dyn Fn(&mut Context) -> Result<(), CallbackError> + Send + Sync;

/// Callback built from a synchronous closure
pub struct FnCallback {
    name: String,
    matcher: Matcher,
    handler: Box<Handler>,
}

#[async_trait]
impl Callback for FnCallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, ctx: &Context) -> bool {
        self.matcher.matches(ctx)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        (self.handler)(ctx)
    }
}

/// Wrap a closure as a callback.
///
/// ```ignore
/// let cb = callback("require-title", Matcher::only(&[Operation::Create]), |ctx| {
///     match ctx.model.as_ref().and_then(|m| m.get_str("title")) {
///         Some("") | None => Err(CallbackError::safe("title is required")),
///         _ => Ok(()),
///     }
/// });
/// ```
pub fn callback(
    name: &str,
    matcher: Matcher,
    handler: impl Fn(&mut Context) -> Result<(), CallbackError> + Send + Sync + 'static,
) -> FnCallback {
    FnCallback {
        name: name.to_string(),
        matcher,
        handler: Box::new(handler),
    }
}
