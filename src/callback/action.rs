use async_trait::async_trait;
use axum::http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::CallbackError;
use crate::context::Context;
use crate::jsonapi::Reply;

/// Handler of a collection or resource action.
///
/// Resource actions find the loaded model in `ctx.model`. The raw request
/// body is available as `ctx.body`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<Reply, CallbackError>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&mut Context) -> Result<Reply, CallbackError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context) -> Result<Reply, CallbackError> {
        (self.0)(ctx)
    }
}

/// Custom endpoint registered on a controller.
#[derive(Clone)]
pub struct Action {
    pub methods: Vec<Method>,
    pub handler: Arc<dyn ActionHandler>,
    /// Maximum request body size, defaults to the configured action limit
    pub body_limit: Option<usize>,
    /// Defaults to the configured action timeout
    pub timeout: Option<Duration>,
}

impl Action {
    pub fn new(methods: &[Method], handler: impl ActionHandler + 'static) -> Self {
        Self {
            methods: methods.to_vec(),
            handler: Arc::new(handler),
            body_limit: None,
            timeout: None,
        }
    }

    /// Action backed by a synchronous closure
    pub fn sync(
        methods: &[Method],
        handler: impl Fn(&mut Context) -> Result<Reply, CallbackError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(methods, FnAction(handler))
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("methods", &self.methods)
            .field("body_limit", &self.body_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}
