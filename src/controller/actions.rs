// Collection and resource actions
use std::time::Instant;

use super::{deadline, Controller};
use crate::callback::{run_callbacks, Stage};
use crate::config::config;
use crate::context::Context;
use crate::error::Error;
use crate::jsonapi::Reply;
use crate::types::Operation;

impl Controller {
    /// Run the requested action. Actions get no transaction and no
    /// validators, decorators or notifiers.
    pub(super) async fn run_action(&self, ctx: &mut Context) -> Result<Reply, Error> {
        let (name, actions) = match ctx.operation {
            Operation::CollectionAction => (ctx.request.collection_action.clone(), &self.collection_actions),
            _ => (ctx.request.resource_action.clone(), &self.resource_actions),
        };

        let action = actions
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::not_found("action not found"))?;

        if !action.allows(&ctx.method) {
            return Err(Error::method_not_allowed("unsupported method"));
        }

        let defaults = &config().controller;
        if ctx.body.len() > action.body_limit.unwrap_or(defaults.action_body_limit) {
            return Err(Error::payload_too_large("request body too large"));
        }

        let timeout = action.timeout.unwrap_or_else(|| defaults.action_timeout());
        let started = Instant::now();

        let reply = deadline(Some(timeout), async {
            match ctx.operation {
                Operation::CollectionAction => run_callbacks(Stage::Authorizer, &self.authorizers, ctx).await?,
                _ => self.load_model(ctx).await?,
            }

            action.handler.handle(ctx).await.map_err(|err| err.into_error(Stage::Action))
        })
        .await;

        let elapsed = started.elapsed();
        match &reply {
            Ok(reply) => {
                tracing::debug!("Action {} on {} replied {} in {:?}", name, self.meta.plural_name, reply.status, elapsed);
            }
            Err(err) => {
                tracing::warn!("Action {} on {} failed in {:?}: {}", name, self.meta.plural_name, elapsed, err);
            }
        }

        reply
    }
}
