// Operation handlers: list, find, create, update and delete
use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::resource::Relations;
use super::Controller;
use crate::callback::{run_callbacks, Stage};
use crate::context::Context;
use crate::database::Record;
use crate::error::Error;
use crate::filter::Filter;
use crate::jsonapi::{Document, Links, Resource};
use crate::meta::Flag;

impl Controller {
    pub(super) async fn list(&self, ctx: &mut Context) -> Result<(), Error> {
        self.load_models(ctx).await?;

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        let relations = self.preload(ctx, true).await?;
        let view: &Context = ctx;
        let resources = view
            .models
            .iter()
            .map(|record| self.construct_resource(view, record, &relations))
            .collect::<Result<Vec<_>, _>>()?;

        let links = self.list_links(ctx).await?;
        self.respond(ctx, StatusCode::OK, Some(Document::many(resources).with_links(links)));

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    pub(super) async fn find(&self, ctx: &mut Context) -> Result<(), Error> {
        self.load_model(ctx).await?;

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        self.respond_model(ctx, StatusCode::OK, true).await?;

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    pub(super) async fn create(&self, ctx: &mut Context) -> Result<(), Error> {
        let resource = self.inbound_resource(ctx)?;
        if !resource.id.is_empty() {
            return Err(Error::bad_request("unnecessary resource id"));
        }

        run_callbacks(Stage::Authorizer, &self.authorizers, ctx).await?;

        let mut record = Record::new(self.meta.clone());
        self.assign_data(&mut record, &resource, &ctx.writable_fields)?;
        ctx.model = Some(record);

        run_callbacks(Stage::Validator, &self.validators, ctx).await?;

        if self.consistent_update {
            let name = self.flagged_field(Flag::ConsistentUpdate)?;
            ctx.record_mut()?.set(&name, Uuid::new_v4().to_string())?;
        }

        let record = ctx.record()?;
        let document = record.to_document();

        if self.idempotent_create {
            let name = self.flagged_field(Flag::IdempotentCreate)?;
            let token = record.get_str(&name).unwrap_or_default().to_string();
            if token.is_empty() {
                return Err(Error::bad_request("missing idempotent create token"));
            }

            let filter = Filter::eq(self.storage_name(&name)?, token);
            let inserted = ctx
                .session()?
                .insert_if_absent(&self.meta.collection, &filter, document)
                .await?;
            if !inserted {
                return Err(Error::conflict("existing document with same idempotent create token"));
            }
        } else {
            ctx.session()?.insert(&self.meta.collection, document).await?;
        }

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        // a new resource has nothing to resolve yet
        self.respond_model(ctx, StatusCode::CREATED, false).await?;

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    pub(super) async fn update(&self, ctx: &mut Context) -> Result<(), Error> {
        let resource = self.inbound_resource(ctx)?;
        if resource.id != ctx.request.resource_id {
            return Err(Error::bad_request("resource id mismatch"));
        }

        self.load_model(ctx).await?;

        let idempotent = match self.idempotent_create {
            true => {
                let name = self.flagged_field(Flag::IdempotentCreate)?;
                let token = ctx.record()?.get(&name).cloned();
                Some((name, token))
            }
            false => None,
        };

        // the client must submit the stored token to update
        let consistent = match self.consistent_update {
            true => {
                let name = self.flagged_field(Flag::ConsistentUpdate)?;
                let record = ctx.record_mut()?;
                let token = record.get(&name).cloned().unwrap_or(Value::Null);
                record.set(&name, "")?;
                Some((name, token))
            }
            false => None,
        };

        let writable = ctx.writable_fields.clone();
        self.assign_data(ctx.record_mut()?, &resource, &writable)?;

        if let Some((name, token)) = &idempotent {
            if ctx.record()?.get(name) != token.as_ref() {
                return Err(Error::bad_request("idempotent create token cannot be changed"));
            }
        }

        run_callbacks(Stage::Validator, &self.validators, ctx).await?;

        match consistent {
            Some((name, stored)) => {
                let record = ctx.record_mut()?;
                if record.get(&name) != Some(&stored) {
                    return Err(Error::conflict("invalid consistent update token"));
                }
                record.set(&name, Uuid::new_v4().to_string())?;

                let document = record.to_document();
                let filter = Filter::eq(self.storage_name(&name)?, stored);
                let replaced = ctx
                    .session()?
                    .replace_if_matches(&self.meta.collection, &filter, document)
                    .await?;
                if !replaced {
                    return Err(Error::conflict("existing document with different consistent update token"));
                }
            }
            None => self.replace_model(ctx).await?,
        }

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        self.respond_model(ctx, StatusCode::OK, true).await?;

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    pub(super) async fn delete(&self, ctx: &mut Context) -> Result<(), Error> {
        self.load_model(ctx).await?;

        run_callbacks(Stage::Validator, &self.validators, ctx).await?;

        let id = ctx.record()?.id();

        if self.soft_delete {
            let name = self.flagged_field(Flag::SoftDelete)?;
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

            let mut patch = Map::new();
            patch.insert(self.storage_name(&name)?, Value::String(now.clone()));
            if !ctx.session()?.update_fields(&self.meta.collection, id, patch).await? {
                return Err(Error::not_found("resource not found"));
            }

            ctx.record_mut()?.set(&name, now)?;
        } else if !ctx.session()?.delete(&self.meta.collection, id).await? {
            return Err(Error::not_found("resource not found"));
        }

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await?;

        self.respond(ctx, StatusCode::NO_CONTENT, None);
        Ok(())
    }

    // ========================================
    // Helpers
    // ========================================

    /// The single resource of the request document, checked against the
    /// resource type of the controller
    fn inbound_resource(&self, ctx: &Context) -> Result<Resource, Error> {
        let resource = ctx
            .document
            .as_ref()
            .and_then(Document::resource)
            .cloned()
            .ok_or_else(|| Error::bad_request("missing document"))?;

        if resource.resource_type != self.meta.plural_name {
            return Err(Error::bad_request("resource type mismatch"));
        }

        Ok(resource)
    }

    /// Write the loaded model back to storage
    pub(super) async fn replace_model(&self, ctx: &mut Context) -> Result<(), Error> {
        let document = ctx.record()?.to_document();
        if !ctx.session()?.replace(&self.meta.collection, document).await? {
            return Err(Error::not_found("resource not found"));
        }
        Ok(())
    }

    /// Respond with the loaded model as a single resource
    async fn respond_model(&self, ctx: &mut Context, status: StatusCode, preload: bool) -> Result<(), Error> {
        let relations = match preload {
            true => self.preload(ctx, false).await?,
            false => Relations::new(),
        };

        let record = ctx.record()?;
        let resource = self.construct_resource(ctx, record, &relations)?;
        let links = Links {
            self_link: Some(ctx.request.resource_path(&resource.id)),
            ..Default::default()
        };

        self.respond(ctx, status, Some(Document::one(Some(resource)).with_links(links)));
        Ok(())
    }

    fn flagged_field(&self, flag: Flag) -> Result<String, Error> {
        self.meta
            .flagged(flag)
            .map(|field| field.name.clone())
            .ok_or_else(|| Error::internal(format!("{} has no {:?} field", self.meta.name, flag)))
    }

    fn storage_name(&self, name: &str) -> Result<String, Error> {
        self.meta
            .field(name)
            .and_then(|field| field.storage_name.clone())
            .ok_or_else(|| Error::internal(format!("{} has no stored field {}", self.meta.name, name)))
    }
}
