// Relationship resolution and relationship endpoints
use axum::http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::load::reference_id;
use super::resource::Relations;
use super::Controller;
use crate::callback::{run_callbacks, Stage};
use crate::context::Context;
use crate::database::store::document_id;
use crate::database::FindOptions;
use crate::error::Error;
use crate::filter::Filter;
use crate::jsonapi::{Data, Document, Intent, Request};
use crate::meta::{Cardinality, Field};

impl Controller {
    /// Look up a relationship field by its wire name
    fn relationship_field(&self, name: &str) -> Result<Field, Error> {
        self.meta
            .relationship(name)
            .cloned()
            .ok_or_else(|| Error::not_found("invalid relationship"))
    }

    /// Controller of a related resource type and the storage name of the
    /// inverse relationship, if one is named
    fn related(&self, ctx: &Context, field: &Field) -> Result<(Arc<Controller>, Option<String>), Error> {
        let rel = field
            .relationship
            .as_ref()
            .ok_or_else(|| Error::internal(format!("field {} is not a relationship", field.name)))?;

        let controller = ctx
            .group()
            .controller(&rel.related_type)
            .ok_or_else(|| Error::internal(format!("missing controller for {}", rel.related_type)))?;

        let inverse = match rel.cardinality.inverse() {
            Some(inverse) => Some(
                controller
                    .meta
                    .relationship(inverse)
                    .filter(|field| field.relationship.as_ref().map(|r| r.cardinality.is_stored()).unwrap_or(false))
                    .and_then(|field| field.storage_name.clone())
                    .ok_or_else(|| {
                        Error::internal(format!("missing inverse relationship {} on {}", inverse, rel.related_type))
                    })?,
            ),
            None => None,
        };

        Ok((controller, inverse))
    }

    // ========================================
    // Preloading
    // ========================================

    /// Resolve the readable has-one and has-many relationships of the
    /// loaded models.
    ///
    /// With `bulk` (lists) each relationship is resolved with one query over
    /// all owners that only projects the inverse field. Otherwise the single
    /// model is resolved through a nested list request against the related
    /// controller so its authorizers apply.
    pub(super) async fn preload(&self, ctx: &mut Context, bulk: bool) -> Result<Relations, Error> {
        let owners: Vec<Uuid> = if bulk {
            ctx.models.iter().map(|record| record.id()).collect()
        } else {
            vec![ctx.record()?.id()]
        };

        let fields: Vec<Field> = self
            .meta
            .relationships()
            .filter(|field| field.relationship.as_ref().map(|r| r.cardinality.is_inverse()).unwrap_or(false))
            .filter(|field| ctx.readable_fields.contains(&field.name))
            .cloned()
            .collect();

        let mut relations = Relations::new();
        if owners.is_empty() {
            return Ok(relations);
        }

        for field in fields {
            let (related, inverse) = self.related(ctx, &field)?;
            let inverse = inverse.ok_or_else(|| Error::internal("inverse relationship expected"))?;
            let extra = ctx.relationship_filters.get(&field.name).cloned().unwrap_or_default();

            let resolved = if bulk {
                self.preload_bulk(ctx, &related, &inverse, &owners, extra).await?
            } else {
                let owner = owners[0];
                let ids = self.preload_single(ctx, &related, &inverse, owner, extra).await?;
                if matches!(field.relationship.as_ref().map(|r| &r.cardinality), Some(Cardinality::HasOne { .. }))
                    && ids.len() > 1
                {
                    return Err(Error::internal("has one relationship returned more than one result"));
                }
                HashMap::from([(owner, ids)])
            };

            relations.insert(field.name.clone(), resolved);
        }

        Ok(relations)
    }

    async fn preload_bulk(
        &self,
        ctx: &mut Context,
        related: &Controller,
        inverse: &str,
        owners: &[Uuid],
        extra: Vec<Filter>,
    ) -> Result<HashMap<Uuid, Vec<Uuid>>, Error> {
        let values = owners.iter().map(|id| Value::String(id.to_string())).collect();
        let mut filters = vec![Filter::any_of(inverse, values)];
        filters.extend(related.soft_delete_filter());
        filters.extend(extra);

        let options = FindOptions {
            projection: Some(vec![inverse.to_string()]),
            ..Default::default()
        };
        let documents = ctx
            .session()?
            .find_many(&related.meta.collection, &Filter::and(filters), &options)
            .await?;

        let mut resolved: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for document in &documents {
            let id = document_id(document)?;
            let referenced: Vec<Uuid> = match document.get(inverse) {
                Some(Value::String(owner)) => Uuid::parse_str(owner).ok().into_iter().collect(),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|owner| Uuid::parse_str(owner).ok())
                    .collect(),
                _ => Vec::new(),
            };

            for owner in referenced.into_iter().filter(|owner| owners.contains(owner)) {
                resolved.entry(owner).or_default().push(id);
            }
        }

        Ok(resolved)
    }

    async fn preload_single(
        &self,
        ctx: &mut Context,
        related: &Controller,
        inverse: &str,
        owner: Uuid,
        extra: Vec<Filter>,
    ) -> Result<Vec<Uuid>, Error> {
        let mut selector = vec![Filter::eq(inverse, owner.to_string())];
        selector.extend(extra);

        let request = Request::new(Intent::ListResources, &ctx.request.prefix, &related.meta.plural_name);
        let mut sub = ctx.sub_context(request);
        sub.preload = true;

        let result = related.handle(&mut sub, Some(selector), false).await;
        ctx.restore(&mut sub);
        result?;

        Ok(sub.models.iter().map(|record| record.id()).collect())
    }

    // ========================================
    // Relationship endpoints
    // ========================================

    /// Respond with the related resources of the requested resource by
    /// running a nested list request against the related controller.
    pub(super) async fn get_related_resources(&self, ctx: &mut Context) -> Result<(), Error> {
        let field = self.relationship_field(&ctx.request.related_resource)?;
        let (related, inverse) = self.related(ctx, &field)?;
        let cardinality = field
            .relationship
            .as_ref()
            .map(|rel| rel.cardinality.clone())
            .ok_or_else(|| Error::internal("relationship expected"))?;

        self.load_model(ctx).await?;

        if !ctx.readable_fields.contains(&field.name) {
            return Err(Error::bad_request("relationship is not readable"));
        }

        let record = ctx.record()?;
        let selector = match (&cardinality, inverse) {
            (Cardinality::ToOne, _) => vec![Filter::id(record.get_id(&field.name).unwrap_or_default())],
            // nothing can match a fresh id
            (Cardinality::OptionalToOne, _) => {
                vec![Filter::id(record.get_id(&field.name).unwrap_or_else(Uuid::new_v4))]
            }
            (Cardinality::ToMany, _) => vec![Filter::ids(&record.get_ids(&field.name))],
            (_, Some(inverse)) => {
                let mut selector = vec![Filter::eq(inverse, record.id().to_string())];
                selector.extend(ctx.relationship_filters.get(&field.name).cloned().unwrap_or_default());
                selector
            }
            (_, None) => return Err(Error::internal("inverse relationship expected")),
        };

        let mut request = Request::new(Intent::ListResources, &ctx.request.prefix, &related.meta.plural_name);
        request.filters = ctx.request.filters.clone();
        request.sorting = ctx.request.sorting.clone();
        request.page_number = ctx.request.page_number;
        request.page_size = ctx.request.page_size;
        request.fields = ctx.request.fields.clone();

        let mut sub = ctx.sub_context(request);
        let result = related.handle(&mut sub, Some(selector), false).await;
        ctx.restore(&mut sub);
        result?;

        let mut response = sub.response.take().unwrap_or_default();

        if cardinality.is_singular() {
            if let Some(Data::Many(resources)) = &mut response.data {
                if resources.len() > 1 {
                    let kind = if cardinality.is_to_one() { "to one" } else { "has one" };
                    return Err(Error::internal(format!("{} relationship returned more than one result", kind)));
                }
                let resource = resources.pop();
                response.data = Some(Data::One(resource));
            }
        }

        let from = sub.request.self_path();
        let to = ctx.request.self_path();
        if let Some(links) = response.links.as_mut() {
            for link in [
                &mut links.self_link,
                &mut links.related,
                &mut links.first,
                &mut links.previous,
                &mut links.next,
                &mut links.last,
            ] {
                if let Some(link) = link.as_mut() {
                    *link = link.replacen(&from, &to, 1);
                }
            }
        }

        self.respond(ctx, sub.response_code, Some(response));
        Ok(())
    }

    /// Respond with the relationship document of the requested resource.
    pub(super) async fn get_relationship(&self, ctx: &mut Context) -> Result<(), Error> {
        let field = self.relationship_field(&ctx.request.relationship)?;

        self.load_model(ctx).await?;

        if !ctx.readable_fields.contains(&field.name) {
            return Err(Error::bad_request("relationship is not readable"));
        }

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        self.respond_relationship(ctx, &field).await?;

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    /// Replace a to-one or to-many relationship as a whole.
    pub(super) async fn set_relationship(&self, ctx: &mut Context) -> Result<(), Error> {
        if self.consistent_update {
            return Err(Error::conflict("partial updates not allowed with consistent updates"));
        }

        let field = self.relationship_field(&ctx.request.relationship)?;
        if !field.relationship.as_ref().map(|rel| rel.cardinality.is_stored()).unwrap_or(false) {
            return Err(Error::bad_request("invalid relationship"));
        }

        self.load_model(ctx).await?;

        if !ctx.writable_fields.contains(&field.name) {
            return Err(Error::bad_request("relationship is not writable"));
        }

        let document = ctx.document.clone().unwrap_or_default();
        self.assign_relationship(ctx.record_mut()?, &document, &field)?;

        self.save_relationship(ctx, &field).await
    }

    /// Add references to, or remove references from, a to-many
    /// relationship. Present ids are not added twice and absent ids are
    /// ignored on removal.
    pub(super) async fn modify_relationship(&self, ctx: &mut Context, append: bool) -> Result<(), Error> {
        if self.consistent_update {
            return Err(Error::conflict("partial updates not allowed with consistent updates"));
        }

        let field = self.relationship_field(&ctx.request.relationship)?;
        let related_type = match &field.relationship {
            Some(rel) if rel.cardinality.is_to_many() => rel.related_type.clone(),
            _ => return Err(Error::bad_request("invalid relationship")),
        };

        self.load_model(ctx).await?;

        if !ctx.writable_fields.contains(&field.name) {
            return Err(Error::bad_request("relationship is not writable"));
        }

        let references = match ctx.document.as_ref().and_then(|document| document.data.as_ref()) {
            Some(Data::Many(resources)) => resources.clone(),
            _ => Vec::new(),
        };

        let record = ctx.record_mut()?;
        let mut ids = record.get_ids(&field.name);
        for reference in &references {
            let id = reference_id(reference, &related_type)?;
            if append {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            } else {
                ids.retain(|existing| *existing != id);
            }
        }

        let value: Vec<Value> = ids.iter().map(|id| Value::String(id.to_string())).collect();
        record.set(&field.name, Value::Array(value))?;

        self.save_relationship(ctx, &field).await
    }

    async fn save_relationship(&self, ctx: &mut Context, field: &Field) -> Result<(), Error> {
        run_callbacks(Stage::Validator, &self.validators, ctx).await?;

        self.replace_model(ctx).await?;

        run_callbacks(Stage::Decorator, &self.decorators, ctx).await?;

        self.respond_relationship(ctx, field).await?;

        run_callbacks(Stage::Notifier, &self.notifiers, ctx).await
    }

    async fn respond_relationship(&self, ctx: &mut Context, field: &Field) -> Result<(), Error> {
        let relations = self.preload(ctx, false).await?;
        let mut resource = self.construct_resource(ctx, ctx.record()?, &relations)?;

        let wire_name = field.wire_name().unwrap_or_default();
        let document = resource.relationships.remove(wire_name).unwrap_or_default();

        self.respond(ctx, StatusCode::OK, Some(document));
        Ok(())
    }
}
