// Field whitelists, query construction and model loading
use serde_json::Value;
use uuid::Uuid;

use super::Controller;
use crate::callback::{run_callbacks, Stage};
use crate::context::Context;
use crate::database::{FindOptions, Record};
use crate::error::Error;
use crate::filter::{Filter, FilterOrder, Sort};
use crate::jsonapi::{Data, Document, Request, Resource};
use crate::meta::{Cardinality, Field, Kind};
use crate::types::Operation;

impl Controller {
    /// Names of the exposed fields, attributes first. With `sparse` the
    /// list is narrowed to the fieldset requested for this resource type.
    pub(super) fn initial_fields(&self, request: &Request, sparse: bool) -> Result<Vec<String>, Error> {
        let mut fields: Vec<String> = self
            .meta
            .attributes()
            .chain(self.meta.relationships())
            .map(|field| field.name.clone())
            .collect();

        if !sparse {
            return Ok(fields);
        }

        if let Some(requested) = request.fields.get(&self.meta.plural_name) {
            let mut names = Vec::with_capacity(requested.len());
            for wire_name in requested {
                let field = self
                    .meta
                    .exposed(wire_name)
                    .ok_or_else(|| Error::bad_request(format!("invalid sparse field \"{}\"", wire_name)))?;
                names.push(field.name.clone());
            }
            fields.retain(|name| names.contains(name));
        }

        Ok(fields)
    }

    /// Load the requested resource into `ctx.model`.
    ///
    /// Authorizers run once the base query is in place. The document is
    /// locked when the operation is going to write it back.
    pub(super) async fn load_model(&self, ctx: &mut Context) -> Result<(), Error> {
        let id = Uuid::parse_str(&ctx.request.resource_id).map_err(|_| Error::bad_request("invalid resource id"))?;

        ctx.selector.push(Filter::id(id));
        if let Some(filter) = self.soft_delete_filter() {
            ctx.selector.push(filter);
        }

        run_callbacks(Stage::Authorizer, &self.authorizers, ctx).await?;

        let lock = match ctx.operation {
            Operation::Update => true,
            Operation::Delete => !self.soft_delete,
            _ => false,
        };

        let query = ctx.query();
        let document = ctx
            .session()?
            .find_one(&self.meta.collection, &query, lock)
            .await?
            .ok_or_else(|| Error::not_found("resource not found"))?;

        let record = Record::from_document(self.meta.clone(), &document)?;
        if ctx.operation == Operation::Update {
            ctx.original = Some(record.clone());
        }
        ctx.model = Some(record);

        Ok(())
    }

    /// Load the requested list of resources into `ctx.models`.
    pub(super) async fn load_models(&self, ctx: &mut Context) -> Result<(), Error> {
        if let Some(filter) = self.soft_delete_filter() {
            ctx.selector.push(filter);
        }

        for (name, values) in &ctx.request.filters {
            let filter = self.request_filter(name, values)?;
            ctx.filters.push(filter);
        }

        for sorter in &ctx.request.sorting {
            let sort = self.request_sort(sorter)?;
            ctx.sorting.push(sort);
        }

        // relationship preloads must see every related resource
        if self.list_limit > 0 && !ctx.preload {
            if ctx.request.page_size == 0 || ctx.request.page_size > self.list_limit {
                ctx.request.page_size = self.list_limit;
            }
            if ctx.request.page_number == 0 {
                ctx.request.page_number = 1;
            }
        }

        run_callbacks(Stage::Authorizer, &self.authorizers, ctx).await?;

        let mut options = FindOptions {
            sort: ctx.sorting.clone(),
            ..Default::default()
        };
        let (number, size) = (ctx.request.page_number, ctx.request.page_size);
        if number > 0 && size > 0 {
            options.skip = (number - 1)
                .checked_mul(size)
                .ok_or_else(|| Error::bad_request("invalid page number"))?;
            options.limit = Some(size);
        }

        let query = ctx.query();
        let documents = ctx.session()?.find_many(&self.meta.collection, &query, &options).await?;

        ctx.models = documents
            .iter()
            .map(|document| Record::from_document(self.meta.clone(), document))
            .collect::<Result<_, _>>()?;

        tracing::debug!("Loaded {} {}", ctx.models.len(), self.meta.plural_name);

        Ok(())
    }

    fn request_filter(&self, wire_name: &str, values: &[String]) -> Result<Filter, Error> {
        let invalid = || Error::bad_request(format!("invalid filter \"{}\"", wire_name));

        let field = self.meta.exposed(wire_name).ok_or_else(invalid)?;
        if !self.filters.contains(&field.name) {
            return Err(invalid());
        }
        let storage_name = field.storage_name.clone().ok_or_else(invalid)?;

        if let Some(rel) = &field.relationship {
            if !rel.cardinality.is_stored() {
                return Err(invalid());
            }
            let ids = values
                .iter()
                .map(|value| {
                    Uuid::parse_str(value)
                        .map(|id| Value::String(id.to_string()))
                        .map_err(|_| Error::bad_request("relationship filter value is not an entity id"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Filter::any_of(storage_name, ids));
        }

        if field.kind == Kind::Bool && values.len() == 1 {
            return Ok(Filter::eq(storage_name, values[0] == "true"));
        }

        let values = values
            .iter()
            .map(|value| filter_value(field, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Filter::any_of(storage_name, values))
    }

    fn request_sort(&self, sorter: &str) -> Result<Sort, Error> {
        let invalid = |name: &str| Error::bad_request(format!("invalid sorter \"{}\"", name));
        let mut sort = FilterOrder::parse(sorter).map_err(|_| invalid(""))?;
        let wire_name = sort.key.as_str();

        let field = self.meta.attribute(wire_name).ok_or_else(|| invalid(wire_name))?;
        let unsupported = || Error::bad_request(format!("unsupported sorter \"{}\"", wire_name));
        if !self.sorters.contains(&field.name) {
            return Err(unsupported());
        }
        let storage_name = field.storage_name.clone().ok_or_else(unsupported)?;

        sort.key = storage_name;
        Ok(sort)
    }

    /// Assign the attributes and relationships of an inbound resource.
    ///
    /// Unknown names are always rejected. Names outside the writable list
    /// are rejected, or skipped when violations are tolerated.
    pub(super) fn assign_data(&self, record: &mut Record, resource: &Resource, writable: &[String]) -> Result<(), Error> {
        for (wire_name, value) in &resource.attributes {
            let pointer = format!("/data/attributes/{}", wire_name);
            let field = self
                .meta
                .attribute(wire_name)
                .ok_or_else(|| Error::bad_request_pointer("invalid attribute", pointer.clone()))?;

            if !writable.contains(&field.name) {
                if self.tolerate_violations {
                    continue;
                }
                return Err(Error::bad_request_pointer("attribute is not writable", pointer));
            }

            record
                .set(&field.name, value.clone())
                .map_err(|_| Error::bad_request_pointer("invalid attribute value", pointer))?;
        }

        for (wire_name, document) in &resource.relationships {
            let pointer = format!("/data/relationships/{}", wire_name);
            let field = self
                .meta
                .relationship(wire_name)
                .ok_or_else(|| Error::bad_request_pointer("invalid relationship", pointer.clone()))?;

            let stored = field.relationship.as_ref().map(|rel| rel.cardinality.is_stored()).unwrap_or(false);
            if !writable.contains(&field.name) || !stored {
                if self.tolerate_violations {
                    continue;
                }
                return Err(Error::bad_request_pointer("relationship is not writable", pointer));
            }

            self.assign_relationship(record, document, field)?;
        }

        Ok(())
    }

    /// Replace the value of a stored relationship with the references of a
    /// relationship document. Absent data resets the relationship.
    pub(super) fn assign_relationship(&self, record: &mut Record, document: &Document, field: &Field) -> Result<(), Error> {
        let rel = field
            .relationship
            .as_ref()
            .ok_or_else(|| Error::internal(format!("field {} is not a relationship", field.name)))?;

        match rel.cardinality {
            Cardinality::ToOne | Cardinality::OptionalToOne => {
                let reference = match &document.data {
                    Some(Data::One(Some(resource))) => Some(reference_id(resource, &rel.related_type)?),
                    _ => None,
                };

                let value = match (reference, &rel.cardinality) {
                    (Some(id), _) => Value::String(id.to_string()),
                    (None, Cardinality::ToOne) => Value::String(Uuid::nil().to_string()),
                    (None, _) => Value::Null,
                };
                record.set(&field.name, value)?;
            }
            Cardinality::ToMany => {
                let ids = match &document.data {
                    Some(Data::Many(resources)) => resources
                        .iter()
                        .map(|resource| reference_id(resource, &rel.related_type).map(|id| Value::String(id.to_string())))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                record.set(&field.name, Value::Array(ids))?;
            }
            Cardinality::HasOne { .. } | Cardinality::HasMany { .. } => {
                return Err(Error::bad_request("relationship is not writable"));
            }
        }

        Ok(())
    }
}

/// Check the type of a resource identifier and parse its id
pub(super) fn reference_id(resource: &Resource, related_type: &str) -> Result<Uuid, Error> {
    if resource.resource_type != related_type {
        return Err(Error::bad_request("resource type mismatch"));
    }
    Uuid::parse_str(&resource.id).map_err(|_| Error::bad_request("invalid relationship id"))
}

fn filter_value(field: &Field, value: &str) -> Result<Value, Error> {
    let invalid = || Error::bad_request(format!("invalid filter value \"{}\"", value));

    Ok(match field.kind {
        Kind::Integer => Value::from(value.parse::<i64>().map_err(|_| invalid())?),
        Kind::Float => Value::from(value.parse::<f64>().map_err(|_| invalid())?),
        Kind::Bool => Value::Bool(value == "true"),
        _ => Value::String(value.to_string()),
    })
}
