// Resource assembly and pagination links
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::Controller;
use crate::context::Context;
use crate::database::Record;
use crate::error::Error;
use crate::jsonapi::{Data, Document, Links, Resource};
use crate::meta::Cardinality;

/// Resolved has-one and has-many relationships: field name, then owner id,
/// then the ids of the related resources
pub(super) type Relations = HashMap<String, HashMap<Uuid, Vec<Uuid>>>;

impl Controller {
    /// Build the wire resource of a record, limited to the readable fields.
    pub(super) fn construct_resource(&self, ctx: &Context, record: &Record, relations: &Relations) -> Result<Resource, Error> {
        let id = record.id();
        let base = format!("{}/{}/{}", ctx.request.prefix, self.meta.plural_name, id);
        let readable = |name: &str| ctx.readable_fields.iter().any(|field| field == name);

        let mut attributes = Map::new();
        for field in self.meta.attributes().filter(|field| readable(&field.name)) {
            if let Some(wire_name) = &field.attribute {
                attributes.insert(wire_name.clone(), record.get(&field.name).cloned().unwrap_or(Value::Null));
            }
        }

        let mut relationships = BTreeMap::new();
        for field in self.meta.relationships().filter(|field| readable(&field.name)) {
            let Some(rel) = &field.relationship else {
                continue;
            };
            let identifier = |id: Uuid| Resource::identifier(rel.related_type.clone(), id.to_string());
            let resolved = || {
                relations
                    .get(&field.name)
                    .and_then(|owners| owners.get(&id))
                    .cloned()
                    .unwrap_or_default()
            };

            let data = match &rel.cardinality {
                Cardinality::ToOne => Data::One(Some(identifier(record.get_id(&field.name).unwrap_or_default()))),
                Cardinality::OptionalToOne => Data::One(record.get_id(&field.name).map(identifier)),
                Cardinality::ToMany => Data::Many(record.get_ids(&field.name).into_iter().map(identifier).collect()),
                Cardinality::HasOne { .. } => {
                    let ids = resolved();
                    if ids.len() > 1 {
                        return Err(Error::internal("has one relationship returned more than one result"));
                    }
                    Data::One(ids.into_iter().next().map(identifier))
                }
                Cardinality::HasMany { .. } => Data::Many(resolved().into_iter().map(identifier).collect()),
            };

            let document = Document {
                data: Some(data),
                links: Some(Links {
                    self_link: Some(format!("{}/relationships/{}", base, rel.name)),
                    related: Some(format!("{}/{}", base, rel.name)),
                    ..Default::default()
                }),
                ..Default::default()
            };
            relationships.insert(rel.name.clone(), document);
        }

        Ok(Resource {
            resource_type: self.meta.plural_name.clone(),
            id: id.to_string(),
            attributes,
            relationships,
            links: None,
        })
    }

    /// Links of a list response. Pagination links need a count of the
    /// whole result and are only generated for paginated requests.
    pub(super) async fn list_links(&self, ctx: &mut Context) -> Result<Links, Error> {
        let self_path = ctx.request.self_path();
        let (number, size) = (ctx.request.page_number, ctx.request.page_size);

        if number == 0 || size == 0 {
            return Ok(Links {
                self_link: Some(self_path),
                ..Default::default()
            });
        }

        let query = ctx.query();
        let count = ctx.session()?.count(&self.meta.collection, &query).await?;

        Ok(pagination_links(&self_path, number, size, count))
    }
}

/// Links of one page out of `count` items split into pages of `size`.
///
/// The last page is never below 1, so an empty collection still links to
/// a first and last page.
pub fn pagination_links(self_path: &str, number: u64, size: u64, count: u64) -> Links {
    let size = size.max(1);
    let last = count.div_ceil(size).max(1);
    let page = |n: u64| format!("{}?page[number]={}&page[size]={}", self_path, n, size);

    Links {
        self_link: Some(page(number)),
        related: None,
        first: Some(page(1)),
        previous: (number > 1).then(|| page(number - 1)),
        next: (number < last).then(|| page(number + 1)),
        last: Some(page(last)),
    }
}
