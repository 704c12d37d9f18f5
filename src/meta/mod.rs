// Model descriptors
//
// A `Meta` is the static description of one model type: its exposed
// attributes, relationships, hidden fields and flagged fields. Descriptors
// are built once with `MetaBuilder` and shared read-only between requests.

pub mod builder;
pub mod field;

pub use builder::{MetaBuilder, MetaError};
pub use field::{is_id, Cardinality, Field, Flag, Kind, Relationship};

use std::collections::HashMap;

/// Immutable model descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    /// Model name used in logs
    pub name: String,
    /// Plural name, used as resource type
    pub plural_name: String,
    /// Backing collection
    pub collection: String,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    by_attribute: HashMap<String, usize>,
    by_relationship: HashMap<String, usize>,
    flags: HashMap<Flag, usize>,
}

impl Meta {
    /// Start building a descriptor for a model.
    pub fn build(name: &str, plural_name: &str) -> MetaBuilder {
        MetaBuilder::new(name, plural_name)
    }

    pub(crate) fn from_parts(
        name: String,
        plural_name: String,
        collection: String,
        fields: Vec<Field>,
        flags: HashMap<Flag, usize>,
    ) -> Self {
        let mut by_name = HashMap::new();
        let mut by_attribute = HashMap::new();
        let mut by_relationship = HashMap::new();

        for (index, field) in fields.iter().enumerate() {
            by_name.insert(field.name.clone(), index);
            if let Some(attribute) = &field.attribute {
                by_attribute.insert(attribute.clone(), index);
            }
            if let Some(rel) = &field.relationship {
                by_relationship.insert(rel.name.clone(), index);
            }
        }

        Self {
            name,
            plural_name,
            collection,
            fields,
            by_name,
            by_attribute,
            by_relationship,
            flags,
        }
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by its name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&index| &self.fields[index])
    }

    /// Look up an attribute field by its wire name
    pub fn attribute(&self, wire_name: &str) -> Option<&Field> {
        self.by_attribute.get(wire_name).map(|&index| &self.fields[index])
    }

    /// Look up a relationship field by its wire name
    pub fn relationship(&self, wire_name: &str) -> Option<&Field> {
        self.by_relationship.get(wire_name).map(|&index| &self.fields[index])
    }

    /// Attribute fields in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.attribute.is_some())
    }

    /// Relationship fields in declaration order
    pub fn relationships(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.relationship.is_some())
    }

    /// Look up an exposed field by its wire name
    pub fn exposed(&self, wire_name: &str) -> Option<&Field> {
        self.attribute(wire_name).or_else(|| self.relationship(wire_name))
    }

    /// Field carrying the given flag, if the feature is declared
    pub fn flagged(&self, flag: Flag) -> Option<&Field> {
        self.flags.get(&flag).map(|&index| &self.fields[index])
    }
}

/// Implemented by typed models that expose a statically cached descriptor.
///
/// ```ignore
/// static META: Lazy<Arc<Meta>> = Lazy::new(|| Arc::new(
///     Meta::build("Post", "posts").attribute("title", Kind::String).finish().unwrap()
/// ));
///
/// impl Model for Post {
///     fn meta() -> Arc<Meta> { META.clone() }
/// }
/// ```
pub trait Model: serde::Serialize + serde::de::DeserializeOwned + Send + Sync {
    fn meta() -> std::sync::Arc<Meta>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Meta {
        Meta::build("Post", "posts")
            .attribute("title", Kind::String)
            .filterable()
            .sortable()
            .attribute("text_body", Kind::String)
            .optional()
            .hidden("deleted_at", Kind::Timestamp)
            .optional()
            .flag(Flag::SoftDelete)
            .to_one("author", "users")
            .has_many("comments", "comments", "post")
            .finish()
            .unwrap()
    }

    #[test]
    fn indexes_fields_by_wire_name() {
        let meta = post();

        assert_eq!(meta.attribute("text-body").unwrap().name, "text_body");
        assert_eq!(meta.attribute("text-body").unwrap().storage_name.as_deref(), Some("text_body"));
        assert!(meta.attribute("deleted-at").is_none());
        assert_eq!(meta.relationship("author").unwrap().kind, Kind::Id);
        assert_eq!(meta.relationship("comments").unwrap().storage_name, None);
        assert_eq!(meta.flagged(Flag::SoftDelete).unwrap().name, "deleted_at");
        assert!(meta.flagged(Flag::ConsistentUpdate).is_none());
    }

    #[test]
    fn splits_attributes_from_relationships() {
        let meta = post();
        assert_eq!(meta.attributes().count(), 2);
        assert_eq!(meta.relationships().count(), 2);
    }
}
