use std::collections::{HashMap, HashSet};

use super::field::{Cardinality, Field, Flag, Kind, Relationship};
use super::Meta;

/// Descriptor construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetaError {
    #[error("model '{model}': modifier '{modifier}' used before any field")]
    NoField { model: String, modifier: &'static str },

    #[error("model '{model}': duplicate field '{field}'")]
    DuplicateField { model: String, field: String },

    #[error("model '{model}': duplicate wire name '{name}'")]
    DuplicateWireName { model: String, name: String },

    #[error("model '{model}': duplicate storage name '{name}'")]
    DuplicateStorageName { model: String, name: String },

    #[error("model '{model}': reserved name '{name}'")]
    ReservedName { model: String, name: String },

    #[error("model '{model}': flag {flag:?} declared more than once")]
    DuplicateFlag { model: String, flag: Flag },

    #[error("model '{model}': field '{field}' cannot be {modifier}")]
    InvalidModifier {
        model: String,
        field: String,
        modifier: &'static str,
    },

    #[error("model '{model}': relationship '{field}' has no inverse name")]
    MissingInverse { model: String, field: String },
}

const RESERVED_WIRE_NAMES: &[&str] = &["id", "type"];
const RESERVED_STORAGE_NAMES: &[&str] = &["_id", "_lk"];

/// Fluent builder for `Meta`.
///
/// Field modifiers (`optional`, `stored_as`, `wire_name`, `filterable`,
/// `sortable`, `flag`) apply to the most recently declared field. The first
/// problem found is reported by `finish`.
#[derive(Debug)]
pub struct MetaBuilder {
    name: String,
    plural_name: String,
    collection: Option<String>,
    fields: Vec<Field>,
    flags: HashMap<Flag, usize>,
    error: Option<MetaError>,
}

impl MetaBuilder {
    pub fn new(name: &str, plural_name: &str) -> Self {
        Self {
            name: name.to_string(),
            plural_name: plural_name.to_string(),
            collection: None,
            fields: Vec::new(),
            flags: HashMap::new(),
            error: None,
        }
    }

    /// Override the collection name (defaults to the plural name).
    pub fn collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// Exposed attribute. The wire name is the field name with underscores
    /// replaced by dashes.
    pub fn attribute(self, name: &str, kind: Kind) -> Self {
        self.push(Field {
            name: name.to_string(),
            kind,
            optional: false,
            storage_name: Some(name.to_string()),
            attribute: Some(dasherize(name)),
            relationship: None,
            filterable: false,
            sortable: false,
        })
    }

    /// Stored field that is never exposed on the wire.
    pub fn hidden(self, name: &str, kind: Kind) -> Self {
        self.push(Field {
            name: name.to_string(),
            kind,
            optional: false,
            storage_name: Some(name.to_string()),
            attribute: None,
            relationship: None,
            filterable: false,
            sortable: false,
        })
    }

    /// Required to-one relationship storing a single id.
    pub fn to_one(self, name: &str, related_type: &str) -> Self {
        self.relationship(name, related_type, Cardinality::ToOne, Kind::Id, false)
    }

    /// Optional to-one relationship storing a nullable id.
    pub fn optional_to_one(self, name: &str, related_type: &str) -> Self {
        self.relationship(name, related_type, Cardinality::OptionalToOne, Kind::Id, true)
    }

    /// To-many relationship storing a list of ids.
    pub fn to_many(self, name: &str, related_type: &str) -> Self {
        self.relationship(name, related_type, Cardinality::ToMany, Kind::Ids, false)
    }

    /// Has-one relationship resolved through `inverse` on the related model.
    pub fn has_one(self, name: &str, related_type: &str, inverse: &str) -> Self {
        let cardinality = Cardinality::HasOne { inverse: inverse.to_string() };
        self.relationship(name, related_type, cardinality, Kind::Virtual, true)
    }

    /// Has-many relationship resolved through `inverse` on the related model.
    pub fn has_many(self, name: &str, related_type: &str, inverse: &str) -> Self {
        let cardinality = Cardinality::HasMany { inverse: inverse.to_string() };
        self.relationship(name, related_type, cardinality, Kind::Virtual, true)
    }

    fn relationship(
        self,
        name: &str,
        related_type: &str,
        cardinality: Cardinality,
        kind: Kind,
        optional: bool,
    ) -> Self {
        let storage_name = if cardinality.is_stored() { Some(name.to_string()) } else { None };

        self.push(Field {
            name: name.to_string(),
            kind,
            optional,
            storage_name,
            attribute: None,
            relationship: Some(Relationship {
                name: dasherize(name),
                related_type: related_type.to_string(),
                cardinality,
            }),
            filterable: false,
            sortable: false,
        })
    }

    pub fn optional(self) -> Self {
        self.modify("optional", |field| {
            if field.relationship.is_some() {
                return false;
            }
            field.optional = true;
            true
        })
    }

    /// Override the storage name of the last field.
    pub fn stored_as(self, storage_name: &str) -> Self {
        let storage_name = storage_name.to_string();
        self.modify("stored", move |field| {
            if field.storage_name.is_none() {
                return false;
            }
            field.storage_name = Some(storage_name);
            true
        })
    }

    /// Override the wire name of the last field.
    pub fn wire_name(self, wire_name: &str) -> Self {
        let wire_name = wire_name.to_string();
        self.modify("renamed", move |field| {
            if let Some(rel) = field.relationship.as_mut() {
                rel.name = wire_name;
                true
            } else if field.attribute.is_some() {
                field.attribute = Some(wire_name);
                true
            } else {
                false
            }
        })
    }

    pub fn filterable(self) -> Self {
        self.modify("filterable", |field| {
            let stored = field.storage_name.is_some() && field.is_exposed();
            field.filterable = stored;
            stored
        })
    }

    pub fn sortable(self) -> Self {
        self.modify("sortable", |field| {
            let ok = field.attribute.is_some();
            field.sortable = ok;
            ok
        })
    }

    /// Mark the last field with a well-known flag.
    pub fn flag(mut self, flag: Flag) -> Self {
        if self.error.is_some() {
            return self;
        }

        let Some(index) = self.fields.len().checked_sub(1) else {
            self.error = Some(MetaError::NoField { model: self.name.clone(), modifier: "flag" });
            return self;
        };

        if self.flags.insert(flag, index).is_some() {
            self.error = Some(MetaError::DuplicateFlag { model: self.name.clone(), flag });
        }
        self
    }

    /// Validate and produce the descriptor.
    pub fn finish(self) -> Result<Meta, MetaError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let model = self.name.clone();
        let mut names = HashSet::new();
        let mut wire_names = HashSet::new();
        let mut storage_names = HashSet::new();

        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(MetaError::DuplicateField { model, field: field.name.clone() });
            }

            if let Some(wire) = field.wire_name() {
                if RESERVED_WIRE_NAMES.contains(&wire) {
                    return Err(MetaError::ReservedName { model, name: wire.to_string() });
                }
                if !wire_names.insert(wire) {
                    return Err(MetaError::DuplicateWireName { model, name: wire.to_string() });
                }
            }

            if let Some(storage) = field.storage_name.as_deref() {
                if RESERVED_STORAGE_NAMES.contains(&storage) {
                    return Err(MetaError::ReservedName { model, name: storage.to_string() });
                }
                if !storage_names.insert(storage) {
                    return Err(MetaError::DuplicateStorageName { model, name: storage.to_string() });
                }
            }

            if let Some(rel) = &field.relationship {
                if rel.cardinality.inverse().map(str::is_empty).unwrap_or(false) {
                    return Err(MetaError::MissingInverse { model, field: field.name.clone() });
                }
            }
        }

        let collection = self.collection.unwrap_or_else(|| self.plural_name.clone());

        Ok(Meta::from_parts(self.name, self.plural_name, collection, self.fields, self.flags))
    }

    fn push(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    fn modify(mut self, modifier: &'static str, apply: impl FnOnce(&mut Field) -> bool) -> Self {
        if self.error.is_some() {
            return self;
        }

        match self.fields.last_mut() {
            Some(field) => {
                if !apply(field) {
                    self.error = Some(MetaError::InvalidModifier {
                        model: self.name.clone(),
                        field: field.name.clone(),
                        modifier,
                    });
                }
            }
            None => {
                self.error = Some(MetaError::NoField { model: self.name.clone(), modifier });
            }
        }

        self
    }
}

fn dasherize(name: &str) -> String {
    name.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_collection_to_plural_name() {
        let meta = MetaBuilder::new("Post", "posts").finish().unwrap();
        assert_eq!(meta.collection, "posts");

        let meta = MetaBuilder::new("Post", "posts").collection("articles").finish().unwrap();
        assert_eq!(meta.collection, "articles");
    }

    #[test]
    fn rejects_duplicates() {
        let err = MetaBuilder::new("Post", "posts")
            .attribute("title", Kind::String)
            .attribute("title", Kind::String)
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::DuplicateField { .. }));

        let err = MetaBuilder::new("Post", "posts")
            .attribute("title", Kind::String)
            .attribute("heading", Kind::String)
            .wire_name("title")
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::DuplicateWireName { .. }));

        let err = MetaBuilder::new("Post", "posts")
            .attribute("title", Kind::String)
            .attribute("heading", Kind::String)
            .stored_as("title")
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::DuplicateStorageName { .. }));
    }

    #[test]
    fn rejects_reserved_names() {
        let err = MetaBuilder::new("Post", "posts").attribute("id", Kind::String).finish().unwrap_err();
        assert!(matches!(err, MetaError::ReservedName { .. }));

        let err = MetaBuilder::new("Post", "posts")
            .attribute("key", Kind::String)
            .stored_as("_id")
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::ReservedName { .. }));
    }

    #[test]
    fn rejects_invalid_modifiers() {
        let err = MetaBuilder::new("Post", "posts").optional().finish().unwrap_err();
        assert!(matches!(err, MetaError::NoField { .. }));

        let err = MetaBuilder::new("Post", "posts")
            .has_many("comments", "comments", "post")
            .filterable()
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::InvalidModifier { modifier: "filterable", .. }));

        let err = MetaBuilder::new("Post", "posts")
            .to_one("author", "users")
            .sortable()
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::InvalidModifier { modifier: "sortable", .. }));

        let err = MetaBuilder::new("Post", "posts")
            .has_one("note", "notes", "")
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::MissingInverse { .. }));
    }

    #[test]
    fn rejects_duplicate_flags() {
        let err = MetaBuilder::new("Post", "posts")
            .hidden("deleted", Kind::Timestamp)
            .flag(Flag::SoftDelete)
            .hidden("removed", Kind::Timestamp)
            .flag(Flag::SoftDelete)
            .finish()
            .unwrap_err();
        assert!(matches!(err, MetaError::DuplicateFlag { flag: Flag::SoftDelete, .. }));
    }

    #[test]
    fn builds_relationships() {
        let meta = MetaBuilder::new("Comment", "comments")
            .to_one("post", "posts")
            .filterable()
            .optional_to_one("parent", "comments")
            .to_many("linked_posts", "posts")
            .finish()
            .unwrap();

        let parent = meta.relationship("parent").unwrap();
        assert!(parent.optional);
        assert_eq!(parent.relationship.as_ref().unwrap().cardinality, Cardinality::OptionalToOne);

        let linked = meta.relationship("linked-posts").unwrap();
        assert_eq!(linked.kind, Kind::Ids);
        assert_eq!(linked.storage_name.as_deref(), Some("linked_posts"));

        assert!(meta.relationship("post").unwrap().filterable);
    }
}
