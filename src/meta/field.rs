use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Value kind of a field, used to type check assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    String,
    Bool,
    Integer,
    Float,
    /// RFC 3339 timestamp string
    Timestamp,
    /// Arbitrary JSON
    Json,
    /// Single entity id (to-one relationships)
    Id,
    /// List of entity ids (to-many relationships)
    Ids,
    /// Not persisted (has-one and has-many relationships)
    Virtual,
}

impl Kind {
    /// Value a freshly made record holds for this kind.
    pub fn zero(&self, optional: bool) -> Value {
        if optional {
            return Value::Null;
        }

        match self {
            Kind::String => Value::String(String::new()),
            Kind::Bool => Value::Bool(false),
            Kind::Integer => Value::from(0i64),
            Kind::Float => Value::from(0.0f64),
            Kind::Timestamp | Kind::Json | Kind::Virtual => Value::Null,
            Kind::Id => Value::String(Uuid::nil().to_string()),
            Kind::Ids => Value::Array(Vec::new()),
        }
    }

    /// Check whether a value is acceptable for this kind.
    pub fn accepts(&self, value: &Value, optional: bool) -> bool {
        if value.is_null() {
            return optional || matches!(self, Kind::Json | Kind::Timestamp);
        }

        match self {
            Kind::String => value.is_string(),
            Kind::Bool => value.is_boolean(),
            Kind::Integer => value.is_i64() || value.is_u64(),
            Kind::Float => value.is_number(),
            Kind::Timestamp => value
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            Kind::Json => true,
            Kind::Id => value.as_str().map(is_id).unwrap_or(false),
            Kind::Ids => value
                .as_array()
                .map(|items| items.iter().all(|item| item.as_str().map(is_id).unwrap_or(false)))
                .unwrap_or(false),
            Kind::Virtual => false,
        }
    }
}

/// Check whether a string is a valid entity id.
pub fn is_id(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// How a relationship is stored and resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    OptionalToOne,
    ToMany,
    HasOne { inverse: String },
    HasMany { inverse: String },
}

impl Cardinality {
    /// ToOne or OptionalToOne
    pub fn is_to_one(&self) -> bool {
        matches!(self, Cardinality::ToOne | Cardinality::OptionalToOne)
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::ToMany)
    }

    /// Ids are stored on the owning entity
    pub fn is_stored(&self) -> bool {
        self.is_to_one() || self.is_to_many()
    }

    /// Resolved through an inverse relationship on the related model
    pub fn is_inverse(&self) -> bool {
        !self.is_stored()
    }

    /// Relationships resolving to at most one resource
    pub fn is_singular(&self) -> bool {
        matches!(self, Cardinality::ToOne | Cardinality::OptionalToOne | Cardinality::HasOne { .. })
    }

    pub fn inverse(&self) -> Option<&str> {
        match self {
            Cardinality::HasOne { inverse } | Cardinality::HasMany { inverse } => Some(inverse),
            _ => None,
        }
    }
}

/// Relationship metadata of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship name on the wire
    pub name: String,
    /// Resource type of the related model
    pub related_type: String,
    pub cardinality: Cardinality,
}

/// Well-known field flags that enable controller features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    SoftDelete,
    IdempotentCreate,
    ConsistentUpdate,
    CreatedTimestamp,
    UpdatedTimestamp,
}

/// A single field of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name used by records and callbacks
    pub name: String,
    pub kind: Kind,
    pub optional: bool,
    /// Key in the stored document, absent for virtual fields
    pub storage_name: Option<String>,
    /// Attribute name on the wire, absent for hidden fields and relationships
    pub attribute: Option<String>,
    pub relationship: Option<Relationship>,
    pub filterable: bool,
    pub sortable: bool,
}

impl Field {
    /// Exposed fields are attributes and relationships
    pub fn is_exposed(&self) -> bool {
        self.attribute.is_some() || self.relationship.is_some()
    }

    /// Name under which the field appears on the wire
    pub fn wire_name(&self) -> Option<&str> {
        self.attribute
            .as_deref()
            .or_else(|| self.relationship.as_ref().map(|rel| rel.name.as_str()))
    }

    pub fn zero(&self) -> Value {
        self.kind.zero(self.optional)
    }
}
