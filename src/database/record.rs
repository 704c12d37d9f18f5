use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::meta::{Kind, Meta, Model};

/// Key holding the entity id in stored documents
pub const ID_KEY: &str = "_id";

/// Key holding the pessimistic lock counter in stored documents
pub const LOCK_KEY: &str = "_lk";

/// Errors that can occur during Record operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{0}' is not stored")]
    VirtualField(String),
    #[error("invalid value for field '{field}' of kind {kind:?}")]
    InvalidValue { field: String, kind: Kind },
    #[error("stored document has no valid id")]
    MissingId,
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// A dynamic entity of a described model.
///
/// Values are keyed by field name and type checked against the descriptor on
/// every `set`. Virtual fields (has-one / has-many) hold no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    meta: Arc<Meta>,
    id: Uuid,
    fields: HashMap<String, Value>,
}

impl Record {
    /// Create a record with a fresh id and zero values.
    pub fn new(meta: Arc<Meta>) -> Self {
        Self::with_id(meta, Uuid::new_v4())
    }

    pub fn with_id(meta: Arc<Meta>, id: Uuid) -> Self {
        let fields = meta
            .fields()
            .iter()
            .filter(|field| field.storage_name.is_some())
            .map(|field| (field.name.clone(), field.zero()))
            .collect();

        Self { meta, id, fields }
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set field value after checking it against the field kind
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, RecordError> {
        let value = value.into();
        let field = self
            .meta
            .field(name)
            .ok_or_else(|| RecordError::UnknownField(name.to_string()))?;

        if field.storage_name.is_none() {
            return Err(RecordError::VirtualField(name.to_string()));
        }

        if !field.kind.accepts(&value, field.optional) {
            return Err(RecordError::InvalidValue { field: name.to_string(), kind: field.kind });
        }

        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Get a to-one reference
    pub fn get_id(&self, name: &str) -> Option<Uuid> {
        self.get_str(name).and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Get a to-many reference list
    pub fn get_ids(&self, name: &str) -> Vec<Uuid> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check if a field differs from another version of the entity
    pub fn changed(&self, original: &Record, name: &str) -> bool {
        self.get(name) != original.get(name)
    }

    // ========================================
    // Storage conversion
    // ========================================

    /// Convert to a stored document keyed by storage names
    pub fn to_document(&self) -> Map<String, Value> {
        let mut document = Map::new();
        document.insert(ID_KEY.to_string(), Value::String(self.id.to_string()));

        for field in self.meta.fields() {
            if let Some(storage_name) = &field.storage_name {
                let value = self.fields.get(&field.name).cloned().unwrap_or_else(|| field.zero());
                document.insert(storage_name.clone(), value);
            }
        }

        document
    }

    /// Create record from a stored document. Missing fields get zero values
    /// and unknown keys are ignored.
    pub fn from_document(meta: Arc<Meta>, document: &Map<String, Value>) -> Result<Self, RecordError> {
        let id = document
            .get(ID_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(RecordError::MissingId)?;

        let mut record = Self::with_id(meta.clone(), id);
        for field in meta.fields() {
            let Some(storage_name) = &field.storage_name else {
                continue;
            };
            if let Some(value) = document.get(storage_name) {
                record.set(&field.name, value.clone())?;
            }
        }

        Ok(record)
    }

    // ========================================
    // Typed conversion
    // ========================================

    /// Convert to a JSON object keyed by field names, with the id under "id"
    pub fn to_json(&self) -> Value {
        let mut object: Map<String, Value> =
            self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        object.insert("id".to_string(), Value::String(self.id.to_string()));
        Value::Object(object)
    }

    /// Decode into a typed model
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RecordError> {
        serde_json::from_value(self.to_json()).map_err(|e| RecordError::InvalidDocument(e.to_string()))
    }

    /// Encode a typed model into a record of its descriptor
    pub fn encode<T: Model + Serialize>(model: &T) -> Result<Self, RecordError> {
        let value = serde_json::to_value(model).map_err(|e| RecordError::InvalidDocument(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(RecordError::InvalidDocument("expected JSON object".to_string()));
        };

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        let mut record = Self::with_id(T::meta(), id);
        for (key, value) in object {
            if key == "id" {
                continue;
            }
            record.set(&key, value)?;
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use serde::Deserialize;
    use serde_json::json;

    static NOTE: Lazy<Arc<Meta>> = Lazy::new(|| {
        Arc::new(
            Meta::build("Note", "notes")
                .attribute("title", Kind::String)
                .attribute("stars", Kind::Integer)
                .hidden("deleted_at", Kind::Timestamp)
                .optional()
                .to_one("post", "posts")
                .to_many("tags", "tags")
                .has_many("likes", "likes", "note")
                .finish()
                .unwrap(),
        )
    });

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: Uuid,
        title: String,
        stars: i64,
        deleted_at: Option<String>,
        post: Uuid,
        tags: Vec<Uuid>,
    }

    impl Model for Note {
        fn meta() -> Arc<Meta> {
            NOTE.clone()
        }
    }

    #[test]
    fn starts_with_zero_values() {
        let record = Record::new(NOTE.clone());
        assert_eq!(record.get("title"), Some(&json!("")));
        assert_eq!(record.get("deleted_at"), Some(&Value::Null));
        assert_eq!(record.get_id("post"), Some(Uuid::nil()));
        assert!(record.get_ids("tags").is_empty());
        assert_eq!(record.get("likes"), None);
    }

    #[test]
    fn type_checks_assignments() {
        let mut record = Record::new(NOTE.clone());

        assert!(record.set("title", "Hello").is_ok());
        assert_eq!(
            record.set("title", 12).unwrap_err(),
            RecordError::InvalidValue { field: "title".to_string(), kind: Kind::String }
        );
        assert_eq!(record.set("likes", json!([])).unwrap_err(), RecordError::VirtualField("likes".to_string()));
        assert_eq!(record.set("nope", 1).unwrap_err(), RecordError::UnknownField("nope".to_string()));
        assert!(record.set("post", "not-an-id").is_err());
    }

    #[test]
    fn converts_to_and_from_documents() {
        let mut record = Record::new(NOTE.clone());
        record.set("title", "Hello").unwrap();
        record.set("stars", 3).unwrap();

        let document = record.to_document();
        assert_eq!(document.get(ID_KEY), Some(&json!(record.id().to_string())));
        assert!(!document.contains_key("likes"));

        let restored = Record::from_document(NOTE.clone(), &document).unwrap();
        assert_eq!(restored, record);

        let mut broken = document.clone();
        broken.remove(ID_KEY);
        assert_eq!(Record::from_document(NOTE.clone(), &broken).unwrap_err(), RecordError::MissingId);
    }

    #[test]
    fn decodes_and_encodes_typed_models() {
        let post = Uuid::new_v4();
        let mut record = Record::new(NOTE.clone());
        record.set("title", "Typed").unwrap();
        record.set("post", post.to_string()).unwrap();

        let note: Note = record.decode().unwrap();
        assert_eq!(note.id, record.id());
        assert_eq!(note.title, "Typed");
        assert_eq!(note.post, post);

        let encoded = Record::encode(&note).unwrap();
        assert_eq!(encoded, record);
    }

    #[test]
    fn reports_changes() {
        let original = Record::new(NOTE.clone());
        let mut record = original.clone();
        record.set("stars", 5).unwrap();

        assert!(record.changed(&original, "stars"));
        assert!(!record.changed(&original, "title"));
    }
}
