use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::filter::{Filter, FilterError, Sort};

/// Stored document keyed by storage names, with the id under `_id`
pub type StoredDocument = Map<String, Value>;

/// Errors from the storage layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("locking requires a transaction")]
    TransactionRequired,

    #[error("operation timed out")]
    Timeout,

    #[error("invalid query: {0}")]
    Query(#[from] FilterError),

    #[error("invalid document: {0}")]
    Document(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(db_err.constraint().unwrap_or_default().to_string())
            }
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Options for `Session::find_many`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<Sort>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Lock every returned document
    pub lock: bool,
    /// Only return these keys (plus `_id`)
    pub projection: Option<Vec<String>>,
}

/// Storage operations against named collections.
///
/// A session either wraps a transaction (`Store::begin`) or executes every
/// operation on its own (`Store::session`). Dropping a transactional session
/// without calling `commit` rolls it back.
#[async_trait]
pub trait Session: Send {
    fn in_transaction(&self) -> bool;

    /// Find the first matching document, optionally incrementing its lock
    /// counter. Locking requires a transaction.
    async fn find_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        lock: bool,
    ) -> Result<Option<StoredDocument>, StoreError>;

    async fn find_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    async fn count(&mut self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn insert(&mut self, collection: &str, document: StoredDocument) -> Result<(), StoreError>;

    /// Insert unless a document matches the filter. Returns whether the
    /// document was inserted.
    async fn insert_if_absent(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError>;

    /// Replace the document with the same id. Returns whether it was found.
    async fn replace(&mut self, collection: &str, document: StoredDocument) -> Result<bool, StoreError>;

    /// Replace the document with the same id if it also matches the filter.
    /// Returns whether it was replaced.
    async fn replace_if_matches(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError>;

    /// Set individual keys of a document. Returns whether it was found.
    async fn update_fields(
        &mut self,
        collection: &str,
        id: Uuid,
        patch: StoredDocument,
    ) -> Result<bool, StoreError>;

    /// Returns whether the document existed.
    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Factory for storage sessions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transactional session
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError>;

    /// Open a session that applies every operation immediately
    async fn session(&self) -> Result<Box<dyn Session>, StoreError>;
}

/// Extract the id of a stored document
pub fn document_id(document: &StoredDocument) -> Result<Uuid, StoreError> {
    document
        .get(crate::database::record::ID_KEY)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| StoreError::Document("missing or invalid _id".to_string()))
}

/// Reduce a document to the projected keys and `_id`
pub fn project(document: StoredDocument, projection: Option<&[String]>) -> StoredDocument {
    match projection {
        None => document,
        Some(keys) => document
            .into_iter()
            .filter(|(key, _)| key == crate::database::record::ID_KEY || keys.contains(key))
            .collect(),
    }
}
