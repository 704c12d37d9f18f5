use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::record::{ID_KEY, LOCK_KEY};
use super::store::{document_id, project, FindOptions, Session, Store, StoreError, StoredDocument};
use crate::filter::{compare_documents, Filter};

#[derive(Debug, Clone, Default)]
struct Collection {
    documents: Vec<StoredDocument>,
    unique: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct State {
    collections: HashMap<String, Collection>,
}

impl State {
    fn collection(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    fn position(&mut self, collection: &str, filter: &Filter) -> Option<usize> {
        self.collection(collection).documents.iter().position(|doc| filter.matches(doc))
    }

    fn position_of(&mut self, collection: &str, id: Uuid) -> Option<usize> {
        self.position(collection, &Filter::id(id))
    }

    /// Check the id and all unique indexes, ignoring the document at `skip`.
    fn check_unique(
        &mut self,
        collection: &str,
        document: &StoredDocument,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        let coll = self.collection(collection);
        let id = document.get(ID_KEY);

        for (index, other) in coll.documents.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if other.get(ID_KEY) == id {
                return Err(StoreError::Duplicate(format!("{}_pkey", collection)));
            }
            for keys in &coll.unique {
                let collides = keys.iter().all(|key| {
                    let value = document.get(key).unwrap_or(&Value::Null);
                    !value.is_null() && other.get(key) == Some(value)
                });
                if collides {
                    return Err(StoreError::Duplicate(format!("{}_{}_key", collection, keys.join("_"))));
                }
            }
        }

        Ok(())
    }

    fn find_many(&mut self, collection: &str, filter: &Filter, options: &FindOptions) -> Vec<StoredDocument> {
        let coll = self.collection(collection);

        let mut indexes: Vec<usize> = coll
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(index, _)| index)
            .collect();

        if !options.sort.is_empty() {
            indexes.sort_by(|&a, &b| compare_documents(&coll.documents[a], &coll.documents[b], &options.sort));
        }

        let limit = options.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let selected: Vec<usize> = indexes.into_iter().skip(skip).take(limit).collect();

        selected
            .into_iter()
            .map(|index| {
                let doc = &mut coll.documents[index];
                if options.lock {
                    bump_lock(doc);
                }
                project(strip(doc.clone()), options.projection.as_deref())
            })
            .collect()
    }

    fn replace_at(&mut self, collection: &str, index: usize, mut document: StoredDocument) -> Result<(), StoreError> {
        self.check_unique(collection, &document, Some(index))?;
        let coll = self.collection(collection);
        if let Some(lock) = coll.documents[index].get(LOCK_KEY).cloned() {
            document.insert(LOCK_KEY.to_string(), lock);
        }
        coll.documents[index] = document;
        Ok(())
    }
}

fn bump_lock(document: &mut StoredDocument) {
    let current = document.get(LOCK_KEY).and_then(Value::as_i64).unwrap_or(0);
    document.insert(LOCK_KEY.to_string(), Value::from(current + 1));
}

fn strip(mut document: StoredDocument) -> StoredDocument {
    document.remove(LOCK_KEY);
    document
}

/// In-memory document store.
///
/// Transactions operate on a private copy of the data and hold the store
/// lock until they are committed or dropped, so they are fully serialized.
/// Sessions without a transaction take the lock per operation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique index over one or more keys of a collection.
    /// Documents with a null value in any of the keys are not indexed.
    pub async fn unique_index(&self, collection: &str, keys: &[&str]) {
        let mut state = self.state.lock().await;
        state
            .collection(collection)
            .unique
            .push(keys.iter().map(|key| key.to_string()).collect());
    }

    /// Raw copy of all documents in a collection, in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        let mut state = self.state.lock().await;
        state.collection(collection).documents.iter().cloned().map(strip).collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { mode: Mode::Transaction { guard, working } }))
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        Ok(Box::new(MemorySession { mode: Mode::Direct(self.state.clone()) }))
    }
}

enum Mode {
    Transaction { guard: OwnedMutexGuard<State>, working: State },
    Direct(Arc<Mutex<State>>),
}

pub struct MemorySession {
    mode: Mode,
}

impl MemorySession {
    async fn with_state<R: Send>(&mut self, apply: impl FnOnce(&mut State) -> R + Send) -> R {
        match &mut self.mode {
            Mode::Transaction { working, .. } => apply(working),
            Mode::Direct(state) => {
                let mut guard = state.lock().await;
                apply(&mut guard)
            }
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn in_transaction(&self) -> bool {
        matches!(self.mode, Mode::Transaction { .. })
    }

    async fn find_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        lock: bool,
    ) -> Result<Option<StoredDocument>, StoreError> {
        if lock && !self.in_transaction() {
            return Err(StoreError::TransactionRequired);
        }

        Ok(self
            .with_state(|state| {
                let index = state.position(collection, filter)?;
                let doc = &mut state.collection(collection).documents[index];
                if lock {
                    bump_lock(doc);
                }
                Some(strip(doc.clone()))
            })
            .await)
    }

    async fn find_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        if options.lock && !self.in_transaction() {
            return Err(StoreError::TransactionRequired);
        }

        Ok(self.with_state(|state| state.find_many(collection, filter, options)).await)
    }

    async fn count(&mut self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self
            .with_state(|state| {
                state.collection(collection).documents.iter().filter(|doc| filter.matches(doc)).count() as u64
            })
            .await)
    }

    async fn insert(&mut self, collection: &str, document: StoredDocument) -> Result<(), StoreError> {
        document_id(&document)?;
        self.with_state(|state| {
            state.check_unique(collection, &document, None)?;
            state.collection(collection).documents.push(document);
            Ok(())
        })
        .await
    }

    async fn insert_if_absent(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError> {
        document_id(&document)?;
        self.with_state(|state| {
            if state.position(collection, filter).is_some() {
                return Ok(false);
            }
            state.check_unique(collection, &document, None)?;
            state.collection(collection).documents.push(document);
            Ok(true)
        })
        .await
    }

    async fn replace(&mut self, collection: &str, document: StoredDocument) -> Result<bool, StoreError> {
        let id = document_id(&document)?;
        self.with_state(|state| match state.position_of(collection, id) {
            Some(index) => state.replace_at(collection, index, document).map(|_| true),
            None => Ok(false),
        })
        .await
    }

    async fn replace_if_matches(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError> {
        let id = document_id(&document)?;
        let filter = Filter::and(vec![Filter::id(id), filter.clone()]);
        self.with_state(|state| match state.position(collection, &filter) {
            Some(index) => state.replace_at(collection, index, document).map(|_| true),
            None => Ok(false),
        })
        .await
    }

    async fn update_fields(
        &mut self,
        collection: &str,
        id: Uuid,
        patch: StoredDocument,
    ) -> Result<bool, StoreError> {
        self.with_state(|state| {
            let Some(index) = state.position_of(collection, id) else {
                return Ok(false);
            };
            let mut document = state.collection(collection).documents[index].clone();
            for (key, value) in patch {
                if key != ID_KEY {
                    document.insert(key, value);
                }
            }
            state.replace_at(collection, index, document).map(|_| true)
        })
        .await
    }

    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .with_state(|state| match state.position_of(collection, id) {
                Some(index) => {
                    state.collection(collection).documents.remove(index);
                    true
                }
                None => false,
            })
            .await)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySession { mode } = *self;
        if let Mode::Transaction { mut guard, working } = mode {
            *guard = working;
        }
        Ok(())
    }
}
