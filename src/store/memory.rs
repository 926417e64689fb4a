//! In-process document store. Every operation holds the lock for its whole
//! read/modify/write, so single-document updates are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    parse_id, prepare_new, prepare_update, unique_key, Collection, Document, DocumentStore,
    StoreError, ID_FIELD,
};
use crate::query::{eval, FindQuery};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

fn ensure_unique(
    collection: Collection,
    docs: &[Document],
    candidate: &Document,
) -> Result<(), StoreError> {
    let own_id = id_of(candidate);
    for field in collection.schema().unique_fields() {
        let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let key = unique_key(value);
        let taken = docs.iter().any(|d| {
            id_of(d) != own_id && d.get(field).map(unique_key).as_deref() == Some(key.as_str())
        });
        if taken {
            return Err(StoreError::Duplicate {
                field: field.to_string(),
                value: key,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.read().await;
        let docs = guard.get(&query.collection).map(Vec::as_slice).unwrap_or(&[]);
        let out = eval::execute(query, docs);
        debug!(collection = query.collection.name(), matched = out.len(), "find");
        Ok(out)
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        parse_id(id)?;
        let guard = self.collections.read().await;
        Ok(guard
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| id_of(d) == Some(id)))
            .cloned())
    }

    async fn create(&self, collection: Collection, attrs: Document) -> Result<Document, StoreError> {
        let doc = prepare_new(collection, attrs)?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        ensure_unique(collection, docs, &doc)?;
        docs.push(doc.clone());
        debug!(collection = collection.name(), id = ?id_of(&doc), "created");
        Ok(doc)
    }

    async fn find_by_id_and_update(
        &self,
        collection: Collection,
        id: &str,
        attrs: Document,
    ) -> Result<Option<Document>, StoreError> {
        parse_id(id)?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        let Some(pos) = docs.iter().position(|d| id_of(d) == Some(id)) else {
            return Ok(None);
        };
        let updated = prepare_update(collection, docs[pos].clone(), attrs)?;
        ensure_unique(collection, docs, &updated)?;
        docs[pos] = updated.clone();
        Ok(Some(updated))
    }

    async fn find_by_id_and_delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        parse_id(id)?;
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(&collection) else {
            return Ok(None);
        };
        let removed = docs
            .iter()
            .position(|d| id_of(d) == Some(id))
            .map(|pos| docs.remove(pos));
        Ok(removed)
    }
}
