//! In-memory document store.
//!
//! Backs the `--documents` CLI mode (loaded from a JSON fixture) and the tests.
//! Uses `RwLock` because `DocumentStore` must be `Send + Sync` to live behind
//! spawned fetch tasks.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Map, Value};

use super::document::{
    Condition, Document, DocumentQuery, DocumentStore, StoreError, compare_keyset,
};
use crate::core::item::Item;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    simulate_failure: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `{"collection": [{"id": "..", ...}, ...], ...}`.
    /// Documents without a string `id` get a generated one.
    pub fn from_fixture(fixture: Value) -> Result<Self, StoreError> {
        let Value::Object(collections) = fixture else {
            return Err(StoreError::Decode(
                "fixture must be an object of collections".to_string(),
            ));
        };
        let store = Self::new();
        for (collection, documents) in collections {
            let Value::Array(documents) = documents else {
                return Err(StoreError::Decode(format!(
                    "collection '{collection}' must be an array"
                )));
            };
            for document in documents {
                let Value::Object(mut fields) = document else {
                    return Err(StoreError::Decode(format!(
                        "collection '{collection}' contains a non-object document"
                    )));
                };
                match fields.remove("id") {
                    Some(Value::String(id)) => store.insert_with_id(&collection, id, fields)?,
                    _ => {
                        store.insert(&collection, fields)?;
                    }
                }
            }
        }
        Ok(store)
    }

    pub fn load_fixture(path: &Path) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        let fixture: Value =
            serde_json::from_str(&contents).map_err(|e| StoreError::Decode(e.to_string()))?;
        let store = Self::from_fixture(fixture)?;
        info!("Loaded document fixture from {}", path.display());
        Ok(store)
    }

    /// Inserts a document with a generated id and returns the id.
    pub fn insert(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert_with_id(collection, id.clone(), fields)?;
        Ok(id)
    }

    /// Inserts or replaces the document with `id`.
    pub fn insert_with_id(
        &self,
        collection: &str,
        id: String,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let documents = collections.entry(collection.to_string()).or_default();
        documents.retain(|d| d.id != id);
        documents.push(Document { id, fields });
        Ok(())
    }

    /// Makes every subsequent operation fail with `StoreError::Query`.
    pub fn set_simulate_failure(&self, simulate: bool) {
        self.simulate_failure.store(simulate, AtomicOrdering::SeqCst);
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.simulate_failure.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Query("simulated failure".to_string()));
        }
        Ok(())
    }

    fn matching(&self, collection: &str, conditions: &[Condition]) -> Result<Vec<Item>, StoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .map(|documents| {
                // Conditions see the id too, so `id in [...]` works
                documents
                    .iter()
                    .map(|d| d.clone().into_item())
                    .filter(|item| {
                        item.as_object()
                            .is_some_and(|fields| conditions.iter().all(|c| c.matches(fields)))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn poisoned() -> StoreError {
    StoreError::Query("store lock poisoned".to_string())
}

/// Splits an item back into a document.
fn item_to_document(item: Item) -> Document {
    let mut fields = match item {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Document { id, fields }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        self.check_failure()?;
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);

        let mut items = self.matching(&query.collection, &query.conditions)?;
        let order = query.order_by.as_ref();
        items.sort_by(|a, b| compare_keyset(a, b, order));

        let start = match &query.start_after {
            Some(after) => items
                .iter()
                .position(|item| compare_keyset(item, after, order).is_gt())
                .unwrap_or(items.len()),
            None => 0,
        };
        let end = query
            .limit
            .map_or(items.len(), |limit| (start + limit).min(items.len()));

        debug!(
            "Memory query on {}: {} matches, returning [{start}, {end})",
            query.collection,
            items.len()
        );
        Ok(items.drain(start..end).map(item_to_document).collect())
    }

    async fn count(&self, collection: &str, conditions: &[Condition]) -> Result<usize, StoreError> {
        self.check_failure()?;
        Ok(self.matching(collection, conditions)?.len())
    }

    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        self.check_failure()?;
        let Some((collection, id)) = path.split_once('/') else {
            return Err(StoreError::Query(format!("invalid document path '{path}'")));
        };
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| d.id == id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::document::{FilterOp, OrderBy};
    use serde_json::json;

    fn store() -> MemoryDocumentStore {
        MemoryDocumentStore::from_fixture(json!({
            "posts": [
                {"id": "p1", "score": 3, "author": "users/u1"},
                {"id": "p2", "score": 7, "author": "users/u2"},
                {"id": "p3", "score": 5, "author": "users/u1"},
                {"id": "p4", "score": 1}
            ],
            "users": [
                {"id": "u1", "name": "Ada"},
                {"id": "u2", "name": "Linus"}
            ]
        }))
        .unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_query_orders_and_limits() {
        let store = store();
        let query = DocumentQuery {
            collection: "posts".into(),
            order_by: Some(OrderBy {
                field: "score".into(),
                descending: true,
            }),
            limit: Some(2),
            ..Default::default()
        };
        let docs = store.query(&query).await.unwrap();
        assert_eq!(ids(&docs), vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn test_query_start_after_is_exclusive() {
        let store = store();
        let query = DocumentQuery {
            collection: "posts".into(),
            order_by: Some(OrderBy {
                field: "score".into(),
                descending: false,
            }),
            start_after: Some(json!({"id": "p1", "score": 3})),
            ..Default::default()
        };
        let docs = store.query(&query).await.unwrap();
        assert_eq!(ids(&docs), vec!["p3", "p2"]);
    }

    #[tokio::test]
    async fn test_count_applies_conditions() {
        let store = store();
        let conditions = vec![Condition::new("score", FilterOp::Ge, json!(3))];
        assert_eq!(store.count("posts", &conditions).await.unwrap(), 3);
        assert_eq!(store.count("missing", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_by_path() {
        let store = store();
        let doc = store.get("users/u2").await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("Linus"));
        assert!(store.get("users/nope").await.unwrap().is_none());
        assert!(store.get("no-slash").await.is_err());
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let store = store();
        store.set_simulate_failure(true);
        assert!(matches!(
            store.count("posts", &[]).await,
            Err(StoreError::Query(_))
        ));
    }

    #[test]
    fn test_fixture_generates_missing_ids() {
        let store = MemoryDocumentStore::from_fixture(json!({"notes": [{"text": "hi"}]})).unwrap();
        let collections = store.collections.read().unwrap();
        assert_eq!(collections["notes"].len(), 1);
        assert!(!collections["notes"][0].id.is_empty());
    }

    #[test]
    fn test_fixture_rejects_non_array_collection() {
        assert!(MemoryDocumentStore::from_fixture(json!({"notes": 3})).is_err());
    }
}
