//! In-process document store
//!
//! Holds collections as ordered maps of JSON objects. Used by tests and for
//! running the data layer without a hosted database.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};

use super::store::{DataError, Direction, Document, DocumentStore, Filter, FilterOp, Query};

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Collection>>,
    next_id: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under a caller-chosen id, replacing any existing record
    pub fn insert(&self, collection: &str, id: &str, data: Value) {
        self.with_collections(|collections| {
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), data);
        });
    }

    /// Number of records in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.with_collections(|collections| collections.get(collection).map_or(0, |c| c.len()))
    }

    fn with_collections<R>(&self, f: impl FnOnce(&mut HashMap<String, Collection>) -> R) -> R {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut collections)
    }
}

/// Orders two JSON scalars of the same kind; `None` for mixed or non-scalar values
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn filter_matches(data: &Value, filter: &Filter) -> bool {
    let Some(field) = data.get(&filter.field) else {
        return false;
    };

    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::Gte => matches!(
            compare_values(field, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte => matches!(
            compare_values(field, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::ArrayContainsAny => match (field.as_array(), filter.value.as_array()) {
            (Some(have), Some(wanted)) => have.iter().any(|v| wanted.contains(v)),
            _ => false,
        },
    }
}

/// Missing fields sort before present ones
fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DataError> {
        Ok(self.with_collections(|collections| {
            collections.get(collection).and_then(|c| c.get(id)).cloned()
        }))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DataError> {
        let mut docs: Vec<Document> = self.with_collections(|collections| {
            collections
                .get(collection)
                .map(|c| {
                    c.iter()
                        .filter(|(_, data)| query.filters.iter().all(|f| filter_matches(data, f)))
                        .map(|(id, data)| Document {
                            id: id.clone(),
                            data: data.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        });

        // Ties (and unordered queries) fall back to id order, like `__name__`
        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_field(&a.data, &b.data, field);
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            });
        }

        if let Some(cursor) = &query.start_after {
            // A cursor that no longer exists yields an empty page
            docs = match docs.iter().position(|d| &d.id == cursor) {
                Some(pos) => docs.split_off(pos + 1),
                None => Vec::new(),
            };
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        Ok(docs)
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, DataError> {
        let id = format!(
            "{}-{}",
            collection,
            self.next_id.fetch_add(1, AtomicOrdering::Relaxed) + 1
        );
        self.insert(collection, &id, data);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), DataError> {
        self.with_collections(|collections| {
            let record = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| DataError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;

            match (record.as_object_mut(), patch) {
                (Some(fields), Value::Object(changes)) => {
                    for (key, value) in changes {
                        fields.insert(key, value);
                    }
                    Ok(())
                }
                (_, patch) => Err(DataError::Store(format!(
                    "cannot merge {} into {}/{}",
                    patch, collection, id
                ))),
            }
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError> {
        self.with_collections(|collections| {
            if let Some(c) = collections.get_mut(collection) {
                c.remove(id);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_store() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        store.insert(
            "restaurants",
            "a",
            json!({"rating": 4.2, "cuisine": "Italian", "tags": ["romantic", "wine"]}),
        );
        store.insert(
            "restaurants",
            "b",
            json!({"rating": 4.8, "cuisine": "Sushi", "tags": ["quiet"]}),
        );
        store.insert(
            "restaurants",
            "c",
            json!({"rating": 4.5, "cuisine": "Italian", "tags": ["patio"]}),
        );
        store
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = seeded_store();
        let query = Query::new()
            .filter("cuisine", FilterOp::Eq, "Italian")
            .order_by("rating", Direction::Desc);

        let docs = store.query("restaurants", &query).await.unwrap();

        assert_eq!(ids(&docs), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_query_array_contains_any() {
        let store = seeded_store();
        let query = Query::new().filter("tags", FilterOp::ArrayContainsAny, json!(["quiet", "wine"]));

        let docs = store.query("restaurants", &query).await.unwrap();

        assert_eq!(ids(&docs), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_query_paginates_with_cursor() {
        let store = seeded_store();
        let first = Query::new().order_by("rating", Direction::Desc).limit(2);

        let page1 = store.query("restaurants", &first).await.unwrap();
        let page2 = store
            .query("restaurants", &first.clone().start_after(Some("c".to_string())))
            .await
            .unwrap();

        assert_eq!(ids(&page1), vec!["b", "c"]);
        assert_eq!(ids(&page2), vec!["a"]);
    }

    #[tokio::test]
    async fn test_query_range_filters() {
        let store = seeded_store();
        let query = Query::new()
            .filter("rating", FilterOp::Gte, 4.3)
            .filter("rating", FilterOp::Lte, 4.6);

        let docs = store.query("restaurants", &query).await.unwrap();

        assert_eq!(ids(&docs), vec!["c"]);
    }

    #[tokio::test]
    async fn test_prefix_matches_lowercased_text() {
        let store = MemoryDocumentStore::new();
        store.insert("events", "e1", json!({"searchableText": "jazz night"}));
        store.insert("events", "e2", json!({"searchableText": "comedy club"}));

        let docs = store
            .query("events", &Query::new().prefix("searchableText", "Jazz"))
            .await
            .unwrap();

        assert_eq!(ids(&docs), vec!["e1"]);
    }

    #[tokio::test]
    async fn test_add_update_delete() {
        let store = MemoryDocumentStore::new();

        let id = store.add("plans", json!({"title": "one"})).await.unwrap();
        store
            .update("plans", &id, json!({"title": "two", "notes": "x"}))
            .await
            .unwrap();

        assert_eq!(
            store.get("plans", &id).await.unwrap(),
            Some(json!({"title": "two", "notes": "x"}))
        );

        store.delete("plans", &id).await.unwrap();
        assert!(store.get("plans", &id).await.unwrap().is_none());
        assert_eq!(store.count("plans"), 0);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = MemoryDocumentStore::new();

        let result = store.update("plans", "nope", json!({"title": "x"})).await;

        assert!(matches!(result, Err(DataError::NotFound { .. })));
    }
}
