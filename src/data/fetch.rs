//! Read-through helpers shared by the data-access services

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::store::{DataError, Document, DocumentStore, Query};
use super::Page;
use crate::cache::{query_key, record_key, ResourceKind, ResponseCache};

/// Decodes a stored record, injecting its id as the `id` field
pub(crate) fn decode<T: DeserializeOwned>(
    collection: &str,
    id: &str,
    mut data: Value,
) -> Result<T, DataError> {
    if let Value::Object(fields) = &mut data {
        fields.insert("id".to_string(), Value::String(id.to_string()));
    }
    serde_json::from_value(data).map_err(|source| DataError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

/// Fetches one record, serving it from the cache when possible
///
/// Missing records are not cached, so a record created later is seen on the
/// next read.
pub(crate) async fn record<T>(
    docs: &dyn DocumentStore,
    cache: &ResponseCache,
    kind: ResourceKind,
    collection: &str,
    id: &str,
) -> Result<Option<T>, DataError>
where
    T: Serialize + DeserializeOwned,
{
    let key = record_key(kind, id);
    if let Some(cached) = cache.get::<T>(&key).await {
        return Ok(Some(cached));
    }

    debug!(collection, id, "Fetching record");
    let Some(data) = docs.get(collection, id).await? else {
        return Ok(None);
    };

    let record: T = decode(collection, id, data)?;
    cache.set(&key, &record).await;
    Ok(Some(record))
}

/// Runs a paginated query, serving it from the cache when possible
///
/// `options` is what the caller asked for; it alone determines the cache key.
/// `query` must already carry the page limit.
pub(crate) async fn page<T, O>(
    docs: &dyn DocumentStore,
    cache: &ResponseCache,
    kind: ResourceKind,
    collection: &str,
    options: &O,
    query: Query,
) -> Result<Page<T>, DataError>
where
    T: Serialize + DeserializeOwned,
    O: Serialize + ?Sized,
{
    let key = query_key(kind, options);
    if let Some(cached) = cache.get::<Page<T>>(&key).await {
        return Ok(cached);
    }

    debug!(collection, ?query, "Running query");
    let results = docs.query(collection, &query).await?;
    let has_more = query.limit.is_some_and(|limit| results.len() == limit);
    let last_id = results.last().map(|doc| doc.id.clone());

    let items = results
        .into_iter()
        .map(|Document { id, data }| decode(collection, &id, data))
        .collect::<Result<Vec<T>, _>>()?;

    let page = Page {
        items,
        last_id,
        has_more,
    };
    cache.set(&key, &page).await;
    Ok(page)
}
