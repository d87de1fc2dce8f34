//! Document database boundary
//!
//! The hosted document database is opaque to the rest of the crate: records
//! are JSON objects grouped in named collections and addressed by id, and
//! the only query capability used is filter, order, limit and start-after.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when reading or writing records
#[derive(Debug, Error)]
pub enum DataError {
    /// The addressed record does not exist
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// The document store failed the request
    #[error("Document store error: {0}")]
    Store(String),

    /// A stored record does not have the expected shape
    #[error("Malformed record {collection}/{id}: {source}")]
    Malformed {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded for storage
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A stored record and its id
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    /// Field is an array sharing at least one element with the filter's array
    ArrayContainsAny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Query over one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    /// Id of the record the page starts after
    pub start_after: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, id: Option<String>) -> Self {
        self.start_after = id;
        self
    }

    /// Adds a case-insensitive prefix match on `field`
    ///
    /// Expressed as a range so that stores with only ordered indexes can serve it.
    pub fn prefix(self, field: &str, prefix: &str) -> Self {
        let lower = prefix.to_lowercase();
        let upper = format!("{}\u{f8ff}", lower);
        self.filter(field, FilterOp::Gte, lower)
            .filter(field, FilterOp::Lte, upper)
    }
}

/// Keyed-record store with a query capability
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches one record, `None` if it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DataError>;

    /// Runs a query and returns the matching records in order
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DataError>;

    /// Stores a new record and returns its generated id
    async fn add(&self, collection: &str, data: Value) -> Result<String, DataError>;

    /// Merges `patch` into an existing record
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), DataError>;

    /// Removes a record; deleting a missing record is not an error
    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError>;
}
