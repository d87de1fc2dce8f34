//! Response cache for fetched resources
//!
//! Entries live in memory with a TTL and are mirrored to a durable store as a
//! single JSON snapshot, so they survive restarts. Data-access code reads
//! through the cache, writes fetched results back, and invalidates keys after
//! mutations. See [`key`] for how keys are built.

pub mod key;
mod manager;
mod store;

pub use key::{canonical_json, query_key, query_options, record_key, ResourceKind};
pub use manager::{EntryInfo, ResponseCache, DEFAULT_TTL, STORAGE_KEY};
pub use store::{DurableStore, FileStore, MemoryStore, StoreError};
