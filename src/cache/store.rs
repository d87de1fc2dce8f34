//! Durable key-value storage backing the response cache
//!
//! The cache only needs two primitives from its backing store: read a string
//! item by key, and write a string item by key. `FileStore` keeps each item as
//! a JSON file in an XDG-compliant cache directory; `MemoryStore` keeps items
//! in-process and is what tests use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by a durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store cannot currently serve requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value persistence primitive addressed by string keys
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Reads the item stored under `key`, `None` if nothing was ever written
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the item stored under `key`
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Stores items as files in a directory
///
/// Each storage key maps to `<dir>/<sanitized key>.json`. Writes go to a
/// temporary sibling first and are renamed into place, so a crash mid-write
/// never leaves a truncated snapshot behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where item files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore rooted at `dir`
    ///
    /// See [`CacheConfig`](crate::config::CacheConfig) for the default XDG location.
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory holding the item files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for a storage key
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced so keys like
    /// `@datescape_cache` stay valid file names on every platform.
    pub fn item_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.item_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.item_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek at a stored item
    pub fn item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Seeds an item without going through the async trait
    pub fn insert(&self, key: &str, value: impl Into<String>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.item(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_get_item_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.get_item("missing").await.expect("Read should succeed");

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[tokio::test]
    async fn test_set_item_then_get_item() {
        let (store, _temp_dir) = create_test_store();

        store
            .set_item("@datescape_cache", r#"{"a":1}"#)
            .await
            .expect("Write should succeed");
        let result = store
            .get_item("@datescape_cache")
            .await
            .expect("Read should succeed");

        assert_eq!(result.as_deref(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_set_item_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store.set_item("k", "v").await.expect("Write should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
        assert!(store.item_path("k").exists(), "Item file should exist");
    }

    #[tokio::test]
    async fn test_set_item_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();

        store.set_item("k", "v1").await.expect("Write should succeed");
        store.set_item("k", "v2").await.expect("Write should succeed");

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .expect("Should list dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[test]
    fn test_item_path_sanitizes_key() {
        let store = FileStore::with_dir(PathBuf::from("/tmp/x"));

        assert_eq!(
            store.item_path("@datescape_cache"),
            PathBuf::from("/tmp/x/_datescape_cache.json")
        );
        assert_eq!(
            store.item_path("../etc/passwd"),
            PathBuf::from("/tmp/x/___etc_passwd.json")
        );
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_item("k").await.unwrap().is_none());

        store.set_item("k", "v").await.unwrap();

        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.item("k").as_deref(), Some("v"));
    }
}
