//! Response cache with TTL expiry and durable snapshot persistence
//!
//! `ResponseCache` keeps JSON payloads in memory, keyed by string, each with an
//! absolute expiry timestamp. After every mutation the full set of entries is
//! written to a [`DurableStore`] under one storage key, so the cache survives
//! process restarts. Storage failures are logged and never reach the caller:
//! the in-memory map stays authoritative.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::DurableStore;

/// Default time-to-live for cached entries
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Storage key the snapshot is persisted under
pub const STORAGE_KEY: &str = "@datescape_cache";

/// A cached payload as stored in memory and in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    /// The cached payload
    value: Value,
    /// When the entry was written
    cached_at: DateTime<Utc>,
    /// When the entry stops being served
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Metadata about a live entry, for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Set once the persisted snapshot has been merged in
    loaded: bool,
    /// Keys written or invalidated before load finished; they win over the snapshot
    touched: HashSet<String>,
    /// `clear` ran before load finished; the snapshot is discarded
    cleared: bool,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if !self.loaded {
            self.touched.insert(key.to_string());
        }
    }
}

/// Read-through/write-through cache for fetched resources
///
/// Construct one per process and share it (`Arc<ResponseCache>`) with every
/// data-access service. A cache built with [`ResponseCache::new`] starts empty
/// and unloaded; [`ResponseCache::open`] or [`ResponseCache::spawn_load`]
/// merge in the persisted snapshot. Reads before the load completes are plain
/// misses.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    store: Arc<dyn DurableStore>,
    storage_key: String,
    default_ttl: Duration,
    /// Serializes snapshot writes so the last write reflects the latest state
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("storage_key", &self.storage_key)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Creates an empty, unloaded cache backed by `store`
    pub fn new(store: Arc<dyn DurableStore>, default_ttl: Duration, storage_key: &str) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            store,
            storage_key: storage_key.to_string(),
            default_ttl,
            persist_lock: Mutex::new(()),
        }
    }

    /// Creates a cache with the default TTL and storage key, then loads the snapshot
    pub async fn open(store: Arc<dyn DurableStore>) -> Self {
        let cache = Self::new(store, DEFAULT_TTL, STORAGE_KEY);
        cache.load().await;
        cache
    }

    /// Loads the persisted snapshot on a background task
    ///
    /// The cache is usable immediately; lookups miss until the load lands.
    pub fn spawn_load(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.load().await })
    }

    /// Merges the persisted snapshot into memory, pruning expired entries
    ///
    /// Entries set, invalidated or cleared in memory before the load finished
    /// take precedence over what the snapshot holds. The merged state is
    /// written back when it differs from what was read. Calling `load` on an
    /// already loaded cache does nothing.
    pub async fn load(&self) {
        let _persist = self.persist_lock.lock().await;
        if self.state.lock().await.loaded {
            return;
        }

        let snapshot = match self.store.get_item(&self.storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Cache snapshot is malformed, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Failed to read cache snapshot, continuing in memory: {}", e);
                HashMap::new()
            }
        };

        let now = Utc::now();
        let json = {
            let mut state = self.state.lock().await;
            let mut dirty = state.cleared || !state.touched.is_empty();
            let mut pruned = 0usize;
            let mut restored = 0usize;

            for (key, entry) in snapshot {
                if entry.is_expired(now) {
                    pruned += 1;
                    dirty = true;
                    continue;
                }
                if state.cleared || state.touched.contains(&key) || state.entries.contains_key(&key)
                {
                    continue;
                }
                state.entries.insert(key, entry);
                restored += 1;
            }

            state.loaded = true;
            state.cleared = false;
            state.touched.clear();
            debug!(restored, pruned, "Cache snapshot loaded");

            if !dirty {
                return;
            }
            serde_json::to_string(&state.entries)
        };

        self.write_snapshot(json).await;
    }

    /// Returns the cached value for `key`, or `None` on a miss
    ///
    /// An expired entry is removed (from memory and the snapshot) and reported
    /// as a miss. A payload that does not deserialize into `T` is also a miss
    /// but stays cached.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = {
            let mut state = self.state.lock().await;
            let now = Utc::now();
            match state.entries.get(key).map(|e| e.is_expired(now)) {
                None => {
                    debug!(key, "Cache miss");
                    return None;
                }
                Some(true) => {
                    debug!(key, "Cache entry expired, removing");
                    state.entries.remove(key);
                    None
                }
                Some(false) => state.entries.get(key).map(|e| e.value.clone()),
            }
        };

        let Some(value) = value else {
            self.persist().await;
            return None;
        };

        match serde_json::from_value(value) {
            Ok(data) => {
                debug!(key, "Cache hit");
                Some(data)
            }
            Err(e) => {
                warn!(key, "Cached payload has an unexpected shape: {}", e);
                None
            }
        }
    }

    /// Caches `value` under `key` with the default TTL
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Caches `value` under `key`, expiring `ttl` from now
    ///
    /// Overwrites any existing entry for `key`.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "Payload is not serializable, skipping cache: {}", e);
                return;
            }
        };

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        {
            let mut state = self.state.lock().await;
            state.touch(key);
            state.entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    cached_at: now,
                    expires_at,
                },
            );
        }

        self.persist().await;
    }

    /// Removes the entry for `key`; a no-op if absent
    pub async fn invalidate(&self, key: &str) {
        {
            let mut state = self.state.lock().await;
            state.touch(key);
            if state.entries.remove(key).is_some() {
                debug!(key, "Cache entry invalidated");
            }
        }

        self.persist().await;
    }

    /// Removes every in-memory entry whose key matches `predicate`
    ///
    /// Returns the number of entries removed. Snapshot entries not yet loaded
    /// are not visited.
    pub async fn invalidate_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let removed = {
            let mut state = self.state.lock().await;
            let keys: Vec<String> = state
                .entries
                .keys()
                .filter(|key| predicate(key))
                .cloned()
                .collect();
            for key in &keys {
                state.touch(key);
                state.entries.remove(key);
            }
            keys.len()
        };

        if removed > 0 {
            debug!(removed, "Cache entries invalidated");
            self.persist().await;
        }
        removed
    }

    /// Removes all entries
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.entries.clear();
            if !state.loaded {
                state.cleared = true;
            }
        }

        self.persist().await;
    }

    /// Number of entries held in memory, expired or not
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the persisted snapshot has been merged in
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    /// Live (unexpired) entries, sorted by key
    pub async fn entries(&self) -> Vec<EntryInfo> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let mut entries: Vec<EntryInfo> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                cached_at: entry.cached_at,
                expires_at: entry.expires_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Writes the full in-memory state to the durable store
    ///
    /// Deferred while the snapshot has not been loaded yet; `load` writes the
    /// merged result itself.
    async fn persist(&self) {
        let _persist = self.persist_lock.lock().await;
        let json = {
            let state = self.state.lock().await;
            if !state.loaded {
                debug!("Cache snapshot write deferred until load completes");
                return;
            }
            serde_json::to_string(&state.entries)
        };

        self.write_snapshot(json).await;
    }

    async fn write_snapshot(&self, json: serde_json::Result<String>) {
        let json = match json {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache snapshot: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set_item(&self.storage_key, &json).await {
            warn!("Failed to persist cache snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{FileStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        title: String,
        value: i32,
    }

    fn test_data(title: &str, value: i32) -> TestData {
        TestData {
            title: title.to_string(),
            value,
        }
    }

    async fn create_test_cache() -> (ResponseCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::open(store.clone()).await;
        (cache, store)
    }

    fn snapshot(store: &MemoryStore) -> HashMap<String, Value> {
        let raw = store.item(STORAGE_KEY).expect("Snapshot should be persisted");
        serde_json::from_str(&raw).expect("Snapshot should be valid JSON")
    }

    /// Store whose reads and writes always fail
    struct BrokenStore;

    #[async_trait]
    impl DurableStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".to_string()))
        }

        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_key() {
        let (cache, _store) = create_test_cache().await;

        let result: Option<TestData> = cache.get("plan:missing").await;

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let (cache, _store) = create_test_cache().await;
        let data = test_data("Date Night", 1);

        cache.set("plan:p1", &data).await;

        assert_eq!(cache.get::<TestData>("plan:p1").await, Some(data));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (cache, store) = create_test_cache().await;

        cache
            .set_with_ttl("plan:p1", &test_data("short", 1), Duration::from_millis(20))
            .await;
        assert!(cache.get::<TestData>("plan:p1").await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get::<TestData>("plan:p1").await.is_none());
        assert_eq!(cache.len().await, 0, "Expired entry should be removed");
        assert!(
            !snapshot(&store).contains_key("plan:p1"),
            "Expired entry should be removed from the snapshot"
        );
    }

    #[tokio::test]
    async fn test_overwrite_existing_entry() {
        let (cache, _store) = create_test_cache().await;

        cache.set("plan:p1", &test_data("first", 1)).await;
        cache.set("plan:p1", &test_data("second", 2)).await;

        assert_eq!(
            cache.get::<TestData>("plan:p1").await,
            Some(test_data("second", 2))
        );
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (cache, store) = create_test_cache().await;
        cache.set("a", &1).await;
        cache.set("b", &2).await;

        cache.invalidate("a").await;
        let after_once = snapshot(&store);
        cache.invalidate("a").await;
        cache.invalidate("never-set").await;

        assert!(cache.get::<i32>("a").await.is_none());
        assert_eq!(cache.get::<i32>("b").await, Some(2));
        assert_eq!(snapshot(&store), after_once);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (cache, store) = create_test_cache().await;
        cache.set("a", &1).await;
        cache.set("b", &2).await;

        cache.clear().await;

        assert!(cache.get::<i32>("a").await.is_none());
        assert!(cache.get::<i32>("b").await.is_none());
        assert!(snapshot(&store).is_empty(), "Persisted snapshot should be empty");
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let first = ResponseCache::open(store.clone()).await;
        first.set("plan:p1", &test_data("Date Night", 7)).await;
        drop(first);

        let second = ResponseCache::open(store.clone()).await;

        assert_eq!(
            second.get::<TestData>("plan:p1").await,
            Some(test_data("Date Night", 7))
        );
    }

    #[tokio::test]
    async fn test_survives_restart_with_file_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(FileStore::with_dir(temp_dir.path().to_path_buf()));

        let first = ResponseCache::open(store.clone()).await;
        first.set("restaurants:{\"limit\":20}", &json!([1, 2, 3])).await;
        drop(first);

        let second = ResponseCache::open(store).await;

        assert_eq!(
            second.get::<Vec<i32>>("restaurants:{\"limit\":20}").await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_load_prunes_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        let past = Utc::now() - chrono::Duration::minutes(1);
        let future = Utc::now() + chrono::Duration::minutes(5);
        store.insert(
            STORAGE_KEY,
            json!({
                "plan:old": {"value": {"title": "old"}, "cachedAt": past, "expiresAt": past},
                "plan:new": {"value": {"title": "new"}, "cachedAt": past, "expiresAt": future},
            })
            .to_string(),
        );

        let cache = ResponseCache::open(store.clone()).await;

        assert!(cache.get::<Value>("plan:old").await.is_none());
        assert_eq!(
            cache.get::<Value>("plan:new").await,
            Some(json!({"title": "new"}))
        );
        let persisted = snapshot(&store);
        assert!(!persisted.contains_key("plan:old"));
        assert!(persisted.contains_key("plan:new"));
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.insert(STORAGE_KEY, "{not json");

        let cache = ResponseCache::open(store.clone()).await;

        assert!(cache.is_loaded().await);
        assert!(cache.is_empty().await);

        cache.set("a", &1).await;
        assert_eq!(snapshot(&store).len(), 1, "Next write replaces the bad snapshot");
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_memory() {
        let cache = ResponseCache::open(Arc::new(BrokenStore)).await;

        cache.set("plan:p1", &test_data("Date Night", 1)).await;

        assert!(cache.is_loaded().await);
        assert_eq!(
            cache.get::<TestData>("plan:p1").await,
            Some(test_data("Date Night", 1))
        );
        cache.invalidate("plan:p1").await;
        assert!(cache.get::<TestData>("plan:p1").await.is_none());
    }

    #[tokio::test]
    async fn test_get_before_load_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let seeded = ResponseCache::open(store.clone()).await;
        seeded.set("plan:p1", &1).await;

        let cache = Arc::new(ResponseCache::new(store, DEFAULT_TTL, STORAGE_KEY));
        assert!(cache.get::<i32>("plan:p1").await.is_none());

        cache.spawn_load().await.expect("Load task should not panic");

        assert_eq!(cache.get::<i32>("plan:p1").await, Some(1));
    }

    #[tokio::test]
    async fn test_mutations_before_load_win_over_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let seeded = ResponseCache::open(store.clone()).await;
        seeded.set("kept", &1).await;
        seeded.set("overwritten", &1).await;
        seeded.set("invalidated", &1).await;
        drop(seeded);

        let cache = ResponseCache::new(store.clone(), DEFAULT_TTL, STORAGE_KEY);
        cache.set("overwritten", &2).await;
        cache.invalidate("invalidated").await;
        cache.load().await;

        assert_eq!(cache.get::<i32>("kept").await, Some(1));
        assert_eq!(cache.get::<i32>("overwritten").await, Some(2));
        assert!(cache.get::<i32>("invalidated").await.is_none());

        let persisted = snapshot(&store);
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted["overwritten"]["value"], 2);
    }

    #[tokio::test]
    async fn test_clear_before_load_discards_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let seeded = ResponseCache::open(store.clone()).await;
        seeded.set("a", &1).await;
        drop(seeded);

        let cache = ResponseCache::new(store.clone(), DEFAULT_TTL, STORAGE_KEY);
        cache.clear().await;
        cache.load().await;

        assert!(cache.get::<i32>("a").await.is_none());
        assert!(snapshot(&store).is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_type_is_a_miss_but_stays_cached() {
        let (cache, _store) = create_test_cache().await;
        cache.set("plan:p1", &"just a string").await;

        assert!(cache.get::<TestData>("plan:p1").await.is_none());
        assert_eq!(
            cache.get::<String>("plan:p1").await.as_deref(),
            Some("just a string")
        );
    }

    #[tokio::test]
    async fn test_invalidate_matching_removes_selected_keys() {
        let (cache, store) = create_test_cache().await;
        cache.set("plans:{\"userId\":\"u1\"}", &1).await;
        cache.set("plans:{\"limit\":5,\"userId\":\"u1\"}", &2).await;
        cache.set("plans:{\"userId\":\"u2\"}", &3).await;

        let removed = cache
            .invalidate_matching(|key| key.starts_with("plans:") && key.contains("\"u1\""))
            .await;

        assert_eq!(removed, 2);
        assert_eq!(cache.get::<i32>("plans:{\"userId\":\"u2\"}").await, Some(3));
        assert_eq!(snapshot(&store).len(), 1);
    }

    #[tokio::test]
    async fn test_entries_lists_live_keys_sorted() {
        let (cache, _store) = create_test_cache().await;
        cache.set("b", &1).await;
        cache.set("a", &1).await;
        cache.set_with_ttl("c", &1, Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let keys: Vec<String> = cache.entries().await.into_iter().map(|e| e.key).collect();

        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_date_night_scenario() {
        let (cache, _store) = create_test_cache().await;

        cache
            .set_with_ttl(
                "plan:p1",
                &json!({"title": "Date Night"}),
                Duration::from_millis(300_000),
            )
            .await;
        assert_eq!(
            cache.get::<Value>("plan:p1").await,
            Some(json!({"title": "Date Night"}))
        );

        cache.invalidate("plan:p1").await;
        assert!(cache.get::<Value>("plan:p1").await.is_none());

        cache.set("plan:p1", &json!({"title": "Date Night v2"})).await;
        assert_eq!(
            cache.get::<Value>("plan:p1").await,
            Some(json!({"title": "Date Night v2"}))
        );
    }
}
