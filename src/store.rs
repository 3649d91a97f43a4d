//! The table store: named record tables mirrored to a single JSON file.

use crate::error::{Result, StoreError};
use crate::persist::{sibling_path, PersistMode, PersistStatus, Persister};
use crate::subscriptions::{
    StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
use crate::types::{MergePolicy, Record, SearchCriteria, StoreStats, Tables, ID_FIELD};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path of the backing JSON file.
    pub path: PathBuf,

    /// When snapshots reach the backing file.
    pub persist_mode: PersistMode,

    /// How `update` treats patch fields the stored record lacks.
    pub merge_policy: MergePolicy,

    /// Whether to create the backing file if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db.json"),
            persist_mode: PersistMode::default(),
            merge_policy: MergePolicy::default(),
            create_if_missing: true,
        }
    }
}

/// In-memory tables of JSON records, mirrored to disk on every mutation.
///
/// Reads run concurrently; insert, update and delete are serialized by a
/// single writer lock that also covers handing the resulting snapshot to
/// the [`Persister`], so snapshots are written in mutation order.
pub struct TableStore {
    /// Store configuration.
    config: StoreConfig,

    /// Table name to records.
    tables: RwLock<Tables>,

    /// Serializes mutations.
    write_lock: Mutex<()>,

    /// Write path to the backing file.
    persister: Persister,

    /// Live event subscribers.
    subscriptions: Arc<SubscriptionManager>,

    /// Lock file for exclusive access to the backing file. Dropped after
    /// the persister has joined its writer thread.
    _lock_file: File,
}

impl TableStore {
    /// Open the store, loading the backing file.
    ///
    /// A missing or unreadable file yields an empty database, which is
    /// written out before this returns.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if !config.path.exists() && !config.create_if_missing {
            return Err(StoreError::NotInitialized(config.path.display().to_string()));
        }

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let subscriptions = Arc::new(SubscriptionManager::new());
        let persister = Persister::new(
            &config.path,
            config.persist_mode,
            Arc::clone(&subscriptions),
        )?;

        let loaded = Self::load(&config.path);
        let needs_initial_write = loaded.is_none();

        let store = Self {
            config,
            tables: RwLock::new(loaded.unwrap_or_default()),
            write_lock: Mutex::new(()),
            persister,
            subscriptions,
            _lock_file: lock_file,
        };

        if needs_initial_write {
            let bytes = store.encode()?;
            store.persister.write_sync(bytes)?;
        }

        tracing::info!(
            path = %store.config.path.display(),
            tables = store.tables.read().len(),
            mode = ?store.config.persist_mode,
            "table store opened"
        );

        Ok(store)
    }

    /// Read and parse the backing file; `None` when there is nothing usable.
    fn load(path: &Path) -> Option<Tables> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no backing file, starting empty");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read backing file, starting empty");
                return None;
            }
        };

        match serde_json::from_slice::<Tables>(&bytes) {
            Ok(tables) => Some(tables),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "malformed backing file, starting empty"
                );
                None
            }
        }
    }

    // --- Record Operations ---

    /// Records of `table`, optionally filtered, in insertion order.
    ///
    /// An unknown table yields an empty result.
    pub fn select(&self, table: &str, criteria: Option<&SearchCriteria>) -> Vec<Record> {
        let tables = self.tables.read();
        let Some(records) = tables.get(table) else {
            return Vec::new();
        };

        match criteria {
            Some(criteria) => records
                .iter()
                .filter(|record| criteria.matches(record))
                .cloned()
                .collect(),
            None => records.clone(),
        }
    }

    /// Append `record` to `table`, creating the table if needed.
    ///
    /// The record must carry a string `id`; uniqueness is the caller's
    /// responsibility.
    pub fn insert(&self, table: &str, record: Record) -> Result<Record> {
        let id = record
            .id()
            .ok_or_else(|| {
                StoreError::InvalidRecord(format!("record has no string `{ID_FIELD}` field"))
            })?
            .to_string();

        let _lock = self.write_lock.lock();

        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(record.clone());

        self.persist();

        tracing::debug!(table, id = %id, "inserted record");
        self.subscriptions.publish(StoreEvent::Inserted {
            table: table.to_string(),
            id,
        });

        Ok(record)
    }

    /// Merge `patch` into the record with `id` and return the result.
    ///
    /// See [`Record::merge`] for the merge rule; `id` always stays the same.
    pub fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record> {
        self.update_with(table, id, |_| patch)
    }

    /// Like [`TableStore::update`], but the patch is built from the current
    /// record while the writer lock is held, so read-modify-write cycles
    /// from concurrent callers cannot interleave.
    ///
    /// `make_patch` must not call back into the store.
    pub fn update_with<F>(&self, table: &str, id: &str, make_patch: F) -> Result<Record>
    where
        F: FnOnce(&Record) -> Record,
    {
        let _lock = self.write_lock.lock();

        let updated = {
            let mut tables = self.tables.write();
            let record = tables
                .get_mut(table)
                .and_then(|records| records.iter_mut().find(|r| r.id() == Some(id)))
                .ok_or_else(|| StoreError::not_found(table, id))?;

            let patch = make_patch(record);
            let mut merged = record.merge(&patch, self.config.merge_policy);
            merged.insert(ID_FIELD, id);
            *record = merged.clone();
            merged
        };

        self.persist();

        tracing::debug!(table, id, "updated record");
        self.subscriptions.publish(StoreEvent::Updated {
            table: table.to_string(),
            id: id.to_string(),
        });

        Ok(updated)
    }

    /// Remove the record with `id`, keeping the order of the rest.
    pub fn delete(&self, table: &str, id: &str) -> Result<Record> {
        let _lock = self.write_lock.lock();

        let removed = {
            let mut tables = self.tables.write();
            let records = tables
                .get_mut(table)
                .ok_or_else(|| StoreError::not_found(table, id))?;
            let index = records
                .iter()
                .position(|r| r.id() == Some(id))
                .ok_or_else(|| StoreError::not_found(table, id))?;
            records.remove(index)
        };

        self.persist();

        tracing::debug!(table, id, "deleted record");
        self.subscriptions.publish(StoreEvent::Deleted {
            table: table.to_string(),
            id: id.to_string(),
        });

        Ok(removed)
    }

    /// The record with `id`.
    pub fn select_by_id(&self, table: &str, id: &str) -> Result<Record> {
        self.tables
            .read()
            .get(table)
            .and_then(|records| records.iter().find(|r| r.id() == Some(id)))
            .cloned()
            .ok_or_else(|| StoreError::not_found(table, id))
    }

    // --- Table Operations ---

    /// Names of all tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Number of records in `table` (0 for unknown tables).
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// A copy of the whole database.
    pub fn snapshot(&self) -> Tables {
        self.tables.read().clone()
    }

    // --- Subscriptions ---

    /// Subscribe to store events.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id)
    }

    // --- Store Operations ---

    /// Wait until every mutation so far is on disk.
    ///
    /// Fails when the latest snapshot write failed.
    pub fn flush(&self) -> Result<()> {
        self.persister.flush()
    }

    /// Progress and failures of the write path.
    pub fn persist_status(&self) -> PersistStatus {
        self.persister.status()
    }

    /// Get store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let (table_count, record_count) = {
            let tables = self.tables.read();
            (
                tables.len() as u64,
                tables.values().map(|records| records.len() as u64).sum(),
            )
        };

        let file_size_bytes = match fs::metadata(&self.config.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(StoreStats {
            table_count,
            record_count,
            file_size_bytes,
        })
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&*self.tables.read())?)
    }

    /// Hand the current database to the persister. Caller holds `write_lock`.
    fn persist(&self) {
        match self.encode() {
            Ok(bytes) => {
                self.persister.submit(bytes);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot");
            }
        }
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(sibling_path(path, ".lock"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for TableStore {
    fn drop(&mut self) {
        // Best-effort flush on drop
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.config.path.display(), error = %e, "flush on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("db.json"),
            persist_mode: PersistMode::Immediate,
            ..Default::default()
        }
    }

    fn task(id: &str, title: &str) -> Record {
        Record::new().with("id", id).with("title", title)
    }

    fn on_disk(store: &TableStore) -> serde_json::Value {
        serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        assert!(store.path().exists());
        assert_eq!(on_disk(&store), json!({}));
        assert!(store.tables().is_empty());
    }

    #[test]
    fn test_open_without_create() {
        let dir = TempDir::new().unwrap();
        let result = TableStore::open(StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        });

        assert!(matches!(result, Err(StoreError::NotInitialized(_))));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(StoreConfig {
            path: dir.path().join("data").join("db.json"),
            persist_mode: PersistMode::Immediate,
            ..Default::default()
        })
        .unwrap();

        assert!(store.path().exists());
    }

    #[test]
    fn test_insert_and_select() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        let inserted = store.insert("tasks", task("t1", "Buy milk")).unwrap();
        assert_eq!(inserted.id(), Some("t1"));

        assert_eq!(store.select("tasks", None), vec![task("t1", "Buy milk")]);
        assert!(store.select("other", None).is_empty());
        assert_eq!(on_disk(&store), json!({"tasks": [{"id": "t1", "title": "Buy milk"}]}));
    }

    #[test]
    fn test_insert_requires_string_id() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        let result = store.insert("tasks", Record::new().with("title", "no id"));
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert_eq!(store.len("tasks"), 0);
        assert_eq!(store.persist_status().requested, 1);
    }

    #[test]
    fn test_insert_allows_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        store.insert("tasks", task("t1", "first")).unwrap();
        store.insert("tasks", task("t1", "second")).unwrap();

        assert_eq!(store.len("tasks"), 2);
        assert_eq!(store.select_by_id("tasks", "t1").unwrap(), task("t1", "first"));
    }

    #[test]
    fn test_update_in_place() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        store.insert("tasks", task("a", "one")).unwrap();
        store.insert("tasks", task("b", "two")).unwrap();
        store.insert("tasks", task("c", "three")).unwrap();

        let updated = store
            .update("tasks", "b", Record::new().with("title", "TWO").with("id", "z"))
            .unwrap();
        assert_eq!(updated, task("b", "TWO"));

        let ids: Vec<_> = store
            .select("tasks", None)
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_update_add_new_fields_policy() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(StoreConfig {
            merge_policy: MergePolicy::AddNewFields,
            ..test_config(&dir)
        })
        .unwrap();

        store.insert("tasks", task("t1", "Buy milk")).unwrap();
        let updated = store
            .update("tasks", "t1", Record::new().with("completed_at", "2024-01-01T00:00:00Z"))
            .unwrap();

        assert_eq!(updated.get("completed_at"), Some(&json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_not_found_does_not_persist() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();
        store.insert("tasks", task("t1", "Buy milk")).unwrap();
        let before = store.persist_status().requested;

        assert!(store.update("tasks", "nope", Record::new()).unwrap_err().is_not_found());
        assert!(store.delete("tasks", "nope").unwrap_err().is_not_found());
        assert!(store.select_by_id("tasks", "nope").unwrap_err().is_not_found());
        assert!(store.update("ghosts", "t1", Record::new()).unwrap_err().is_not_found());
        assert!(store.delete("ghosts", "t1").unwrap_err().is_not_found());

        assert_eq!(store.persist_status().requested, before);
    }

    #[test]
    fn test_update_with_sees_latest_record() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TableStore::open(test_config(&dir)).unwrap());
        store
            .insert("counters", Record::new().with("id", "c").with("n", 0))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update_with("counters", "c", |current| {
                                let n = current.get("n").and_then(Value::as_u64).unwrap_or(0);
                                Record::new().with("n", n + 1)
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let counter = store.select_by_id("counters", "c").unwrap();
        assert_eq!(counter.get("n"), Some(&json!(100)));
        assert_eq!(on_disk(&store), json!({"counters": [{"id": "c", "n": 100}]}));
    }

    #[test]
    fn test_update_with_missing_record() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        let result = store.update_with("tasks", "nope", |_| panic!("no record to patch"));
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_lock_held_until_background_writes_finish() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            persist_mode: PersistMode::Background,
            ..test_config(&dir)
        };

        {
            let store = TableStore::open(config.clone()).unwrap();
            for i in 0..20 {
                store.insert("tasks", task(&i.to_string(), "queued")).unwrap();
            }
        }

        let reopened = TableStore::open(config).unwrap();
        assert_eq!(reopened.len("tasks"), 20);
    }

    #[test]
    fn test_delete_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        for id in ["a", "b", "c", "d"] {
            store.insert("tasks", task(id, id)).unwrap();
        }

        let removed = store.delete("tasks", "b").unwrap();
        assert_eq!(removed.id(), Some("b"));

        let ids: Vec<_> = store
            .select("tasks", None)
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert!(store.select_by_id("tasks", "b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_select_with_criteria() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        store.insert("tasks", task("1", "Abcde")).unwrap();
        store.insert("tasks", task("2", "xyz")).unwrap();

        let criteria = SearchCriteria::any().field("title", "bc");
        assert_eq!(store.select("tasks", Some(&criteria)), vec![task("1", "Abcde")]);
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let _store1 = TableStore::open(config.clone()).unwrap();

        // Second store should fail to acquire lock
        let result = TableStore::open(config);
        assert!(matches!(result, Err(StoreError::Locked)));
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(test_config(&dir)).unwrap();

        store.insert("tasks", task("1", "a")).unwrap();
        store.insert("tasks", task("2", "b")).unwrap();
        store.insert("users", task("u", "c")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.table_count, 2);
        assert_eq!(stats.record_count, 3);
        assert!(stats.file_size_bytes > 0);
    }
}
