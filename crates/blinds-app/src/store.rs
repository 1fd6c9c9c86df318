//! Durable key → string storage
//!
//! [`KeyValueStore`] is the only contract the session relies on. Two adapters
//! ship with the crate:
//! - [`MemoryStore`] - process-local, used by tests and ephemeral hosts
//! - [`FileStore`] - a TOML table of strings on disk

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::RwLock;

use blinds_core::prelude::*;

/// Asynchronous get/set over string values
#[trait_variant::make(KeyValueStore: Send)]
pub trait LocalKeyValueStore {
    /// Read a value; `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────

/// Store backed by a shared map. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// File store
// ─────────────────────────────────────────────────────────

/// Store backed by a TOML file of `key = "value"` pairs.
///
/// Each `set` is a read-modify-write under an exclusive `fs2` lock on a
/// sibling `.lock` file; the new content is written to a temp file and
/// renamed over the old one.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (without reading) the store at `path`, creating its directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::persistence(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        debug!("Opened file store at {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path.clone();
        let key = key.to_string();

        run_blocking(move || {
            let _lock = acquire_lock(&path, false)?;
            let mut table = read_table(&path)?;
            Ok(table.remove(&key))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path.clone();
        let key = key.to_string();
        let value = value.to_string();

        run_blocking(move || {
            let _lock = acquire_lock(&path, true)?;
            let mut table = read_table(&path)?;
            table.insert(key, value);
            write_table(&path, &table)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::persistence(format!("Store task failed: {}", e)))?
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Lock is released when the returned file is dropped
fn acquire_lock(path: &Path, exclusive: bool) -> Result<File> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::persistence(format!("Failed to open {:?}: {}", lock_path, e)))?;

    let locked = if exclusive {
        file.lock_exclusive()
    } else {
        file.lock_shared()
    };
    locked.map_err(|e| Error::persistence(format!("Failed to lock {:?}: {}", lock_path, e)))?;

    Ok(file)
}

fn read_table(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::persistence(format!("Failed to read {:?}: {}", path, e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::persistence(format!("Failed to parse {:?}: {}", path, e)))
}

fn write_table(path: &Path, table: &BTreeMap<String, String>) -> Result<()> {
    let content = toml::to_string(table)
        .map_err(|e| Error::persistence(format!("Failed to serialize store: {}", e)))?;

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, content)
        .map_err(|e| Error::persistence(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| Error::persistence(format!("Failed to rename temp file: {}", e)))?;

    trace!("Wrote {} keys to {:?}", table.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    // Only the Send variant, so method calls are not ambiguous
    use super::{lock_path, FileStore, KeyValueStore, MemoryStore};
    use blinds_core::Error;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("address").await.unwrap(), None);

        tokio_test::assert_ok!(store.set("address", "10.0.0.7").await);
        tokio_test::assert_ok!(store.set("address", "10.0.0.8").await);

        assert_eq!(store.get("address").await.unwrap().as_deref(), Some("10.0.0.8"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_data() {
        let store = MemoryStore::with_entries([("a", "1")]);
        let other = store.clone();

        other.set("b", "2").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_reads_none() {
        let temp = tempdir().unwrap();
        let store = FileStore::open(temp.path().join("store.toml")).unwrap();

        assert_eq!(store.get("connection_intent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state").join("store.toml");
        let json = r#"{"desiredAddress":"10.0.0.9","shouldStayConnected":true}"#;

        {
            let store = FileStore::open(&path).unwrap();
            store.set("connection_intent", json).await.unwrap();
            store.set("other", "value").await.unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("connection_intent").await.unwrap().as_deref(),
            Some(json)
        );
        assert_eq!(reopened.get("other").await.unwrap().as_deref(), Some("value"));
        assert!(!temp.path().join("state").join("store.toml.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_persistence_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store.toml");
        std::fs::write(&path, "not valid toml {{{{").unwrap();

        let store = FileStore::open(&path).unwrap();
        let err = tokio_test::assert_err!(store.get("connection_intent").await);
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn test_lock_path_is_sibling() {
        assert_eq!(
            lock_path(Path::new("/tmp/x/store.toml")),
            PathBuf::from("/tmp/x/store.toml.lock")
        );
    }
}
