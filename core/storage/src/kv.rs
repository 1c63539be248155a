//! Host key-value surface.
//!
//! A small, synchronous string map standing in for browser-local storage.
//! The fallback cache, the registry pointer and per-user pointer hints all
//! live here.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::debug;

use sealvault_common::{Error, Result};

/// String key-value store.
///
/// Implementations must make each call atomic with respect to the others;
/// callers may hold their own locks across calls since none of these block
/// on async I/O.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local key-value store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Key-value store persisted as a single JSON document.
///
/// Every mutation rewrites the file atomically (temp file + rename) while
/// holding the map lock, so writes land in the order they were made.
pub struct FileKv {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKv {
    /// Open (or create on first write) the store at `path`.
    ///
    /// # Errors
    /// - Existing file is not a JSON string map
    /// - Parent directory cannot be created
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    Error::Serialization(format!(
                        "Corrupt key-value file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened key-value store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &json)?;
        std::fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = entries.remove(key) {
            if let Err(err) = self.persist(&entries) {
                entries.insert(key.to_string(), old);
                return Err(err);
            }
        }
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_kv_basic() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.set("a", "1").unwrap();
        kv.set("b", "2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("1"));

        kv.remove("a").unwrap();
        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
    }

    #[test]
    fn test_keys_by_prefix() {
        let kv = MemoryKv::new();
        kv.set("hint:u2", "x").unwrap();
        kv.set("hint:u1", "x").unwrap();
        kv.set("other", "x").unwrap();

        assert_eq!(kv.keys("hint:").unwrap(), vec!["hint:u1", "hint:u2"]);
    }

    #[test]
    fn test_file_kv_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("kv.json");

        {
            let kv = FileKv::open(&path).unwrap();
            kv.set("registry:pointer", "{\"id\":\"x\"}").unwrap();
            kv.set("gone", "1").unwrap();
            kv.remove("gone").unwrap();
        }

        let kv = FileKv::open(&path).unwrap();
        assert_eq!(
            kv.get("registry:pointer").unwrap().as_deref(),
            Some("{\"id\":\"x\"}")
        );
        assert_eq!(kv.get("gone").unwrap(), None);
    }

    #[test]
    fn test_file_kv_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kv.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(FileKv::open(&path), Err(Error::Serialization(_))));
    }
}
