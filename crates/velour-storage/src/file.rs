//! Durable JSON-file storage backend.

use crate::{SecureStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores every key in one JSON object on disk.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous contents intact. The whole file is
/// re-read on every access, which keeps concurrent CLI processes consistent.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or lazily create) storage at `path`.
    pub fn new(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::Encoding(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let json =
            serde_json::to_vec_pretty(map).map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> StorageResult<T> {
        let _guard = self.write_lock.lock();
        let mut map = self.read_map()?;
        let out = f(&mut map);
        self.write_map(&map)?;
        Ok(out)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(path = %self.path.display(), key = %key, "Setting credential");
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(path = %self.path.display(), key = %key, "Deleting credential");
        let _guard = self.write_lock.lock();
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_map(&map)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let storage = FileStorage::new(&path).unwrap();
        assert_eq!(storage.get("a").unwrap(), None);
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();

        let reopened = FileStorage::new(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert!(reopened.has("b").unwrap());

        assert!(reopened.delete("a").unwrap());
        assert!(!reopened.delete("a").unwrap());
        assert_eq!(storage.get("a").unwrap(), None);
        assert_eq!(storage.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_file_storage_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let storage = FileStorage::new(&path).unwrap();

        storage.set("k", "v").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["credentials.json".to_string()]);
    }

    #[test]
    fn test_file_storage_corrupt_file_is_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::new(&path).unwrap();
        assert!(matches!(storage.get("k"), Err(StorageError::Encoding(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let storage = FileStorage::new(&path).unwrap();
        storage.set("k", "v").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
