//! Persistence backends for the local event cache.
//!
//! A backend is a flat key → JSON document store. `FileBackend` keeps one
//! `<key>.json` file per key under the cache directory; `MemoryBackend` keeps
//! everything in process memory. Both accept an optional byte quota, and a
//! write that would exceed it fails with `StorageError::QuotaExceeded`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored document '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode document '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

pub trait StorageBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&self, key: &str, contents: &str) -> Result<(), StorageError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub fn load_json<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match backend.load(key)? {
        Some(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let contents = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    backend.save(key, &contents)
}

fn check_quota(quota: Option<u64>, needed: u64) -> Result<(), StorageError> {
    match quota {
        Some(quota) if needed > quota => Err(StorageError::QuotaExceeded { needed, quota }),
        _ => Ok(()),
    }
}

pub struct FileBackend {
    cache_dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Bytes used by every document except `key`.
    fn used_bytes_excluding(&self, key: &str) -> Result<u64, StorageError> {
        let skip = self.cache_path(key);
        let mut total = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path == skip || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            total += std::fs::metadata(&path)?.len();
        }
        Ok(total)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn save(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        if self.quota_bytes.is_some() {
            let needed = self.used_bytes_excluding(key)? + contents.len() as u64;
            check_quota(self.quota_bytes, needed)?;
        }
        // Write beside the document and rename over it, so a failed write
        // leaves the previous version intact
        let path = self.cache_path(key);
        let tmp = self.cache_dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        debug!(key, bytes = contents.len(), "Saved cache document");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.cache_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents
            .lock()
            .map(|docs| docs.contains_key(key))
            .unwrap_or(false)
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let docs = self.documents.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(docs.get(key).cloned())
    }

    fn save(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        let mut docs = self.documents.lock().map_err(|_| StorageError::Poisoned)?;
        let others: u64 = docs
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len() as u64)
            .sum();
        check_quota(self.quota_bytes, others + contents.len() as u64)?;
        docs.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut docs = self.documents.lock().map_err(|_| StorageError::Poisoned)?;
        docs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_roundtrip_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("cache")).expect("backend");

        assert!(backend.load("missing").unwrap().is_none());
        save_json(&backend, "numbers", &vec![1, 2, 3]).unwrap();
        let loaded: Option<Vec<i32>> = load_json(&backend, "numbers").unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        backend.remove("numbers").unwrap();
        backend.remove("numbers").unwrap();
        assert!(backend.load("numbers").unwrap().is_none());
    }

    #[test]
    fn test_file_backend_quota_counts_other_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().to_path_buf())
            .expect("backend")
            .with_quota(Some(10));

        backend.save("a", "123456").unwrap();
        // Overwriting the same key only counts the new contents
        backend.save("a", "1234567890").unwrap();
        let err = backend.save("b", "1").unwrap_err();
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_failed_file_save_keeps_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().to_path_buf()).expect("backend");
        backend.save("events", "[1,2,3]").unwrap();
        assert!(!dir.path().join("events.json.tmp").exists());

        // A directory in the way makes the staging write fail
        std::fs::create_dir(dir.path().join("events.json.tmp")).unwrap();
        assert!(backend.save("events", "[4]").is_err());
        assert_eq!(backend.load("events").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_memory_backend_quota() {
        let backend = MemoryBackend::with_quota(4);
        backend.save("k", "1234").unwrap();
        assert!(backend.save("k", "12345").unwrap_err().is_quota_exceeded());
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn test_corrupt_document_reports_key() {
        let backend = MemoryBackend::new();
        backend.save("broken", "{not json").unwrap();
        let err = load_json::<Vec<i32>>(&backend, "broken").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
