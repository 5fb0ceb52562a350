//! Local key/value persistence for the cart and wishlist blobs.
//!
//! Each key holds one JSON document that is read and written wholesale.
//! Writers race with last-writer-wins semantics; there is no locking
//! across processes.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Whole-blob key/value store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the blob under `key`, `None` when absent.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob under `key`.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the blob under `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load and decode a JSON blob.
///
/// # Errors
///
/// Returns error if the read fails or the blob is not valid JSON for `T`.
pub async fn load_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.load(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON blob.
///
/// # Errors
///
/// Returns error if encoding or the write fails.
pub async fn save_json<T: Serialize + Sync>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    storage.save(key, &raw).await
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// One `{key}.json` file per key inside a directory.
///
/// Writes go to a uniquely named temporary file that is renamed over the
/// target, so a reader never sees a half-written blob.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl Storage for FileStorage {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, value), fields(dir = %self.dir.display(), bytes = value.len()))]
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Each write gets its own temp file, so concurrent writers never
        // rename each other's half-written blob.
        let dir = self.dir.clone();
        let target = path.clone();
        let blob = value.to_owned();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".basket-")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            tmp.write_all(blob.as_bytes())?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!(path = %path.display(), "Blob written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// Shared in-memory map. Clones see the same data, which models two tabs
/// writing to one browser profile.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a blob directly, bypassing any manager.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_raw(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert_raw(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basket_core::Cart;

    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("basket_cart").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a b").is_err());
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        assert_eq!(storage.load("basket_cart").await.unwrap(), None);

        storage.save("basket_cart", r#"{"items":[]}"#).await.unwrap();
        assert_eq!(
            storage.load("basket_cart").await.unwrap().as_deref(),
            Some(r#"{"items":[]}"#)
        );
        assert!(dir.path().join("nested/basket_cart.json").exists());
        let leftovers = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        storage.remove("basket_cart").await.unwrap();
        storage.remove("basket_cart").await.unwrap();
        assert_eq!(storage.load("basket_cart").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileStorage::new(dir.path());
        let b = FileStorage::new(dir.path());

        let writes = (0..16).map(|n| {
            let storage = if n % 2 == 0 { a.clone() } else { b.clone() };
            tokio::spawn(async move { storage.save("basket_cart", &format!("{{\"n\":{n}}}")).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        let raw = a.load("basket_cart").await.unwrap().unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let err = storage.save("../escape", "{}").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_memory_storage_clones_share_data() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.save("k", "v").await.unwrap();
        assert_eq!(b.load("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let storage = MemoryStorage::new();
        save_json(&storage, "basket_cart", &Cart::default()).await.unwrap();
        let cart: Option<Cart> = load_json(&storage, "basket_cart").await.unwrap();
        assert_eq!(cart, Some(Cart::default()));

        storage.insert_raw("basket_cart", "{not json");
        let err = load_json::<Cart>(&storage, "basket_cart").await.unwrap_err();
        assert!(matches!(err, StorageError::Serde(_)));
    }
}
