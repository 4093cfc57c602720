//! Reference image persistence.
//!
//! `ReferenceStore` is the raw key/value collaborator; `ReferenceStoreClient`
//! layers the record format and surface encoding on top of it and classifies
//! read failures.

use crate::surface::Surface;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key/value persistence keyed by page identity.
///
/// `save` must be all-or-nothing from the caller's point of view.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Load the raw record for `key`, `None` when nothing is stored
    async fn load(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous record
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Persisted record format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    pub reference_image_uri: String,
}

/// Outcome of reading a reference
#[derive(Debug)]
pub enum Lookup {
    Found(Surface),
    Absent,
    /// A record exists but cannot be used
    Unreadable(Error),
}

/// Typed access to the reference store
#[derive(Clone)]
pub struct ReferenceStoreClient {
    store: Arc<dyn ReferenceStore>,
}

impl std::fmt::Debug for ReferenceStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceStoreClient").finish_non_exhaustive()
    }
}

impl ReferenceStoreClient {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self { store }
    }

    /// Read and decode the reference for `page`
    pub async fn get(&self, page: &str) -> Lookup {
        let raw = match self.store.load(page).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Lookup::Absent,
            Err(e) => return Lookup::Unreadable(e),
        };
        let record: ReferenceRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => return Lookup::Unreadable(e.into()),
        };
        match Surface::decode(&record.reference_image_uri) {
            Ok(surface) => Lookup::Found(surface),
            Err(e) => Lookup::Unreadable(e),
        }
    }

    /// Store `surface` as the reference for `page`.
    ///
    /// The surface is encoded before the store is touched, so an encode
    /// failure leaves any existing reference in place.
    pub async fn put(&self, page: &str, surface: &Surface) -> Result<()> {
        let record = ReferenceRecord {
            reference_image_uri: surface.encode()?,
        };
        let raw = serde_json::to_string(&record).map_err(|e| Error::Encode(e.to_string()))?;
        self.store.save(page, &raw).await?;
        log::debug!("Stored reference for {} ({}x{})", page, surface.width(), surface.height());
        Ok(())
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: one JSON record per page, named by the SHA-256
/// of the page identity
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl ReferenceStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!("Failed to read reference for {}: {}", key, e))),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Store(format!("Failed to create {}: {}", self.dir.display(), e)))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| Error::Store(format!("Failed to write reference for {}: {}", key, e)))?;
        // rename is atomic on the same filesystem
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Store(format!("Failed to commit reference for {}: {}", key, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (Arc<MemoryStore>, ReferenceStoreClient) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ReferenceStoreClient::new(store))
    }

    #[tokio::test]
    async fn test_absent_key_is_reported_as_absent() {
        let (_, client) = client();
        assert!(matches!(client.get("http://example.test/").await, Lookup::Absent));
    }

    #[tokio::test]
    async fn test_put_then_get_returns_same_surface() {
        let (_, client) = client();
        let surface = Surface::filled(7, 3, [1, 2, 3, 255]);
        client.put("page.html", &surface).await.unwrap();
        match client.get("page.html").await {
            Lookup::Found(s) => assert_eq!(s, surface),
            other => panic!("unexpected lookup: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_uses_reference_image_uri_field() {
        let (store, client) = client();
        client.put("p", &Surface::new(1, 1)).await.unwrap();
        let raw = store.load("p").await.unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(v["referenceImageUri"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_unreadable() {
        let (store, client) = client();
        store.save("bad-json", "{not json").await.unwrap();
        store
            .save("bad-image", r#"{"referenceImageUri":"data:image/png;base64,AAAA"}"#)
            .await
            .unwrap();
        assert!(matches!(client.get("bad-json").await, Lookup::Unreadable(_)));
        assert!(matches!(
            client.get("bad-image").await,
            Lookup::Unreadable(Error::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_encode_writes_nothing() {
        let (store, client) = client();
        let mut surface = Surface::filled(2, 2, [0, 0, 0, 255]);
        surface.taint();
        assert!(matches!(client.put("p", &surface).await, Err(Error::Encode(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("refs"));
        assert_eq!(store.load("a").await.unwrap(), None);
        store.save("a", "first").await.unwrap();
        store.save("a", "second").await.unwrap();
        assert_eq!(store.load("a").await.unwrap().as_deref(), Some("second"));
        assert!(store.path_for("a").exists());
        assert_ne!(store.path_for("a"), store.path_for("b"));
    }
}
