//! In-memory blob store.
//!
//! Used by tests and as the reference [`BlobStore`] implementation. Supports
//! failure injection on exists/put/get so the degraded paths (existence
//! probes treated as false, store failure results) can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::BlobStore;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
    metadata: HashMap<String, String>,
}

/// A concurrent in-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, StoredBlob>,
    fail_exists: AtomicBool,
    fail_put: AtomicBool,
    fail_get: AtomicBool,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if no blobs are held.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// True if a blob is present at `path` (direct map probe, no injected
    /// failures).
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    /// Content type recorded for the blob at `path`.
    pub fn content_type_of(&self, path: &str) -> Option<String> {
        self.blobs.get(path).map(|b| b.content_type.clone())
    }

    /// Custom metadata value recorded for the blob at `path`.
    pub fn metadata_of(&self, path: &str, key: &str) -> Option<String> {
        self.blobs
            .get(path)
            .and_then(|b| b.metadata.get(key).cloned())
    }

    /// Make subsequent `exists` calls fail.
    pub fn fail_exists(&self, fail: bool) {
        self.fail_exists.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `put` calls fail.
    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `get` calls fail.
    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Overwrite the bytes at `path` in place, leaving the recorded content
    /// type alone. Test hook for simulating corruption.
    pub fn corrupt(&self, path: &str, bytes: &[u8]) {
        if let Some(mut blob) = self.blobs.get_mut(path) {
            blob.bytes = bytes.to_vec();
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            bail!("injected exists failure");
        }
        Ok(self.blobs.contains_key(path))
    }

    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            bail!("injected put failure");
        }
        self.blobs.insert(
            path.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_get.load(Ordering::SeqCst) {
            bail!("injected get failure");
        }
        Ok(self.blobs.get(path).map(|b| b.bytes.clone()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .blobs
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_exists() -> Result<()> {
        let store = MemoryBlobStore::new();
        store
            .put("cafs/abc", b"hello", "text/plain", &HashMap::new())
            .await?;

        assert!(store.exists("cafs/abc").await?);
        assert_eq!(store.get("cafs/abc").await?, Some(b"hello".to_vec()));
        assert_eq!(store.content_type_of("cafs/abc"), Some("text/plain".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_absent_is_none() -> Result<()> {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("cafs/missing").await?, None);
        assert!(!store.exists("cafs/missing").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.delete("cafs/missing").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() -> Result<()> {
        let store = MemoryBlobStore::new();
        let empty = HashMap::new();
        store.put("cafs/a", b"1", "text/plain", &empty).await?;
        store.put("cafs/b", b"2", "text/plain", &empty).await?;
        store.put("other/c", b"3", "text/plain", &empty).await?;

        let paths = store.list("cafs/").await?;
        assert_eq!(paths, vec!["cafs/a".to_string(), "cafs/b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_injection() -> Result<()> {
        let store = MemoryBlobStore::new();
        store
            .put("cafs/a", b"1", "text/plain", &HashMap::new())
            .await?;

        store.fail_exists(true);
        assert!(store.exists("cafs/a").await.is_err());
        store.fail_exists(false);
        assert!(store.exists("cafs/a").await?);

        store.fail_put(true);
        assert!(store
            .put("cafs/b", b"2", "text/plain", &HashMap::new())
            .await
            .is_err());

        store.fail_get(true);
        assert!(store.get("cafs/a").await.is_err());
        Ok(())
    }
}
