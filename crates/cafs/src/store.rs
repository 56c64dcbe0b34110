//! Storage capability traits consumed by the engine.
//!
//! The engine talks to two narrow seams: a [`BlobStore`] that holds opaque
//! bytes keyed by string path, and a [`MetadataStore`] that holds structured
//! [`CasEntry`] documents keyed by string key. This allows alternative
//! implementations (in-memory for testing, a real object store, a
//! transactional key-value store for metadata).
//!
//! Adapter methods return `anyhow::Result`; the engine wraps every failure
//! into [`crate::CasError::StorageAdapter`] before it reaches a caller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::entry::CasEntry;

/// Blob I/O capability: put/get/exists/delete/list of opaque byte blobs
/// addressed by string path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check whether a blob exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Write `bytes` at `path` with a content type and optional custom
    /// metadata. Overwrites are last-write-wins.
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()>;

    /// Read the blob at `path`. Returns `Ok(None)` if absent.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Delete the blob at `path`. Deleting an absent blob is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List all blob paths starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Metadata I/O capability: structured entry documents addressed by string
/// key.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the entry at `key`. Returns `Ok(None)` if absent.
    async fn get(&self, key: &str) -> Result<Option<CasEntry>>;

    /// Persist `entry` at `key`, replacing any previous document.
    async fn put(&self, key: &str, entry: &CasEntry) -> Result<()>;

    /// Delete the entry at `key`. Deleting an absent entry is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Default metadata backend: entries stored as JSON documents in a blob
/// store, at keys of the form `<folder>/metadata/<digest>.json`.
///
/// This collapses the metadata store onto the blob store, which keeps the
/// deployment footprint to a single service. A key-value store with atomic
/// updates is a better backend when one is available; this type exists so
/// the engine works without one.
#[derive(Debug, Clone)]
pub struct BlobMetadataStore<B> {
    blobs: Arc<B>,
}

impl<B: BlobStore> BlobMetadataStore<B> {
    /// Wrap a blob store, typically the same one the engine writes payloads
    /// through.
    pub fn new(blobs: Arc<B>) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl<B: BlobStore> MetadataStore for BlobMetadataStore<B> {
    async fn get(&self, key: &str) -> Result<Option<CasEntry>> {
        let bytes = match self.blobs.get(key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let entry = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse entry document at {key}"))?;
        Ok(Some(entry))
    }

    async fn put(&self, key: &str, entry: &CasEntry) -> Result<()> {
        let json = serde_json::to_vec(entry).context("failed to serialize entry document")?;
        self.blobs
            .put(key, &json, "application/json", &HashMap::new())
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::memory::MemoryBlobStore;

    fn sample_entry() -> CasEntry {
        let hash = ContentHash::from_data(b"doc");
        CasEntry::new(hash.clone(), format!("cafs/{hash}"), 3, "text/plain", "r1")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() -> Result<()> {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = BlobMetadataStore::new(blobs.clone());

        let entry = sample_entry();
        let key = format!("cafs/metadata/{}.json", entry.content_hash);
        store.put(&key, &entry).await?;

        let restored = store.get(&key).await?.expect("entry should exist");
        assert_eq!(restored, entry);

        // The document lives in the blob store as JSON.
        let raw = blobs.get(&key).await?.expect("blob should exist");
        let json: serde_json::Value = serde_json::from_slice(&raw)?;
        assert_eq!(
            json.get("contentHash").and_then(|v| v.as_str()),
            Some(entry.content_hash.as_str())
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_get_absent_is_none() -> Result<()> {
        let store = BlobMetadataStore::new(Arc::new(MemoryBlobStore::new()));
        assert!(store.get("cafs/metadata/missing.json").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() -> Result<()> {
        let store = BlobMetadataStore::new(Arc::new(MemoryBlobStore::new()));
        let entry = sample_entry();
        let key = format!("cafs/metadata/{}.json", entry.content_hash);

        store.put(&key, &entry).await?;
        store.delete(&key).await?;
        assert!(store.get(&key).await?.is_none());

        // A second delete of the same key is fine.
        store.delete(&key).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() -> Result<()> {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = BlobMetadataStore::new(blobs.clone());

        blobs
            .put("cafs/metadata/bad.json", b"not json", "application/json", &HashMap::new())
            .await?;

        assert!(store.get("cafs/metadata/bad.json").await.is_err());
        Ok(())
    }
}
