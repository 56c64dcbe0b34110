//! The CAS engine: hashing, deduplication, reference counting, entry
//! lifecycle.
//!
//! The engine orchestrates two externally-provided capabilities: a
//! [`BlobStore`] holding payload bytes at `<folder>/<digest>` and a
//! [`MetadataStore`] holding one [`CasEntry`] document per digest. It holds
//! no locks on either store; within one process, a per-digest mutex
//! serializes the exists/increment/write sequence so concurrent stores of
//! identical content converge to a single entry with a correctly summed
//! reference count.
//!
//! Consistency across the two stores is best-effort: there is no transaction
//! spanning both. On store, the blob is written first and the entry last, so
//! a failed entry write leaves an orphaned blob that a later store of the
//! same bytes heals. On delete, the blob is removed first, so a crash leaves
//! an entry pointing at a missing blob rather than an unaccounted payload.
//! No reconciliation pass exists for orphans; that is an accepted
//! operational risk.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CasConfig;
use crate::entry::CasEntry;
use crate::error::{CasError, CasResult};
use crate::hash::ContentHash;
use crate::store::{BlobMetadataStore, BlobStore, MetadataStore};

/// Outcome of a [`CasEngine::store_content`] call.
///
/// Stores report expected failures (size limit, adapter errors) through this
/// struct instead of an `Err`, so batch callers can keep processing siblings.
/// Serializes to the camelCase shape used across service boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    /// Whether the content is now stored (or was already stored).
    pub success: bool,

    /// Digest of the stored content; empty on failure.
    pub content_hash: String,

    /// True when the write collapsed into a reference-count bump.
    pub deduplicated: bool,

    /// Blob store key of the payload; empty on failure.
    pub storage_path: String,

    /// Human-readable description of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreResult {
    fn stored(hash: &ContentHash, path: &str) -> Self {
        Self {
            success: true,
            content_hash: hash.to_string(),
            deduplicated: false,
            storage_path: path.to_string(),
            error: None,
        }
    }

    fn deduplicated(hash: &ContentHash, path: &str) -> Self {
        Self {
            success: true,
            content_hash: hash.to_string(),
            deduplicated: true,
            storage_path: path.to_string(),
            error: None,
        }
    }

    fn failed(error: CasError) -> Self {
        Self {
            success: false,
            content_hash: String::new(),
            deduplicated: false,
            storage_path: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Content-addressable storage engine over a blob store and a metadata
/// store.
///
/// Explicitly constructed and passed to callers; there is no process-wide
/// default instance.
#[derive(Debug)]
pub struct CasEngine<B, M> {
    blobs: Arc<B>,
    metadata: Arc<M>,
    config: CasConfig,
    // One slot per digest touched by this process; guards the
    // check-then-act sequences in store and delete.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<B: BlobStore> CasEngine<B, BlobMetadataStore<B>> {
    /// Engine with entry documents stored as JSON in the same blob store,
    /// at `<folder>/metadata/<digest>.json`.
    pub fn with_blob_metadata(blobs: Arc<B>, config: CasConfig) -> CasResult<Self> {
        let metadata = Arc::new(BlobMetadataStore::new(blobs.clone()));
        Self::new(blobs, metadata, config)
    }
}

impl<B: BlobStore, M: MetadataStore> CasEngine<B, M> {
    /// Create an engine over the given adapters. Validates the config once.
    pub fn new(blobs: Arc<B>, metadata: Arc<M>, config: CasConfig) -> CasResult<Self> {
        config.validate()?;
        Ok(Self {
            blobs,
            metadata,
            config,
            locks: DashMap::new(),
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    /// Blob store key for a payload.
    pub fn storage_path(folder: &str, digest: &ContentHash) -> String {
        format!("{folder}/{digest}")
    }

    /// Metadata store key for an entry document.
    pub fn entry_key(folder: &str, digest: &ContentHash) -> String {
        format!("{folder}/metadata/{digest}.json")
    }

    fn digest_lock(&self, storage_path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(storage_path.to_string())
            .or_default()
            .clone()
    }

    /// Store content under `folder`, keyed by the SHA-256 digest of its
    /// bytes, using the configured default content type.
    ///
    /// `identity` is a caller-assigned resource identifier recorded for
    /// audit linkage; it plays no part in addressing. Pass an empty string
    /// to record nothing.
    pub async fn store_content(&self, folder: &str, content: &[u8], identity: &str) -> StoreResult {
        let content_type = self.config.default_content_type.clone();
        self.store_content_with_type(folder, content, identity, &content_type)
            .await
    }

    /// Store content with an explicit content type.
    ///
    /// Expected failures (size limit, adapter errors) come back as a
    /// `StoreResult` with `success == false`; this method does not return
    /// `Err`.
    pub async fn store_content_with_type(
        &self,
        folder: &str,
        content: &[u8],
        identity: &str,
        content_type: &str,
    ) -> StoreResult {
        let size = content.len() as u64;
        if size > self.config.max_file_size {
            return StoreResult::failed(CasError::SizeLimitExceeded {
                size,
                max: self.config.max_file_size,
            });
        }

        let hash = ContentHash::from_data(content);
        let path = Self::storage_path(folder, &hash);
        let key = Self::entry_key(folder, &hash);

        let lock = self.digest_lock(&path);
        let _guard = lock.lock().await;

        if self.config.dedup_enabled {
            let exists = match self.blobs.exists(&path).await {
                Ok(exists) => exists,
                Err(e) => return StoreResult::failed(CasError::adapter(&path, e)),
            };

            if exists {
                match self.metadata.get(&key).await {
                    Ok(Some(mut entry)) => {
                        entry.add_reference(identity);
                        if let Err(e) = self.metadata.put(&key, &entry).await {
                            return StoreResult::failed(CasError::adapter(&key, e));
                        }
                        debug!(%hash, references = entry.metadata.reference_count, "dedup hit");
                        return StoreResult::deduplicated(&hash, &path);
                    }
                    Ok(None) => {
                        // Orphaned blob: bytes present, entry missing. The
                        // payload needs no rewrite; recreate the entry.
                        let entry = CasEntry::new(hash.clone(), &path, size, content_type, identity);
                        if let Err(e) = self.metadata.put(&key, &entry).await {
                            return StoreResult::failed(CasError::adapter(&key, e));
                        }
                        warn!(%hash, "recreated entry for orphaned blob");
                        return StoreResult::deduplicated(&hash, &path);
                    }
                    Err(e) => return StoreResult::failed(CasError::adapter(&key, e)),
                }
            }
        }

        let mut blob_metadata = HashMap::new();
        blob_metadata.insert("contentHash".to_string(), hash.to_string());
        blob_metadata.insert("createdAt".to_string(), Utc::now().to_rfc3339());

        if let Err(e) = self
            .blobs
            .put(&path, content, content_type, &blob_metadata)
            .await
        {
            return StoreResult::failed(CasError::adapter(&path, e));
        }

        // Entry write is last. If it fails the blob stays behind orphaned;
        // the failure is surfaced and a later store of the same bytes
        // recreates the entry.
        let entry = CasEntry::new(hash.clone(), &path, size, content_type, identity);
        if let Err(e) = self.metadata.put(&key, &entry).await {
            return StoreResult::failed(CasError::adapter(&key, e));
        }

        debug!(%hash, size, folder, "stored new content");
        StoreResult::stored(&hash, &path)
    }

    /// Retrieve the payload for `digest` under `folder`.
    ///
    /// The digest of the retrieved bytes is always recomputed and compared;
    /// a mismatch is [`CasError::ContentIntegrity`], distinct from
    /// [`CasError::NotFound`]. When `update_access_time` is set, the entry's
    /// last-accessed instant is bumped best-effort; a failure there never
    /// fails the read.
    pub async fn retrieve_content(
        &self,
        folder: &str,
        digest: &ContentHash,
        update_access_time: bool,
    ) -> CasResult<Vec<u8>> {
        let path = Self::storage_path(folder, digest);
        let bytes = self
            .blobs
            .get(&path)
            .await
            .map_err(|e| CasError::adapter(&path, e))?
            .ok_or_else(|| CasError::not_found(&path))?;

        let actual = ContentHash::from_data(&bytes);
        if actual != *digest {
            return Err(CasError::ContentIntegrity {
                path,
                expected: digest.clone(),
                actual,
            });
        }

        if update_access_time {
            if let Err(e) = self.touch_entry(folder, digest).await {
                warn!(%digest, error = %e, "failed to update access time");
            }
        }

        Ok(bytes)
    }

    /// Existence probe on the derived storage path only; does not consult
    /// the metadata store and never errors. An adapter failure reads as
    /// absent, so callers get false negatives under partial outages, never
    /// false positives.
    pub async fn content_exists(&self, folder: &str, digest: &ContentHash) -> bool {
        let path = Self::storage_path(folder, digest);
        match self.blobs.exists(&path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(%path, error = %e, "existence probe failed, reporting absent");
                false
            }
        }
    }

    /// Release one reference to `digest`, deleting the payload and its
    /// entry once no references remain.
    ///
    /// With `force`, the payload and entry are removed regardless of the
    /// reference count. The blob is deleted before the entry, so a crash
    /// between the two leaves a detectable orphaned entry rather than an
    /// unaccounted payload.
    pub async fn delete_content(
        &self,
        folder: &str,
        digest: &ContentHash,
        force: bool,
    ) -> CasResult<()> {
        let path = Self::storage_path(folder, digest);
        let key = Self::entry_key(folder, digest);

        let lock = self.digest_lock(&path);
        let _guard = lock.lock().await;

        let mut entry = self
            .metadata
            .get(&key)
            .await
            .map_err(|e| CasError::adapter(&key, e))?
            .ok_or_else(|| CasError::not_found(&key))?;

        if !force {
            let remaining = entry.release();
            if remaining > 0 {
                self.metadata
                    .put(&key, &entry)
                    .await
                    .map_err(|e| CasError::adapter(&key, e))?;
                debug!(%digest, remaining, "released reference, payload retained");
                return Ok(());
            }
        }

        self.blobs
            .delete(&path)
            .await
            .map_err(|e| CasError::adapter(&path, e))?;
        self.metadata
            .delete(&key)
            .await
            .map_err(|e| CasError::adapter(&key, e))?;

        debug!(%digest, force, "deleted content and entry");
        Ok(())
    }

    /// Pure metadata lookup for `digest` under `folder`; no mutation.
    pub async fn get_entry(
        &self,
        folder: &str,
        digest: &ContentHash,
    ) -> CasResult<Option<CasEntry>> {
        let key = Self::entry_key(folder, digest);
        self.metadata
            .get(&key)
            .await
            .map_err(|e| CasError::adapter(&key, e))
    }

    /// Enumerate all entries under `folder`.
    ///
    /// Each call re-enumerates the underlying store; nothing is cached
    /// across calls. Blobs under the folder that are not digest-keyed
    /// payloads (entry documents, stray files) are skipped, as are payloads
    /// whose entry lookup fails; the latter are logged.
    pub fn list_entries<'a>(
        &'a self,
        folder: &str,
    ) -> impl Stream<Item = CasResult<CasEntry>> + 'a {
        self.list_entries_where(folder, |_| true)
    }

    /// Enumerate entries under `folder` for which `filter` returns true.
    pub fn list_entries_where<'a, F>(
        &'a self,
        folder: &str,
        filter: F,
    ) -> impl Stream<Item = CasResult<CasEntry>> + 'a
    where
        F: Fn(&CasEntry) -> bool + Send + 'a,
    {
        let folder = folder.to_string();
        try_stream! {
            let prefix = format!("{folder}/");
            let paths = self
                .blobs
                .list(&prefix)
                .await
                .map_err(|e| CasError::adapter(&prefix, e))?;

            for path in paths {
                // Payloads are direct children named by their digest;
                // anything nested (like metadata documents) or non-digest
                // is not a payload.
                let name = match path.strip_prefix(&prefix) {
                    Some(name) if !name.contains('/') => name,
                    _ => continue,
                };
                let digest: ContentHash = match name.parse() {
                    Ok(digest) => digest,
                    Err(_) => continue,
                };

                let key = Self::entry_key(&folder, &digest);
                match self.metadata.get(&key).await {
                    Ok(Some(entry)) => {
                        if filter(&entry) {
                            yield entry;
                        }
                    }
                    Ok(None) => {
                        warn!(%path, "payload with no entry document, skipping");
                    }
                    Err(e) => {
                        warn!(%path, error = %e, "entry lookup failed, skipping");
                    }
                }
            }
        }
    }

    async fn touch_entry(&self, folder: &str, digest: &ContentHash) -> anyhow::Result<()> {
        let path = Self::storage_path(folder, digest);
        let key = Self::entry_key(folder, digest);

        // Under the digest lock so the read-modify-write doesn't race a
        // concurrent reference-count update.
        let lock = self.digest_lock(&path);
        let _guard = lock.lock().await;

        if let Some(mut entry) = self.metadata.get(&key).await? {
            entry.touch();
            self.metadata.put(&key, &entry).await?;
        }
        Ok(())
    }
}
