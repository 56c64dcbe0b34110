//! Filesystem-backed blob store.
//!
//! Maps blob paths onto files under a base directory, creating intermediate
//! directories as needed. Content type and custom metadata have no home on a
//! plain filesystem and are not persisted here; the engine's metadata store
//! is the durable record for both.
//!
//! Layout for a payload stored under folder `cafs`:
//! ```text
//! {base}/
//! └── cafs/
//!     ├── e3b0c442...          # payload bytes
//!     └── metadata/
//!         └── e3b0c442....json # entry document (when backed by BlobMetadataStore)
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::store::BlobStore;

/// Blob store over a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `base`, creating the directory if needed.
    pub async fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)
            .await
            .context("failed to create blob store base directory")?;
        Ok(Self { base })
    }

    /// Base directory of the store.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a blob path to a filesystem path, rejecting anything that
    /// would escape the base directory.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => bail!("invalid blob path: {path}"),
            }
        }
        Ok(self.base.join(relative))
    }

    /// Collect relative blob paths under `dir`, depth-first.
    async fn walk(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<()> {
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to list {}", current.display()))
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.base) {
                    // Blob paths always use '/' regardless of platform.
                    let key = relative
                        .components()
                        .filter_map(|c| c.as_os_str().to_str())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
        _metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create blob parent directory")?;
        }
        fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write blob at {path}"))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read blob at {path}")),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete blob at {path}")),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        self.walk(self.base.clone(), &mut paths).await?;
        paths.retain(|p| p.starts_with(prefix));
        paths.sort();
        Ok(paths)
    }
}
