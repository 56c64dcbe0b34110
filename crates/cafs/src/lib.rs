//! Content-addressable storage (CAFS) engine.
//!
//! Stores arbitrary byte content once, keyed by the SHA-256 digest of its
//! bytes, collapses duplicate writes into reference-count bumps, and tracks
//! per-entry access metadata so content can be shared across many logical
//! owners and deleted once nothing references it.
//!
//! The engine sits on two narrow capabilities supplied by the caller: a
//! [`BlobStore`] for payload bytes and a [`MetadataStore`] for bookkeeping
//! entries. [`BlobMetadataStore`] collapses the latter onto the former as
//! JSON documents; [`MemoryBlobStore`] and [`FsBlobStore`] are the bundled
//! blob backends.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cafs::{CasConfig, CasEngine, FsBlobStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let blobs = Arc::new(FsBlobStore::new("/var/lib/cafs").await?);
//! let engine = CasEngine::with_blob_metadata(blobs, CasConfig::default())?;
//!
//! // Store content; identical bytes dedup into a reference-count bump.
//! let result = engine.store_content("cafs", b"Hello, World!", "resource-1").await;
//! assert!(result.success);
//!
//! // Retrieve it back by digest; integrity is verified on every read.
//! let digest = result.content_hash.parse()?;
//! let bytes = engine.retrieve_content("cafs", &digest, true).await?;
//! assert_eq!(bytes, b"Hello, World!");
//!
//! // Release the reference; the payload disappears once the count hits zero.
//! engine.delete_content("cafs", &digest, false).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fs;
pub mod hash;
pub mod memory;
pub mod store;

// Re-exports for convenience
pub use config::{CasConfig, DEFAULT_CONTENT_TYPE, DEFAULT_MAX_FILE_SIZE};
pub use engine::{CasEngine, StoreResult};
pub use entry::{CasEntry, ResourceMetadata};
pub use error::{CasError, CasResult};
pub use fs::FsBlobStore;
pub use hash::{ContentHash, HashError};
pub use memory::MemoryBlobStore;
pub use store::{BlobMetadataStore, BlobStore, MetadataStore};
