//! Engine configuration.
//!
//! An explicit immutable struct with named fields and documented defaults,
//! validated once at engine construction. Where the blobs actually live
//! (bucket, base directory) belongs to the blob store adapter, not here.

use crate::error::{CasError, CasResult};
use serde::{Deserialize, Serialize};

/// Default maximum payload size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default content type recorded when the caller does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Configuration for the CAS engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasConfig {
    /// Whether identical content collapses into a reference-count bump
    /// instead of a second physical write.
    #[serde(default = "default_true")]
    pub dedup_enabled: bool,

    /// Maximum payload size in bytes. Stores over this limit are rejected
    /// with a failure result before any I/O happens.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Content type recorded for payloads stored without an explicit one.
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl CasConfig {
    /// Config with a specific maximum payload size.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            ..Self::default()
        }
    }

    /// Config with deduplication disabled. Every store writes bytes, even
    /// for content already present.
    pub fn without_dedup() -> Self {
        Self {
            dedup_enabled: false,
            ..Self::default()
        }
    }

    /// Set the default content type.
    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Validate the configuration. Called once at engine construction.
    pub fn validate(&self) -> CasResult<()> {
        if self.max_file_size == 0 {
            return Err(CasError::InvalidConfig(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        if self.default_content_type.is_empty() {
            return Err(CasError::InvalidConfig(
                "default_content_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
