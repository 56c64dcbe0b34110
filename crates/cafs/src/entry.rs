//! CAS entry types: the persisted bookkeeping record for one digest.
//!
//! One entry corresponds to exactly one stored payload and one digest. Many
//! external resource identifiers may reference the same entry; the reference
//! count governs when the payload is physically deleted.
//!
//! Entries serialize to camelCase JSON so the persisted documents match the
//! layout other services expect:
//!
//! ```json
//! {
//!   "contentHash": "e3b0...",
//!   "storagePath": "cafs/e3b0...",
//!   "metadata": {
//!     "contentSize": 42,
//!     "contentType": "application/json",
//!     "timestamp": "2026-08-30T12:00:00Z",
//!     "lastAccessedAt": "2026-08-30T12:00:00Z",
//!     "referenceCount": 1,
//!     "tags": [],
//!     "customProperties": {}
//!   },
//!   "referencedBy": ["resource-1"]
//! }
//! ```

use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Attributes attached to one stored payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Size of the stored payload in bytes.
    pub content_size: u64,

    /// MIME type of the content.
    pub content_type: String,

    /// Creation instant. Set once, never mutated.
    pub timestamp: DateTime<Utc>,

    /// Last read instant. Bumped on retrieval.
    pub last_accessed_at: DateTime<Utc>,

    /// Count of logical owners pointing at this payload. Never negative;
    /// reaching zero makes the entry eligible for physical deletion.
    pub reference_count: u64,

    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Open key-value properties.
    #[serde(default)]
    pub custom_properties: HashMap<String, serde_json::Value>,
}

/// The persisted record for one digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CasEntry {
    /// Digest of the bytes stored at `storage_path`. Any mismatch between
    /// this and the actual stored bytes signals corruption.
    pub content_hash: ContentHash,

    /// Blob store key of the payload: `<folder>/<digest>`.
    pub storage_path: String,

    /// Bookkeeping attributes.
    pub metadata: ResourceMetadata,

    /// External resource identifiers referencing this content, in the order
    /// they first appeared.
    #[serde(default)]
    pub referenced_by: Vec<String>,
}

impl CasEntry {
    /// Create the entry for a freshly stored payload (reference count 1).
    ///
    /// `identity` is the caller-assigned audit identifier; an empty identity
    /// is not recorded.
    pub fn new(
        content_hash: ContentHash,
        storage_path: impl Into<String>,
        content_size: u64,
        content_type: impl Into<String>,
        identity: &str,
    ) -> Self {
        let now = Utc::now();
        let referenced_by = if identity.is_empty() {
            Vec::new()
        } else {
            vec![identity.to_string()]
        };
        Self {
            content_hash,
            storage_path: storage_path.into(),
            metadata: ResourceMetadata {
                content_size,
                content_type: content_type.into(),
                timestamp: now,
                last_accessed_at: now,
                reference_count: 1,
                tags: BTreeSet::new(),
                custom_properties: HashMap::new(),
            },
            referenced_by,
        }
    }

    /// Record a new logical owner: bump the reference count and remember the
    /// identity if it isn't already listed.
    pub fn add_reference(&mut self, identity: &str) {
        self.metadata.reference_count += 1;
        if !identity.is_empty() && !self.referenced_by.iter().any(|r| r == identity) {
            self.referenced_by.push(identity.to_string());
        }
    }

    /// Drop one logical owner, flooring the count at zero. Returns the new
    /// count so callers can decide whether the payload is still live.
    pub fn release(&mut self) -> u64 {
        self.metadata.reference_count = self.metadata.reference_count.saturating_sub(1);
        self.metadata.reference_count
    }

    /// Bump the last-accessed instant.
    pub fn touch(&mut self) {
        self.metadata.last_accessed_at = Utc::now();
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into());
        self
    }

    /// Builder: set a custom property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.custom_properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CasEntry {
        let hash = ContentHash::from_data(b"payload");
        let path = format!("cafs/{hash}");
        CasEntry::new(hash, path, 7, "text/plain", "res-1")
    }

    #[test]
    fn test_new_entry_starts_at_one_reference() {
        let e = entry();
        assert_eq!(e.metadata.reference_count, 1);
        assert_eq!(e.referenced_by, vec!["res-1".to_string()]);
        assert_eq!(e.metadata.timestamp, e.metadata.last_accessed_at);
    }

    #[test]
    fn test_empty_identity_not_recorded() {
        let hash = ContentHash::from_data(b"x");
        let e = CasEntry::new(hash.clone(), format!("cafs/{hash}"), 1, "text/plain", "");
        assert!(e.referenced_by.is_empty());
        assert_eq!(e.metadata.reference_count, 1);
    }

    #[test]
    fn test_add_reference_deduplicates_identity() {
        let mut e = entry();
        e.add_reference("res-2");
        e.add_reference("res-2");
        assert_eq!(e.metadata.reference_count, 3);
        assert_eq!(e.referenced_by, vec!["res-1".to_string(), "res-2".to_string()]);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut e = entry();
        assert_eq!(e.release(), 0);
        assert_eq!(e.release(), 0);
        assert_eq!(e.metadata.reference_count, 0);
    }

    #[test]
    fn test_touch_leaves_creation_timestamp_alone() {
        let mut e = entry();
        let created = e.metadata.timestamp;
        e.touch();
        assert_eq!(e.metadata.timestamp, created);
        assert!(e.metadata.last_accessed_at >= created);
    }

    #[test]
    fn test_serializes_to_camel_case() {
        let e = entry();
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("contentHash").is_some());
        assert!(json.get("storagePath").is_some());
        assert!(json.get("referencedBy").is_some());
        let meta = json.get("metadata").unwrap();
        assert!(meta.get("contentSize").is_some());
        assert!(meta.get("lastAccessedAt").is_some());
        assert!(meta.get("referenceCount").is_some());
    }

    #[test]
    fn test_serde_roundtrip() {
        let e = entry()
            .with_tag("audio")
            .with_property("origin", serde_json::json!("upload"));
        let json = serde_json::to_string(&e).unwrap();
        let restored: CasEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(e, restored);
    }
}
