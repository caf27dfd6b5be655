//! Bucket metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::BucketId;

/// Placeholder used for metadata fields of auto-created buckets.
pub const UNKNOWN: &str = "unknown";

/// Descriptive metadata for a bucket of events.
///
/// Everything except `name` is fixed when the bucket is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMetadata {
    /// Unique bucket identifier.
    pub id: BucketId,
    /// Human-readable, renameable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The kind of events stored (e.g. `currentwindow`, `afkstatus`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Name of the watcher that owns the bucket.
    pub client: String,
    /// Host the watcher runs on.
    pub hostname: String,
    /// When the bucket was created.
    pub created: DateTime<Utc>,
    /// Additional free-form bucket attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl BucketMetadata {
    /// Creates metadata for a new bucket created now.
    pub fn new(
        id: BucketId,
        kind: impl Into<String>,
        client: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: None,
            kind: kind.into(),
            client: client.into(),
            hostname: hostname.into(),
            created: Utc::now(),
            data: Map::new(),
        }
    }

    /// Creates placeholder metadata for a bucket created implicitly by a heartbeat.
    pub fn placeholder(id: BucketId) -> Self {
        Self::new(id, UNKNOWN, UNKNOWN, UNKNOWN)
    }
}
