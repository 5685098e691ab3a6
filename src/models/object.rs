//! Metadata row for an object held by the local backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::ObjectSummary;

/// A single blob stored on local disk, described by its SQLite row.
///
/// The payload itself lives in a sharded file named after the key digest;
/// this struct only carries metadata.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object key, unique within the bucket.
    pub key: String,

    /// Content type (MIME type) declared at upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}

impl From<StoredObject> for ObjectSummary {
    fn from(obj: StoredObject) -> Self {
        Self {
            key: obj.key,
            size: obj.size_bytes.max(0) as u64,
            last_modified: obj.last_modified,
        }
    }
}
