//! Folder-shaped view of a bucket, as returned to callers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file directly under the listed folder.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Full object key.
    pub key: String,

    /// Key with the listed prefix stripped.
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    pub last_modified: DateTime<Utc>,

    /// Unsigned public URL of the object.
    pub url: String,
}

/// A sub-folder inferred from a common prefix (or an explicit marker).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    /// Full prefix, always ending in `/`.
    pub prefix: String,

    /// Last path segment of the prefix.
    pub name: String,
}

/// One level of a folder.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct FilePayload {
    pub body: Bytes,
    pub content_type: String,
}
