//! Object store client abstraction.
//!
//! A flat key/value blob store with prefix + delimiter listing. There are no
//! directories at this level; everything folder-shaped lives in
//! [`crate::services::vfs`].
//!
//! Two backends are provided:
//! - [`local::LocalStore`]: SQLite metadata + sharded on-disk payloads.
//! - [`cos::CosStore`]: a remote S3-compatible bucket (Tencent COS by default).

pub mod cos;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;

/// Largest number of keys a single listing page or bulk delete may carry.
pub const MAX_KEYS_PER_REQUEST: usize = 1000;

/// One entry of a listing's `contents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Bytes of a stored object together with its declared content type.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

impl ListRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: None,
            continuation_token: None,
            max_keys: MAX_KEYS_PER_REQUEST,
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn after(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }
}

/// One page of a prefix listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("NoSuchKey: object `{0}` does not exist")]
    NoSuchKey(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the file manager needs from a bucket.
///
/// Implementations must treat `delete` of an absent key as success and must
/// report a missing key on `get` as [`StoreError::NoSuchKey`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<String>) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<ObjectBody>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Delete up to [`MAX_KEYS_PER_REQUEST`] keys in one call.
    async fn delete_many(&self, keys: &[String]) -> StoreResult<()>;

    async fn list(&self, request: ListRequest) -> StoreResult<ListPage>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()> {
        self.list(ListRequest::new("").max_keys(1)).await.map(|_| ())
    }
}
