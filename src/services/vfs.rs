//! Virtual filesystem over a flat object store.
//!
//! Folders do not exist in the store. A folder is either a common prefix
//! reported by a delimited listing, or a zero-byte marker object whose key
//! ends in `/`. This layer is stateless: every call goes straight to the
//! store and nothing is cached between calls.

use crate::models::entry::{FileEntry, FilePayload, FolderEntry, Listing};
use crate::services::paths::{self, SEPARATOR};
use crate::store::{ListRequest, MAX_KEYS_PER_REQUEST, ObjectStore, StoreError};
use bytes::Bytes;
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("failed to list files: {0}")]
    ListFailed(String),
    #[error("failed to read file: {0}")]
    ReadFailed(String),
    #[error("failed to write: {0}")]
    WriteFailed(String),
    #[error("failed to delete: {0}")]
    DeleteFailed(String),
    #[error("{0}")]
    ValidationFailed(String),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Map a store failure onto `kind`, except a rejected key, which is the
    /// caller's fault.
    fn from_store(err: StoreError, kind: fn(String) -> FsError) -> FsError {
        match err {
            StoreError::InvalidKey(key) => {
                FsError::ValidationFailed(format!("Invalid object key `{key}`."))
            }
            other => kind(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct VirtualFs {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    /// Host the bucket is publicly served from, e.g. `cos.ap-guangzhou.myqcloud.com`.
    public_host: String,
    page_size: usize,
}

impl VirtualFs {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        public_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            public_host: public_host.into(),
            page_size: MAX_KEYS_PER_REQUEST,
        }
    }

    #[cfg(test)]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Unsigned public URL for a key. Assumes the bucket is publicly readable.
    pub fn public_url(&self, key: &str) -> String {
        format!("https://{}.{}/{}", self.bucket, self.public_host, key)
    }

    /// List one level below `prefix`.
    ///
    /// `"docs"` and `"docs/"` list identically; `""` lists the bucket root.
    /// The folder's own marker object never shows up as a file. Every page
    /// of the store listing is consumed.
    pub async fn list_files(&self, prefix: &str) -> FsResult<Listing> {
        let list_prefix = paths::normalize_prefix(prefix);
        debug!(prefix = %list_prefix, "listing folder");

        let mut files = Vec::new();
        let mut folders = BTreeSet::new();
        let mut token = None;
        loop {
            let page = self
                .store
                .list(
                    ListRequest::new(list_prefix.as_str())
                        .delimiter(SEPARATOR.to_string())
                        .max_keys(self.page_size)
                        .after(token),
                )
                .await
                .map_err(|err| {
                    warn!(prefix = %list_prefix, error = %err, "listing failed");
                    FsError::ListFailed(err.to_string())
                })?;

            folders.extend(page.common_prefixes);
            files.extend(
                page.contents
                    .into_iter()
                    .filter(|obj| obj.key != list_prefix)
                    .map(|obj| FileEntry {
                        name: obj.key[list_prefix.len()..].to_string(),
                        url: self.public_url(&obj.key),
                        size: obj.size,
                        last_modified: obj.last_modified,
                        key: obj.key,
                    }),
            );

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        files.sort_by(|a, b| a.key.cmp(&b.key));
        let folders = folders
            .into_iter()
            .map(|prefix| FolderEntry {
                name: paths::trim_folder(&prefix[list_prefix.len()..]).to_string(),
                prefix,
            })
            .collect();

        let listing = Listing { files, folders };
        if listing.is_empty() {
            debug!(prefix = %list_prefix, "folder is empty");
        }
        Ok(listing)
    }

    /// Write a zero-byte marker at `key/`. Creating an existing folder is a
    /// plain overwrite of its marker.
    pub async fn create_folder(&self, key: &str) -> FsResult<()> {
        let folder_key = paths::folder_key(key);
        self.store
            .put(&folder_key, Bytes::new(), None)
            .await
            .map_err(|err| FsError::from_store(err, FsError::WriteFailed))?;
        info!(folder = %folder_key, "created folder");
        Ok(())
    }

    /// Delete every object under the folder, marker included.
    ///
    /// Lists the whole subtree first, then bulk-deletes in batches. Not
    /// transactional: when a batch fails the folder is left partially
    /// deleted, and calling this again finishes the job. Objects written
    /// after the listing are not removed. Returns the number of keys deleted.
    pub async fn delete_folder(&self, prefix: &str) -> FsResult<usize> {
        if paths::trim_folder(prefix).is_empty() {
            return Err(FsError::ValidationFailed(
                "refusing to delete the bucket root".into(),
            ));
        }
        let folder_key = paths::folder_key(prefix);

        let keys = self
            .collect_keys(&folder_key)
            .await
            .map_err(|err| FsError::DeleteFailed(err.to_string()))?;
        if keys.is_empty() {
            debug!(folder = %folder_key, "nothing to delete");
            return Ok(0);
        }

        for (batch_no, batch) in keys.chunks(MAX_KEYS_PER_REQUEST).enumerate() {
            if let Err(err) = self.store.delete_many(batch).await {
                warn!(
                    folder = %folder_key,
                    batch = batch_no,
                    error = %err,
                    "folder delete aborted; contents may be partially deleted"
                );
                return Err(FsError::DeleteFailed(format!(
                    "{err} (folder `{folder_key}` may be partially deleted; retry the delete)"
                )));
            }
        }

        info!(folder = %folder_key, count = keys.len(), "deleted folder");
        Ok(keys.len())
    }

    /// Every key under `prefix`, across all nesting levels and pages.
    async fn collect_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .store
                .list(
                    ListRequest::new(prefix)
                        .max_keys(self.page_size)
                        .after(token),
                )
                .await?;
            keys.extend(page.contents.into_iter().map(|obj| obj.key));
            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        Ok(keys)
    }

    /// Direct put with overwrite semantics. Empty bodies are accepted here.
    pub async fn upload_file(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> FsResult<()> {
        self.store
            .put(key, body, content_type)
            .await
            .map_err(|err| FsError::from_store(err, FsError::WriteFailed))
    }

    /// Deleting an absent key succeeds.
    pub async fn delete_file(&self, key: &str) -> FsResult<()> {
        self.store
            .delete(key)
            .await
            .map_err(|err| FsError::from_store(err, FsError::DeleteFailed))
    }

    pub async fn get_file_payload(&self, key: &str) -> FsResult<FilePayload> {
        match self.store.get(key).await {
            Ok(object) => Ok(FilePayload {
                body: object.body,
                content_type: object
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            }),
            Err(StoreError::NoSuchKey(_)) => Err(FsError::NotFound(key.to_string())),
            Err(err) => Err(FsError::from_store(err, FsError::ReadFailed)),
        }
    }

    /// File body as text; invalid UTF-8 is replaced.
    pub async fn get_file_content(&self, key: &str) -> FsResult<String> {
        let payload = self.get_file_payload(key).await?;
        Ok(String::from_utf8_lossy(&payload.body).into_owned())
    }

    /// Total size of the files directly inside a folder.
    pub async fn folder_size(&self, prefix: &str) -> FsResult<u64> {
        let listing = self.list_files(prefix).await?;
        Ok(listing.files.iter().map(|f| f.size).sum())
    }

    pub async fn test_connection(&self) -> FsResult<()> {
        if self.bucket.is_empty() || self.public_host.is_empty() {
            return Err(FsError::ValidationFailed(
                "incomplete configuration: bucket or region missing".into(),
            ));
        }
        self.store
            .ping()
            .await
            .map_err(|err| FsError::ListFailed(format!("connection test failed: {err}")))
    }
}
