//! src/store/local.rs
//!
//! LocalStore: a single-bucket object store backed by SQLite for metadata
//! and local disk for payloads. Payloads are sharded beneath
//! `base_path/{shard}/{shard}/{digest}` where `digest` is the MD5 of the key,
//! so keys ending in `/` (folder markers) and keys that prefix each other
//! never collide on disk.

use crate::models::object::StoredObject;
use crate::store::{
    ListPage, ListRequest, MAX_KEYS_PER_REQUEST, ObjectBody, ObjectStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use md5::Context;
use sqlx::{
    QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Connect to `database_url`, creating the database file, its parent
    /// directory and the payload directory when missing, then apply the schema.
    pub async fn open(database_url: &str, storage_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = storage_dir.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
            tracing::info!("Created storage directory at {}", base_path.display());
        }

        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(Arc::new(db), base_path);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject keys the metadata table or disk layout cannot hold.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if key.bytes().any(|b| b.is_ascii_control()) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Construct the payload path for a key.
    ///
    /// Uses MD5(key): the first two bytes pick the shard directories and the
    /// full hex digest names the file. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(key.as_bytes());
        let mut path = self.base_path.clone();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn fetch_object(&self, key: &str) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NoSuchKey(key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Write `body` to a temp file next to its final location, fsync, then
    /// rename into place. Returns the payload MD5 as lowercase hex.
    async fn write_payload(&self, file_path: &Path, body: &[u8]) -> StoreResult<String> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut digest = Context::new();
        digest.consume(body);

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, file_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        Ok(format!("{:x}", digest.compute()))
    }

    async fn remove_payload(&self, key: &str) -> StoreResult<()> {
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    /// Recursively remove empty shard directories up to the base path.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    /// Upsert: a second put to the same key fully replaces the first.
    async fn put(&self, key: &str, body: Bytes, content_type: Option<String>) -> StoreResult<()> {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let etag = self.write_payload(&file_path, &body).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO objects (id, key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(content_type)
        .bind(body.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => {
                debug!(key, size = body.len(), "stored object");
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectBody> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        let body = fs::read(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NoSuchKey(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok(ObjectBody {
            body: Bytes::from(body),
            content_type: object.content_type,
        })
    }

    /// Absent keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        self.remove_payload(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if keys.len() > MAX_KEYS_PER_REQUEST {
            return Err(StoreError::Backend(format!(
                "bulk delete accepts at most {} keys, got {}",
                MAX_KEYS_PER_REQUEST,
                keys.len()
            )));
        }
        for key in keys {
            self.ensure_key_safe(key)?;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM objects WHERE key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(")");
        builder.build().execute(&*self.db).await?;

        for key in keys {
            self.remove_payload(key).await?;
        }
        Ok(())
    }

    /// List keys in lexicographic order.
    ///
    /// With a delimiter, keys that contain it after the prefix fold into a
    /// common prefix. Continuation tokens are the base64 of the last key
    /// returned on the previous page.
    async fn list(&self, request: ListRequest) -> StoreResult<ListPage> {
        let max_keys = request.max_keys.clamp(1, MAX_KEYS_PER_REQUEST);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, key, content_type, size_bytes, etag, last_modified \
             FROM objects WHERE 1 = 1",
        );

        if !request.prefix.is_empty() {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(request.prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(request.prefix.clone());
        }

        if let Some(token) = request.continuation_token.as_deref() {
            builder.push(" AND key > ");
            builder.push_bind(decode_continuation_token(token));
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<StoredObject> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut is_truncated = false;
        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            is_truncated = true;
            next_continuation_token = rows.last().map(|last| encode_continuation_token(&last.key));
        }

        let mut contents = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for obj in rows {
            if let Some(delim) = request.delimiter.as_deref() {
                if let Some(prefix) = compute_common_prefix(&obj.key, &request.prefix, delim) {
                    common_prefixes.insert(prefix);
                    continue;
                }
            }
            contents.push(obj.into());
        }

        Ok(ListPage {
            contents,
            common_prefixes: common_prefixes.into_iter().collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;

        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(StoreError::Backend("storage directory content mismatch".into()));
        }
        Ok(())
    }
}

/// Compute the common prefix a key folds into for a delimited listing.
///
/// Returns `None` when the key has no delimiter after `requested_prefix`,
/// i.e. when it is a direct child.
fn compute_common_prefix(key: &str, requested_prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::from(requested_prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// In-memory SQLite plus a throwaway payload directory.
    pub(crate) async fn test_store() -> (LocalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = LocalStore::new(Arc::new(pool), dir.path());
        store.migrate().await.unwrap();
        (store, dir)
    }

    #[test]
    fn common_prefix_folds_nested_keys() {
        assert_eq!(
            compute_common_prefix("docs/img/logo.png", "docs/", "/"),
            Some("docs/img/".to_string())
        );
        assert_eq!(compute_common_prefix("docs/readme.txt", "docs/", "/"), None);
        assert_eq!(
            compute_common_prefix("docs/readme.txt", "", "/"),
            Some("docs/".to_string())
        );
        assert_eq!(compute_common_prefix("other/x", "docs/", "/"), None);
    }

    #[tokio::test]
    async fn put_then_get_returns_same_bytes() {
        let (store, _dir) = test_store().await;
        store
            .put(
                "notes/a.txt",
                Bytes::from_static(b"hello"),
                Some("text/plain".into()),
            )
            .await
            .unwrap();

        let got = store.get("notes/a.txt").await.unwrap();
        assert_eq!(&got.body[..], b"hello");
        assert_eq!(got.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let (store, _dir) = test_store().await;
        store.put("k", Bytes::from_static(b"one"), None).await.unwrap();
        store.put("k", Bytes::from_static(b"second"), None).await.unwrap();

        let got = store.get("k").await.unwrap();
        assert_eq!(&got.body[..], b"second");
        let page = store.list(ListRequest::new("")).await.unwrap();
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].size, 6);
    }

    #[tokio::test]
    async fn marker_and_prefixed_keys_coexist() {
        let (store, _dir) = test_store().await;
        store.put("docs/", Bytes::new(), None).await.unwrap();
        store.put("docs", Bytes::from_static(b"flat"), None).await.unwrap();
        store
            .put("docs/a.txt", Bytes::from_static(b"a"), None)
            .await
            .unwrap();

        assert_eq!(store.get("docs/").await.unwrap().body.len(), 0);
        assert_eq!(&store.get("docs").await.unwrap().body[..], b"flat");
    }

    #[tokio::test]
    async fn get_missing_key_is_no_such_key() {
        let (store, _dir) = test_store().await;
        let err = store.get("missing.bin").await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchKey(ref k) if k == "missing.bin"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _dir) = test_store().await;
        store.put("a", Bytes::from_static(b"1"), None).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(matches!(
            store.get("a").await.unwrap_err(),
            StoreError::NoSuchKey(_)
        ));
    }

    #[tokio::test]
    async fn delete_many_removes_only_named_keys() {
        let (store, _dir) = test_store().await;
        for key in ["a", "b", "c"] {
            store.put(key, Bytes::from_static(b"x"), None).await.unwrap();
        }
        store
            .delete_many(&["a".to_string(), "b".to_string(), "zz".to_string()])
            .await
            .unwrap();

        let page = store.list(ListRequest::new("")).await.unwrap();
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c"]);
    }

    #[tokio::test]
    async fn list_with_delimiter_groups_common_prefixes() {
        let (store, _dir) = test_store().await;
        for key in ["docs/readme.txt", "docs/img/logo.png", "docs/img/", "top.txt"] {
            store.put(key, Bytes::from_static(b"x"), None).await.unwrap();
        }

        let page = store
            .list(ListRequest::new("docs/").delimiter("/"))
            .await
            .unwrap();
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/readme.txt"]);
        assert_eq!(page.common_prefixes, vec!["docs/img/".to_string()]);
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn prefix_match_is_literal() {
        let (store, _dir) = test_store().await;
        store.put("a_b/x", Bytes::from_static(b"x"), None).await.unwrap();
        store.put("axb/x", Bytes::from_static(b"x"), None).await.unwrap();

        let page = store.list(ListRequest::new("a_b/")).await.unwrap();
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].key, "a_b/x");
    }

    #[tokio::test]
    async fn list_paginates_without_skipping_keys() {
        let (store, _dir) = test_store().await;
        for i in 0..5 {
            store
                .put(&format!("k{i}"), Bytes::from_static(b"x"), None)
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = store
                .list(ListRequest::new("").max_keys(2).after(token))
                .await
                .unwrap();
            seen.extend(page.contents.into_iter().map(|o| o.key));
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
        }
        assert_eq!(seen, vec!["k0", "k1", "k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn ping_checks_db_and_disk() {
        let (store, _dir) = test_store().await;
        store.ping().await.unwrap();
    }
}
