//! File service facade: the operation set the HTTP routes call.
//!
//! Thin layer over [`VirtualFs`] that validates input and decides whether a
//! request targets a file or a folder. That decision follows a
//! [`RoutingPolicy`] fixed when the service is built.

use crate::models::entry::{FilePayload, Listing};
use crate::services::{
    paths,
    vfs::{FsError, FsResult, VirtualFs},
};
use bytes::Bytes;
use futures::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info};

/// How a request without an explicit mode is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RoutingPolicy {
    /// Only the caller's `mode` decides; a missing mode means the
    /// operation's default target.
    #[default]
    Explicit,
    /// A key without `/` is a folder, a key with `/` is a file.
    Separator,
}

/// Target of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[serde(alias = "download")]
    File,
    #[serde(alias = "list")]
    Folder,
}

/// One file of a multi-file upload.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub name: String,
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Result of a read: a folder listing or a file body.
#[derive(Debug)]
pub enum ReadOutcome {
    Listing(Listing),
    File { key: String, payload: FilePayload },
}

#[derive(Clone)]
pub struct FileService {
    fs: VirtualFs,
    routing: RoutingPolicy,
}

fn require_key<'a>(key: &'a str, action: &str) -> FsResult<&'a str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(FsError::ValidationFailed(format!(
            "A key is required to {action}."
        )));
    }
    Ok(key)
}

impl FileService {
    pub fn new(fs: VirtualFs, routing: RoutingPolicy) -> Self {
        Self { fs, routing }
    }

    /// Pick the target for `key`. An explicit mode always wins.
    pub fn resolve(&self, key: &str, explicit: Option<Mode>, fallback: Mode) -> Mode {
        match (explicit, self.routing) {
            (Some(mode), _) => mode,
            (None, RoutingPolicy::Explicit) => fallback,
            (None, RoutingPolicy::Separator) if key.contains(paths::SEPARATOR) => Mode::File,
            (None, RoutingPolicy::Separator) => Mode::Folder,
        }
    }

    /// List a folder or download a file. Listing is the default; an empty
    /// key lists the root.
    pub async fn read(&self, key: &str, mode: Option<Mode>) -> FsResult<ReadOutcome> {
        match self.resolve(key, mode, Mode::Folder) {
            Mode::Folder => Ok(ReadOutcome::Listing(self.list(key).await?)),
            Mode::File => {
                let key = require_key(key, "download a file")?;
                let payload = self.download(key).await?;
                Ok(ReadOutcome::File {
                    key: key.to_string(),
                    payload,
                })
            }
        }
    }

    /// Upload a file (the default) or create a folder. Returns the target
    /// that was acted on.
    pub async fn create(
        &self,
        key: &str,
        mode: Option<Mode>,
        body: Bytes,
        content_type: Option<String>,
    ) -> FsResult<Mode> {
        let key = require_key(key, "create a resource")?;
        let target = self.resolve(key, mode, Mode::File);
        match target {
            Mode::Folder => self.create_folder(key).await?,
            Mode::File => self.upload(key, body, content_type).await?,
        }
        Ok(target)
    }

    /// Delete a file (the default) or a whole folder.
    pub async fn remove(&self, key: &str, mode: Option<Mode>) -> FsResult<Mode> {
        let key = require_key(key, "delete a resource")?;
        let target = self.resolve(key, mode, Mode::File);
        match target {
            Mode::Folder => {
                self.fs.delete_folder(key).await?;
            }
            Mode::File => self.fs.delete_file(key).await?,
        }
        Ok(target)
    }

    pub async fn list(&self, prefix: &str) -> FsResult<Listing> {
        self.fs.list_files(prefix.trim()).await
    }

    pub async fn download(&self, key: &str) -> FsResult<FilePayload> {
        let key = require_key(key, "download a file")?;
        self.fs.get_file_payload(key).await
    }

    /// Zero-length bodies are reserved for folder markers and rejected.
    pub async fn upload(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> FsResult<()> {
        let key = require_key(key, "upload a file")?;
        if key.ends_with(paths::SEPARATOR) {
            return Err(FsError::ValidationFailed(format!(
                "File key `{key}` must not end with `/`."
            )));
        }
        if body.is_empty() {
            return Err(FsError::ValidationFailed(
                "Cannot upload an empty file.".into(),
            ));
        }
        let size = body.len();
        self.fs.upload_file(key, body, content_type).await?;
        info!(key, size, "uploaded file");
        Ok(())
    }

    pub async fn create_folder(&self, key: &str) -> FsResult<()> {
        let key = require_key(key, "create a folder")?;
        self.fs.create_folder(key).await
    }

    /// Upload several files under `prefix` concurrently.
    ///
    /// Every item is validated before any put is sent. Puts are independent:
    /// the first failure is returned and files already written stay written.
    pub async fn upload_many(&self, prefix: &str, items: Vec<UploadItem>) -> FsResult<Vec<String>> {
        if items.is_empty() {
            return Err(FsError::ValidationFailed("No files to upload.".into()));
        }
        for item in &items {
            let name = item.name.trim();
            if paths::trim_folder(name).is_empty() {
                return Err(FsError::ValidationFailed(
                    "Every uploaded file needs a name.".into(),
                ));
            }
            if name.ends_with(paths::SEPARATOR) {
                return Err(FsError::ValidationFailed(format!(
                    "File name `{name}` must not end with `/`."
                )));
            }
            if item.body.is_empty() {
                return Err(FsError::ValidationFailed(format!(
                    "Cannot upload an empty file: {}",
                    item.name
                )));
            }
        }

        let prefix = prefix.trim();
        let uploads = items.into_iter().map(|item| {
            let key = paths::join(prefix, item.name.trim());
            async move {
                self.fs
                    .upload_file(&key, item.body, item.content_type)
                    .await?;
                Ok::<_, FsError>(key)
            }
        });
        let keys = try_join_all(uploads).await?;
        debug!(count = keys.len(), prefix, "multi-file upload finished");
        Ok(keys)
    }

    pub fn share_url(&self, key: &str) -> FsResult<String> {
        let key = require_key(key, "share a file")?;
        Ok(self.fs.public_url(key))
    }

    pub async fn folder_size(&self, prefix: &str) -> FsResult<u64> {
        self.fs.folder_size(prefix.trim()).await
    }

    pub async fn test_connection(&self) -> FsResult<()> {
        self.fs.test_connection().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::vfs::tests::test_fs;
    use tempfile::TempDir;

    pub(crate) async fn test_service(routing: RoutingPolicy) -> (FileService, TempDir) {
        let (fs, dir) = test_fs().await;
        (FileService::new(fs, routing), dir)
    }

    fn item(name: &str, body: &'static [u8]) -> UploadItem {
        UploadItem {
            name: name.into(),
            body: Bytes::from_static(body),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn explicit_policy_uses_fallbacks() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        assert_eq!(svc.resolve("flat", None, Mode::File), Mode::File);
        assert_eq!(svc.resolve("a/b", None, Mode::Folder), Mode::Folder);
        assert_eq!(svc.resolve("a/b", Some(Mode::Folder), Mode::File), Mode::Folder);
    }

    #[tokio::test]
    async fn separator_policy_infers_from_key() {
        let (svc, _dir) = test_service(RoutingPolicy::Separator).await;
        assert_eq!(svc.resolve("a", None, Mode::File), Mode::Folder);
        assert_eq!(svc.resolve("a/b", None, Mode::Folder), Mode::File);
        assert_eq!(svc.resolve("a", Some(Mode::File), Mode::Folder), Mode::File);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        assert!(matches!(
            svc.create("  ", None, Bytes::from_static(b"x"), None).await,
            Err(FsError::ValidationFailed(_))
        ));
        assert!(matches!(
            svc.remove("", Some(Mode::Folder)).await,
            Err(FsError::ValidationFailed(_))
        ));
        assert!(matches!(
            svc.read("", Some(Mode::File)).await,
            Err(FsError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        let err = svc.upload("a.txt", Bytes::new(), None).await.unwrap_err();
        assert!(matches!(err, FsError::ValidationFailed(ref m) if m.contains("empty")));
        assert!(svc.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_and_remove_route_by_mode() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        let made = svc
            .create("photos", Some(Mode::Folder), Bytes::new(), None)
            .await
            .unwrap();
        assert_eq!(made, Mode::Folder);
        svc.create("photos/a.jpg", None, Bytes::from_static(b"jpg"), None)
            .await
            .unwrap();

        match svc.read("photos", None).await.unwrap() {
            ReadOutcome::Listing(listing) => assert_eq!(listing.files[0].name, "a.jpg"),
            other => panic!("expected listing, got {other:?}"),
        }
        match svc.read("photos/a.jpg", Some(Mode::File)).await.unwrap() {
            ReadOutcome::File { key, payload } => {
                assert_eq!(key, "photos/a.jpg");
                assert_eq!(&payload.body[..], b"jpg");
            }
            other => panic!("expected file, got {other:?}"),
        }

        assert_eq!(
            svc.remove("photos", Some(Mode::Folder)).await.unwrap(),
            Mode::Folder
        );
        assert!(svc.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn separator_policy_routes_flat_keys_to_folders() {
        let (svc, _dir) = test_service(RoutingPolicy::Separator).await;
        svc.create("inbox", None, Bytes::new(), None).await.unwrap();
        svc.create("inbox/mail.eml", None, Bytes::from_static(b"m"), None)
            .await
            .unwrap();

        let root = svc.list("").await.unwrap();
        assert_eq!(root.folders[0].name, "inbox");

        svc.remove("inbox/mail.eml", None).await.unwrap();
        assert!(svc.list("inbox").await.unwrap().files.is_empty());
        svc.remove("inbox", None).await.unwrap();
        assert!(svc.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_many_writes_every_file() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        let keys = svc
            .upload_many("drop", vec![item("a.txt", b"aa"), item("b.txt", b"bbb")])
            .await
            .unwrap();
        assert_eq!(keys, vec!["drop/a.txt", "drop/b.txt"]);
        assert_eq!(svc.folder_size("drop").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn upload_many_validates_before_writing() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        let err = svc
            .upload_many("drop", vec![item("a.txt", b"aa"), item("b.txt", b"")])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::ValidationFailed(_)));
        assert!(svc.list("drop").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_many_rejects_folder_shaped_names() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        let err = svc
            .upload_many("drop", vec![item("ok.txt", b"ok"), item("a/", b"data")])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::ValidationFailed(ref m) if m.contains("a/")));
        assert!(svc.list("drop").await.unwrap().is_empty());
        assert!(matches!(
            svc.download("drop/a/").await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn share_url_is_public_and_unsigned() {
        let (svc, _dir) = test_service(RoutingPolicy::Explicit).await;
        assert_eq!(
            svc.share_url("docs/readme.txt").unwrap(),
            "https://demo.cos.ap-guangzhou.myqcloud.com/docs/readme.txt"
        );
    }
}
