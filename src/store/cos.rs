//! Remote bucket backend speaking the S3 API.
//!
//! Tencent COS exposes an S3-compatible endpoint at
//! `https://cos.{region}.myqcloud.com`, so the AWS SDK is used with static
//! credentials and a custom endpoint. Any other S3 endpoint works the same way.

use crate::store::{
    ListPage, ListRequest, MAX_KEYS_PER_REQUEST, ObjectBody, ObjectStore, ObjectSummary,
    StoreError, StoreResult,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::{get_object::GetObjectError, list_objects_v2::ListObjectsV2Output},
    primitives::ByteStream,
    types::{Delete, Error as DeleteError, Object, ObjectIdentifier},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Connection settings for a remote bucket.
#[derive(Clone)]
pub struct CosSettings {
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Full endpoint URL; defaults to the COS endpoint for `region`.
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct CosStore {
    client: Client,
    bucket: String,
}

impl CosStore {
    pub fn new(settings: CosSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://cos.{}.myqcloud.com", settings.region));
        let credentials = Credentials::new(
            settings.secret_id,
            settings.secret_key,
            None,
            None,
            "bucket-drive-static",
        );
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket,
        }
    }
}

fn backend_error<E>(err: E) -> StoreError
where
    E: std::error::Error + 'static,
{
    StoreError::Backend(DisplayErrorContext(&err).to_string())
}

fn to_chrono(ts: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default()
}

/// A service-side `GetObject` failure; only `NoSuchKey` is a missing object.
fn get_failure(key: &str, err: GetObjectError) -> StoreError {
    if err.is_no_such_key() {
        StoreError::NoSuchKey(key.to_string())
    } else {
        backend_error(err)
    }
}

/// Quiet bulk deletes only report failures; any failure fails the batch.
fn delete_outcome(errors: &[DeleteError], requested: usize) -> StoreResult<()> {
    match errors.first() {
        None => Ok(()),
        Some(first) => Err(StoreError::Backend(format!(
            "{} of {} keys failed to delete; first `{}`: {}",
            errors.len(),
            requested,
            first.key().unwrap_or_default(),
            first.message().unwrap_or("unknown error")
        ))),
    }
}

/// Entries without a key are dropped; a negative size reads as zero.
fn summary(obj: &Object) -> Option<ObjectSummary> {
    Some(ObjectSummary {
        key: obj.key()?.to_string(),
        size: obj.size().unwrap_or(0).max(0) as u64,
        last_modified: to_chrono(obj.last_modified()),
    })
}

fn list_page(output: &ListObjectsV2Output) -> ListPage {
    ListPage {
        contents: output.contents().iter().filter_map(summary).collect(),
        common_prefixes: output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect(),
        is_truncated: output.is_truncated().unwrap_or(false),
        next_continuation_token: output.next_continuation_token().map(str::to_string),
    }
}

#[async_trait]
impl ObjectStore for CosStore {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<String>) -> StoreResult<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type)
            .send()
            .await
            .map_err(backend_error)?;
        debug!(key, size, "put object");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectBody> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(err)) => return Err(get_failure(key, err.into_err())),
            Err(err) => return Err(backend_error(err)),
        };

        let content_type = output.content_type().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(backend_error)?
            .into_bytes();

        Ok(ObjectBody { body, content_type })
    }

    /// S3 DeleteObject already succeeds for absent keys.
    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
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

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend_error)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(backend_error)?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(backend_error)?;

        delete_outcome(output.errors(), keys.len())
    }

    async fn list(&self, request: ListRequest) -> StoreResult<ListPage> {
        let max_keys = request.max_keys.clamp(1, MAX_KEYS_PER_REQUEST) as i32;
        let prefix = (!request.prefix.is_empty()).then_some(request.prefix);

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix)
            .set_delimiter(request.delimiter)
            .set_continuation_token(request.continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(list_page(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::{
        error::ErrorMetadata,
        primitives::DateTime as SdkDateTime,
        types::{CommonPrefix, error::NoSuchKey},
    };

    #[test]
    fn only_no_such_key_is_a_missing_object() {
        let missing = GetObjectError::NoSuchKey(NoSuchKey::builder().build());
        assert!(matches!(
            get_failure("docs/a.txt", missing),
            StoreError::NoSuchKey(ref key) if key == "docs/a.txt"
        ));

        let denied = GetObjectError::generic(
            ErrorMetadata::builder()
                .code("AccessDenied")
                .message("denied")
                .build(),
        );
        assert!(matches!(
            get_failure("docs/a.txt", denied),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn quiet_delete_errors_fail_the_batch() {
        assert!(delete_outcome(&[], 3).is_ok());

        let errors = [
            DeleteError::builder()
                .key("docs/a")
                .code("AccessDenied")
                .message("denied")
                .build(),
            DeleteError::builder().key("docs/b").build(),
        ];
        match delete_outcome(&errors, 5) {
            Err(StoreError::Backend(msg)) => {
                assert!(msg.starts_with("2 of 5 keys failed"));
                assert!(msg.contains("`docs/a`: denied"));
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn list_output_converts_to_page() {
        let output = ListObjectsV2Output::builder()
            .contents(
                Object::builder()
                    .key("docs/a.txt")
                    .size(12)
                    .last_modified(SdkDateTime::from_secs(1_700_000_000))
                    .build(),
            )
            .contents(Object::builder().size(4).build())
            .contents(Object::builder().key("docs/b.txt").size(-1).build())
            .common_prefixes(CommonPrefix::builder().prefix("docs/img/").build())
            .is_truncated(true)
            .next_continuation_token("next-page")
            .build();

        let page = list_page(&output);
        assert_eq!(page.contents.len(), 2);
        assert_eq!(page.contents[0].key, "docs/a.txt");
        assert_eq!(page.contents[0].size, 12);
        assert_eq!(page.contents[0].last_modified.timestamp(), 1_700_000_000);
        assert_eq!(page.contents[1].size, 0);
        assert_eq!(page.contents[1].last_modified, DateTime::<Utc>::default());
        assert_eq!(page.common_prefixes, vec!["docs/img/"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("next-page"));
    }

    #[test]
    fn untruncated_output_has_no_next_page() {
        let page = list_page(&ListObjectsV2Output::builder().build());
        assert!(page.contents.is_empty());
        assert!(!page.is_truncated);
        assert!(page.next_continuation_token.is_none());
    }
}
