use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use lockable_storage_core::{LockBackend, StorageError};
use tracing::{debug, instrument};

use super::record::LockData;

/// Key prefix used when none is configured.
const DEFAULT_LOCK_PREFIX: &str = "locks";

/// R2-based lock backend using conditional writes.
///
/// Lock objects: `{bucket}/{prefix}/{path}.lock`
///
/// A lock is created with `If-None-Match: *`, so exactly one of several racing callers gets
/// it. An expired or unreadable record is replaced with `If-Match: <etag>` of the record that
/// was judged expired; if anyone replaced or removed it in between, the write is refused and
/// `lock` returns false.
#[derive(Clone)]
pub struct R2Lock {
    s3_client: S3Client,
    bucket_name: String,
    prefix: String,
    lease: Option<Duration>,
}

/// A lock object as read back from the bucket.
struct StoredLock {
    live: bool,
    e_tag: Option<String>,
}

/// Whether the request was refused because the object changed under us.
fn lost_race<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|response| matches!(response.status().as_u16(), 404 | 409 | 412))
}

impl R2Lock {
    /// Create a new R2Lock storing lock objects under `locks/`. Locks never expire.
    pub fn new(s3_client: S3Client, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
            prefix: DEFAULT_LOCK_PREFIX.to_string(),
            lease: None,
        }
    }

    /// Store lock objects under `prefix/` instead.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Expire every lock `lease` after it was taken.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Get the S3 key for a lock.
    fn lock_key(&self, path: &str) -> Result<String, StorageError> {
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("path must not be empty".to_string()));
        }
        Ok(if self.prefix.is_empty() {
            format!("{}.lock", path)
        } else {
            format!("{}/{}.lock", self.prefix, path)
        })
    }

    fn record_body(&self) -> Result<ByteStream, StorageError> {
        let lock_json = serde_json::to_vec(&LockData::new(self.lease)).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize lock data: {}", e))
        })?;
        Ok(ByteStream::from(lock_json))
    }

    /// Create the lock object if absent. Returns false if it already exists.
    async fn create(&self, key: &str) -> Result<bool, StorageError> {
        let result = self
            .s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .if_none_match("*")
            .content_type("application/json")
            .body(self.record_body()?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if lost_race(&e) => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "R2 put_object error: {}",
                e.into_service_error()
            ))),
        }
    }

    /// Overwrite the lock object only if it still has `e_tag`.
    async fn replace(&self, key: &str, e_tag: &str) -> Result<bool, StorageError> {
        let result = self
            .s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .if_match(e_tag)
            .content_type("application/json")
            .body(self.record_body()?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if lost_race(&e) => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "R2 put_object error: {}",
                e.into_service_error()
            ))),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredLock>, StorageError> {
        let result = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StorageError::Io(format!(
                    "R2 get_object error: {}",
                    service_error
                )));
            }
        };

        let e_tag = output.e_tag().map(str::to_string);
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read R2 lock body: {}", e)))?
            .into_bytes();
        let live = LockData::is_live_record(key, &String::from_utf8_lossy(&bytes));
        Ok(Some(StoredLock { live, e_tag }))
    }
}

#[async_trait]
impl LockBackend for R2Lock {
    fn lock_type(&self) -> &'static str {
        "r2"
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.lock_key(path)?;

        if self.create(&key).await? {
            debug!("Acquired lock on {} (lease: {:?})", path, self.lease);
            return Ok(true);
        }

        match self.fetch(&key).await? {
            Some(StoredLock { live: true, .. }) => {
                debug!("Lock on {} is held", path);
                Ok(false)
            }
            Some(StoredLock {
                live: false,
                e_tag: Some(e_tag),
            }) => {
                let acquired = self.replace(&key, &e_tag).await?;
                debug!("Reclaim expired lock on {}: acquired={}", path, acquired);
                Ok(acquired)
            }
            Some(StoredLock { e_tag: None, .. }) => Err(StorageError::Io(format!(
                "R2 returned no ETag for lock {}",
                key
            ))),
            // Released between our two calls
            None => {
                let acquired = self.create(&key).await?;
                debug!("Second attempt on {}: acquired={}", path, acquired);
                Ok(acquired)
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.lock_key(path)?;
        let Some(stored) = self.fetch(&key).await? else {
            debug!("Lock on {} not found for release", path);
            return Ok(false);
        };

        self.s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("R2 delete_object error: {}", e)))?;

        debug!("Unlock {}: held={}", path, stored.live);
        Ok(stored.live)
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.lock_key(path)?;
        Ok(self.fetch(&key).await?.is_some_and(|stored| stored.live))
    }
}
