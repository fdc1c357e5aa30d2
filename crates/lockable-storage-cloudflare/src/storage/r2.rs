use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use lockable_storage_core::{StorageBackend, StorageError};
use tracing::{debug, instrument};

/// R2 storage backend using Cloudflare R2 (S3-compatible).
///
/// Storage layout in R2:
/// ```text
/// {bucket}/
///   {prefix}/{path}       # payload, UTF-8
/// ```
///
/// Paths are used as object keys verbatim (after the optional prefix). Deleting a missing
/// object is a no-op on the S3 API, which gives idempotent `delete` for free.
#[derive(Clone)]
pub struct R2Storage {
    s3_client: S3Client,
    bucket_name: String,
    prefix: Option<String>,
}

impl R2Storage {
    /// Create a new R2Storage backend.
    pub fn new(s3_client: S3Client, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
            prefix: None,
        }
    }

    /// Store every payload under `prefix/` in the bucket.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Get the S3 key for a path.
    fn object_key(&self, path: &str) -> Result<String, StorageError> {
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("path must not be empty".to_string()));
        }
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        })
    }
}

#[async_trait]
impl StorageBackend for R2Storage {
    fn backend_name(&self) -> &'static str {
        "r2"
    }

    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError> {
        let key = self.object_key(path)?;
        self.s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type("text/plain; charset=utf-8")
            .body(ByteStream::from(data.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("R2 put_object error: {}", e)))?;

        debug!("Wrote {} ({} bytes)", key, data.len());
        Ok(())
    }

    #[instrument(skip(self, default), level = "debug")]
    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError> {
        let key = self.object_key(path)?;
        let result = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    debug!("{} not found, using default", key);
                    return Ok(default.to_string());
                }
                return Err(StorageError::Io(format!(
                    "R2 get_object error: {}",
                    service_error
                )));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read R2 object body: {}", e)))?
            .into_bytes();
        let data = String::from_utf8(bytes.to_vec()).map_err(|e| {
            StorageError::Serialization(format!("{} is not valid UTF-8: {}", key, e))
        })?;

        debug!("Read {} ({} bytes)", key, data.len());
        Ok(data)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let key = self.object_key(path)?;
        self.s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("R2 delete_object error: {}", e)))?;

        debug!("Deleted {}", key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.object_key(path)?;
        match self
            .s3_client
            .head_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Io(format!(
                        "R2 head_object error: {}",
                        service_error
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::Region;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials};

    fn client() -> S3Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(Credentials::new("id", "secret", None, None, "test"))
            .region(Region::new("auto"))
            .endpoint_url("http://127.0.0.1:1")
            .force_path_style(true)
            .build();
        S3Client::from_conf(config)
    }

    #[test]
    fn test_object_key() {
        let storage = R2Storage::new(client(), "bucket".to_string());
        assert_eq!(storage.object_key("a/b.json").unwrap(), "a/b.json");

        let storage = storage.with_prefix("/tenants/acme/");
        assert_eq!(storage.object_key("a/b.json").unwrap(), "tenants/acme/a/b.json");

        let err = storage.object_key("").unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_prefix_is_ignored() {
        let storage = R2Storage::new(client(), "bucket".to_string()).with_prefix("/");
        assert_eq!(storage.object_key("k").unwrap(), "k");
    }
}
