use lockable_storage_core::StorageError;
use reqwest::Client as HttpClient;
use tracing::{debug, instrument};

/// Cloudflare KV REST API client.
///
/// Uses the Cloudflare API v4 to interact with a KV namespace.
pub struct KvClient {
    http_client: HttpClient,
    base_url: String,
    api_token: String,
}

impl KvClient {
    /// Create a new KV client.
    pub fn new(account_id: &str, namespace_id: &str, api_token: String) -> Self {
        let base_url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/storage/kv/namespaces/{}",
            account_id, namespace_id
        );
        Self::with_base_url(base_url, api_token)
    }

    /// Create a client against an explicit namespace URL (e.g. a local mock).
    pub fn with_base_url(base_url: impl Into<String>, api_token: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn value_url(&self, key: &str) -> String {
        format!("{}/values/{}", self.base_url, urlencoding::encode(key))
    }

    /// Get a value from KV.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let response = self
            .http_client
            .get(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("KV GET request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("KV key not found: {}", key);
            return Ok(None);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Io(format!(
                "KV GET failed with status {}: {}",
                status, text
            )));
        }

        // KV GET returns raw value, not JSON-wrapped
        let value = response
            .text()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read KV response: {}", e)))?;

        debug!("KV GET {} ({} bytes)", key, value.len());
        Ok(Some(value))
    }

    /// Put a value to KV, optionally letting KV expire it after `expiration_ttl` seconds.
    ///
    /// KV rejects TTLs below 60 seconds.
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn put(
        &self,
        key: &str,
        value: &str,
        expiration_ttl: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .http_client
            .put(self.value_url(key))
            .bearer_auth(&self.api_token)
            .header("Content-Type", "text/plain")
            .body(value.to_string());
        if let Some(ttl) = expiration_ttl {
            request = request.query(&[("expiration_ttl", ttl)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("KV PUT request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Io(format!(
                "KV PUT failed with status {}: {}",
                status, text
            )));
        }

        debug!("KV PUT {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Delete a value from KV. Returns false if the key did not exist.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let response = self
            .http_client
            .delete(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| StorageError::Io(format!("KV DELETE request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Io(format!(
                "KV DELETE failed with status {}: {}",
                status, text
            )));
        }

        debug!("KV DELETE {}", key);
        Ok(true)
    }
}
