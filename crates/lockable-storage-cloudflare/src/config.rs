use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aws_config::Region;
use aws_sdk_s3::config::{BehaviorVersion, Credentials};
use clap::{Parser, ValueEnum};
use lockable_storage_cloudflare::{KvClient, KvLock, R2Lock, R2Storage};
use lockable_storage_core::cli::Command;
use lockable_storage_core::{LockBackend, LockableStorageManager, ManagerConfig};

/// Where lock records live.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Objects in the R2 bucket, taken with conditional writes
    R2,
    /// Workers KV keys. Not atomic: racing callers can both acquire
    Kv,
}

/// Configuration for the lockable-storage-cloudflare command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "lockable-storage-cloudflare")]
#[command(about = "Read, write and lock paths on Cloudflare R2 and KV")]
pub struct Config {
    /// Cloudflare account ID
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID", global = true)]
    pub cloudflare_account_id: Option<String>,

    /// Cloudflare API token (needs KV permissions)
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", global = true, hide_env_values = true)]
    pub cloudflare_api_token: Option<String>,

    /// R2 bucket name for payloads
    #[arg(long, env = "R2_BUCKET_NAME", global = true)]
    pub r2_bucket_name: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, env = "R2_PREFIX", global = true)]
    pub r2_prefix: Option<String>,

    /// R2 access key ID (for S3-compatible API)
    #[arg(long, env = "R2_ACCESS_KEY_ID", global = true)]
    pub r2_access_key_id: Option<String>,

    /// R2 secret access key (for S3-compatible API)
    #[arg(long, env = "R2_SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    /// Lock backend
    #[arg(long, env = "LOCK_BACKEND", value_enum, default_value_t = LockKind::R2, global = true)]
    pub lock_backend: LockKind,

    /// Key prefix for lock objects in the bucket (r2 lock backend)
    #[arg(long, env = "R2_LOCK_PREFIX", default_value = "locks", global = true)]
    pub r2_lock_prefix: String,

    /// KV namespace ID for lock records (kv lock backend)
    #[arg(long, env = "KV_NAMESPACE_ID", global = true)]
    pub kv_namespace_id: Option<String>,

    /// Expire locks this many seconds after they are taken
    #[arg(long, env = "LOCK_LEASE_SECS", global = true)]
    pub lock_lease_secs: Option<u64>,

    /// Run without the R2 storage backend
    #[arg(long, global = true)]
    pub no_storage: bool,

    /// Run without a lock backend
    #[arg(long, global = true)]
    pub no_lock: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> anyhow::Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("--{} is required", flag))
}

impl Config {
    /// Get the R2 endpoint URL for S3-compatible API.
    pub fn r2_endpoint(&self) -> anyhow::Result<String> {
        Ok(format!(
            "https://{}.r2.cloudflarestorage.com",
            required(&self.cloudflare_account_id, "cloudflare-account-id")?
        ))
    }

    fn s3_client(&self) -> anyhow::Result<aws_sdk_s3::Client> {
        let credentials = Credentials::new(
            required(&self.r2_access_key_id, "r2-access-key-id")?,
            required(&self.r2_secret_access_key, "r2-secret-access-key")?,
            None,
            None,
            "r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .endpoint_url(self.r2_endpoint()?)
            .force_path_style(true)
            .build();

        Ok(aws_sdk_s3::Client::from_conf(s3_config))
    }

    fn r2_storage(&self) -> anyhow::Result<R2Storage> {
        let mut storage = R2Storage::new(
            self.s3_client()?,
            required(&self.r2_bucket_name, "r2-bucket-name")?.to_string(),
        );
        if let Some(prefix) = &self.r2_prefix {
            storage = storage.with_prefix(prefix.as_str());
        }
        Ok(storage)
    }

    fn kv_lock(&self) -> anyhow::Result<KvLock> {
        let kv_client = Arc::new(KvClient::new(
            required(&self.cloudflare_account_id, "cloudflare-account-id")?,
            required(&self.kv_namespace_id, "kv-namespace-id")?,
            required(&self.cloudflare_api_token, "cloudflare-api-token")?.to_string(),
        ));
        let mut lock = KvLock::new(kv_client);
        if let Some(secs) = self.lock_lease_secs {
            lock = lock.with_lease(Duration::from_secs(secs));
        }
        Ok(lock)
    }

    fn r2_lock(&self) -> anyhow::Result<R2Lock> {
        let mut lock = R2Lock::new(
            self.s3_client()?,
            required(&self.r2_bucket_name, "r2-bucket-name")?.to_string(),
        )
        .with_prefix(self.r2_lock_prefix.as_str());
        if let Some(secs) = self.lock_lease_secs {
            lock = lock.with_lease(Duration::from_secs(secs));
        }
        Ok(lock)
    }

    fn lock(&self) -> anyhow::Result<Arc<dyn LockBackend>> {
        let lock: Arc<dyn LockBackend> = match self.lock_backend {
            LockKind::R2 => Arc::new(self.r2_lock()?),
            LockKind::Kv => Arc::new(self.kv_lock()?),
        };
        Ok(lock)
    }

    /// Build the facade, requiring only the settings of the enabled backends.
    pub fn build_manager(&self) -> anyhow::Result<LockableStorageManager> {
        let mut config = ManagerConfig::default();
        if !self.no_storage {
            config = config.with_storage(Arc::new(self.r2_storage()?));
        }
        if !self.no_lock {
            config = config.with_lock(self.lock()?);
        }
        Ok(LockableStorageManager::new(config))
    }
}
