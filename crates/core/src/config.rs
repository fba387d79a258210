//! Configuration types shared across crates.

use crate::topology::{ShardAccount, ShardedTopology, ShardingAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Namespaces the server will open databases for before rejecting new ones.
    #[serde(default = "default_max_namespaces")]
    pub max_namespaces: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_max_namespaces() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_body_bytes: default_max_body_bytes(),
            max_namespaces: default_max_namespaces(),
        }
    }
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage. Contents are lost on restart.
    Memory,
    /// Local filesystem storage (single node only).
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the default credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs. Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem config requires a path".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// One storage account in a sharded topology and the backend that holds it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account: ShardAccount,
    pub storage: StorageConfig,
}

/// Sharded blob metadata layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Isolation prefix shared by every key in this deployment.
    #[serde(default = "default_universe")]
    pub universe: String,
    /// Default namespace for records.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub algorithm: ShardingAlgorithm,
    pub accounts: Vec<AccountConfig>,
    /// Namespaces that always use the non-sharding account.
    #[serde(default)]
    pub non_sharding_namespaces: Vec<String>,
}

fn default_universe() -> String {
    "default".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

impl TopologyConfig {
    /// A single in-memory account. Useful for tests and local development.
    pub fn single_memory_account() -> Self {
        Self {
            universe: default_universe(),
            namespace: default_namespace(),
            algorithm: ShardingAlgorithm::JumpHash,
            accounts: vec![AccountConfig {
                account: ShardAccount::sharding("memo", 0, "meta"),
                storage: StorageConfig::Memory,
            }],
            non_sharding_namespaces: Vec::new(),
        }
    }

    /// Build the routing table for `namespace` under this layout.
    pub fn build(&self, namespace: &str) -> crate::Result<ShardedTopology> {
        ShardedTopology::new(
            self.universe.clone(),
            namespace.to_string(),
            self.algorithm,
            self.accounts.iter().map(|a| a.account.clone()).collect(),
            self.non_sharding_namespaces.iter().cloned(),
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        for account in &self.accounts {
            account
                .storage
                .validate()
                .map_err(|e| format!("account {}: {e}", account.account))?;
        }
        self.build(&self.namespace).map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Where metadata records live.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataBackendConfig {
    /// Records stored directly as blobs in sharded storage accounts.
    Blob(TopologyConfig),
    /// Records held by a remote build-cache service.
    Remote {
        /// Base URL of the service (e.g., "http://cache.internal:8080").
        base_url: String,
        #[serde(default = "default_namespace")]
        namespace: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_remote_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_remote_timeout_secs() -> u64 {
    30
}

impl Default for MetadataBackendConfig {
    fn default() -> Self {
        Self::Blob(TopologyConfig::single_memory_account())
    }
}

impl MetadataBackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataBackendConfig::Blob(topology) => topology.validate(),
            MetadataBackendConfig::Remote {
                base_url,
                timeout_secs,
                ..
            } => {
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    return Err(format!(
                        "remote metadata base_url must be http(s), got {base_url:?}"
                    ));
                }
                if *timeout_secs == 0 {
                    return Err("remote metadata timeout_secs must be positive".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Retention and retry behaviour of the memoization database.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoizationConfig {
    /// How long content stays alive after a pin. `None` disables preventive pinning.
    #[serde(default = "default_retention_policy_secs")]
    pub retention_policy_secs: Option<u64>,
    /// Skip preventive pinning even if a retention policy is set.
    #[serde(default)]
    pub disable_preventive_pinning: bool,
    /// Attempts at a value-level update before giving up on version races.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Retries of a backend call that failed with a transient error.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    /// Base delay for exponential backoff between transient retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single backend call.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Maximum pins in flight for one record refresh.
    #[serde(default = "default_pin_concurrency")]
    pub pin_concurrency: usize,
    /// TTL of the in-process read cache. `None` disables it.
    #[serde(default)]
    pub local_cache_ttl_secs: Option<u64>,
    /// Entries the read cache holds before expired ones are swept.
    #[serde(default = "default_local_cache_max_entries")]
    pub local_cache_max_entries: usize,
}

fn default_retention_policy_secs() -> Option<u64> {
    Some(86_400) // 1 day
}

fn default_max_conflict_retries() -> u32 {
    5
}

fn default_transient_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_pin_concurrency() -> usize {
    16
}

fn default_local_cache_max_entries() -> usize {
    10_000
}

impl Default for MemoizationConfig {
    fn default() -> Self {
        Self {
            retention_policy_secs: default_retention_policy_secs(),
            disable_preventive_pinning: false,
            max_conflict_retries: default_max_conflict_retries(),
            transient_retries: default_transient_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            operation_timeout_secs: default_operation_timeout_secs(),
            pin_concurrency: default_pin_concurrency(),
            local_cache_ttl_secs: None,
            local_cache_max_entries: default_local_cache_max_entries(),
        }
    }
}

impl MemoizationConfig {
    /// Effective retention window, if preventive pinning is on.
    pub fn retention_policy(&self) -> Option<Duration> {
        if self.disable_preventive_pinning {
            return None;
        }
        self.retention_policy_secs
            .map(|secs| Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn local_cache_ttl(&self) -> Option<std::time::Duration> {
        self.local_cache_ttl_secs.map(std::time::Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(secs) = self.retention_policy_secs
            && (secs == 0 || secs > i64::MAX as u64)
        {
            return Err(format!(
                "memoization.retention_policy_secs {secs} must be between 1 and {}",
                i64::MAX
            ));
        }
        if self.max_conflict_retries == 0 {
            return Err("memoization.max_conflict_retries must be at least 1".to_string());
        }
        if self.operation_timeout_secs == 0 {
            return Err("memoization.operation_timeout_secs must be positive".to_string());
        }
        if self.pin_concurrency == 0 {
            return Err("memoization.pin_concurrency must be at least 1".to_string());
        }
        if self.local_cache_ttl_secs.is_some() && self.local_cache_max_entries == 0 {
            return Err("memoization.local_cache_max_entries must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata record storage.
    #[serde(default)]
    pub metadata: MetadataBackendConfig,
    /// Retention and retry policy.
    #[serde(default)]
    pub memoization: MemoizationConfig,
    /// Content blob storage used for pinning and materialization.
    #[serde(default)]
    pub content: StorageConfig,
}

impl AppConfig {
    /// Create a test configuration with in-memory backends.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            metadata: MetadataBackendConfig::Blob(TopologyConfig::single_memory_account()),
            memoization: MemoizationConfig::default(),
            content: StorageConfig::Memory,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_namespaces == 0 {
            return Err("server.max_namespaces must be at least 1".to_string());
        }
        self.metadata.validate()?;
        self.memoization.validate()?;
        self.content.validate()
    }
}
