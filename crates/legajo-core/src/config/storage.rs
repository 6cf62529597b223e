//! Physical storage configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use: `"local"` or `"s3"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Emit debug-level traces for every backend call.
    #[serde(default)]
    pub verbose_logging: bool,
    /// Days a trashed item is kept before `empty_trash` may purge it.
    #[serde(default = "default_trash_retention")]
    pub trash_retention_days: u32,
    /// Page size for batch directory synchronization.
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: u32,
    /// Local filesystem backend configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
    /// S3-compatible backend configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            verbose_logging: false,
            trash_retention_days: default_trash_retention(),
            sync_page_size: default_sync_page_size(),
            local: LocalStorageConfig::default(),
            s3: S3StorageConfig::default(),
        }
    }
}

/// Local filesystem backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root path for the flat-hash layout (`files/`, `folders/`, `trash/`).
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3StorageConfig {
    /// S3 endpoint URL (for non-AWS services like MinIO or R2).
    #[serde(default)]
    pub endpoint: String,
    /// Region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_trash_retention() -> u32 {
    30
}

fn default_sync_page_size() -> u32 {
    100
}

fn default_local_root() -> String {
    "./data/storage".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
