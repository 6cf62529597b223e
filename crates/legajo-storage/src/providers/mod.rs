//! Physical storage backend implementations.

use std::sync::Arc;

use legajo_core::config::StorageConfig;
use legajo_core::error::AppError;
use legajo_core::result::AppResult;

use crate::backend::StorageBackend;

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

pub use local::LocalBackend;
#[cfg(feature = "s3")]
pub use s3::S3Backend;

/// Build the configured backend. The choice is fixed for the lifetime of
/// the returned handle; switching media means building a new one.
pub async fn backend_from_config(config: &StorageConfig) -> AppResult<Arc<dyn StorageBackend>> {
    match config.backend.as_str() {
        "local" => Ok(Arc::new(LocalBackend::new(&config.local.root_path).await?)),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(S3Backend::new(&config.s3).await?)),
        #[cfg(not(feature = "s3"))]
        "s3" => Err(AppError::configuration(
            "Backend 's3' requires the 's3' feature",
        )),
        other => Err(AppError::configuration(format!(
            "Unknown storage backend: '{other}'"
        ))),
    }
}
