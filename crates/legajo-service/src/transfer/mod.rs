//! Byte transfer in and out of the vault.

pub mod download;
pub mod mime;
pub mod upload;

pub use download::{DownloadResult, DownloadService};
pub use upload::{BatchUploadError, UploadService};
