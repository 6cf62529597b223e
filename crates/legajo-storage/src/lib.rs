//! # legajo-storage
//!
//! Physical storage for Legajo's flat-hash layout: the [`backend::StorageBackend`]
//! capability trait, canonical key derivation, the local-disk and S3
//! implementations, and [`service::StorageService`], the uniform
//! error-handling wrapper everything above this crate talks to.

pub mod backend;
pub mod keys;
pub mod providers;
pub mod service;

pub use backend::StorageBackend;
pub use providers::backend_from_config;
pub use service::{StorageService, SyncFailure, SyncReport};
