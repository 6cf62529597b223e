//! # legajo-core
//!
//! Core crate for Legajo. Contains configuration schemas, domain events,
//! collaborator traits, pagination/sorting types, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other Legajo crates.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
