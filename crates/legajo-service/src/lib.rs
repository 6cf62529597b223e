//! # legajo-service
//!
//! The operation layer of the vault: logical tree mutations
//! ([`tree::TreeService`]), the transactional orchestrator coupling them
//! to physical storage ([`directory::DirectoryService`]), and byte
//! transfer in and out ([`transfer::UploadService`],
//! [`transfer::DownloadService`]).

pub mod acting_user;
pub mod directory;
pub mod transfer;
pub mod tree;

pub use acting_user::ActingUserResolver;
pub use directory::DirectoryService;
pub use transfer::{DownloadService, UploadService};
pub use tree::TreeService;
