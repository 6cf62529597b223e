//! Logical tree service and name hygiene.

pub mod sanitize;
pub mod service;

pub use service::{
    ContentsOptions, CreatedFile, CreatedPath, DeleteOutcome, FolderContents, MoveOutcome,
    TreeService,
};
