//! Shared plain types used across the workspace.

pub mod pagination;
pub mod sorting;

pub use pagination::PageRequest;
pub use sorting::{SortDirection, SortField};
