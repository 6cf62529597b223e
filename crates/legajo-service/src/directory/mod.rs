//! Directory orchestration.

pub mod service;

pub use service::{
    BatchCreateFailure, BatchCreateOutcome, ConsistencyIssue, ConsistencyReport, DirectoryInfo,
    DirectoryService, DirectorySpec,
};
