//! # legajo-database
//!
//! SQLite connection management, embedded migrations, and the node
//! repository. This crate owns every SQL statement in the workspace;
//! nested-set bound arithmetic in particular never leaks above it as
//! anything other than named primitives.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
