//! # legajo-entity
//!
//! Domain entity models for Legajo: the polymorphic [`node::Node`] of the
//! logical file tree and the trash side-channel records.

pub mod node;
pub mod trash;
