//! Repository implementations.

pub mod node;

pub use node::NodeRepository;
