//! Node entity: model, state, and creation attributes.

pub mod attributes;
pub mod filter;
pub mod model;

pub use attributes::{NodeAttributes, ResolvedAttributes};
pub use filter::NodeFilter;
pub use model::{IncludeStates, NewNode, Node, NodeState, NodeType};
