//! Filter options for folder-contents listings and subtree search.

use serde::{Deserialize, Serialize};

use super::model::NodeType;

/// Filters applied to contents listings and search.
///
/// All fields are conjunctive; `None` means "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Restrict to visible nodes.
    #[serde(default)]
    pub visible_only: bool,
    /// Restrict to one node type.
    pub node_type: Option<NodeType>,
    /// Free-text term matched against name, description and path.
    pub search: Option<String>,
    /// Access level constraint.
    pub access_level_id: Option<i64>,
    /// Security level constraint.
    pub security_level_id: Option<i64>,
    /// Extension constraint (matched lower-cased).
    pub extension: Option<String>,
    /// Owner constraint.
    pub owner_id: Option<i64>,
    /// Creator constraint.
    pub created_by: Option<i64>,
}

impl NodeFilter {
    /// Filter restricted to one node type.
    pub fn of_type(node_type: NodeType) -> Self {
        Self {
            node_type: Some(node_type),
            ..Default::default()
        }
    }
}
