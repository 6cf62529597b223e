//! Optional per-call node attributes with inheritance defaults.

use serde::{Deserialize, Serialize};

use super::model::Node;

/// Caller-supplied attribute overrides for node creation.
///
/// Resolution order for every field: explicit value here → the parent
/// folder's value → the system default. Resolution happens once at the
/// start of each operation via [`NodeAttributes::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Owning user override.
    pub owner_id: Option<i64>,
    /// Access level override.
    pub access_level_id: Option<i64>,
    /// Security level override.
    pub security_level_id: Option<i64>,
    /// Visibility override (default: visible).
    pub is_visible: Option<bool>,
    /// Erasability override (default: erasable).
    pub is_erasable: Option<bool>,
    /// Free-text description.
    pub description: Option<String>,
}

/// Fully resolved attributes ready for insertion.
#[derive(Debug, Clone)]
pub struct ResolvedAttributes {
    /// Owning user.
    pub owner_id: Option<i64>,
    /// Access level reference.
    pub access_level_id: Option<i64>,
    /// Security level reference.
    pub security_level_id: Option<i64>,
    /// Visibility flag.
    pub is_visible: bool,
    /// Erasability flag.
    pub is_erasable: bool,
    /// Free-text description.
    pub description: Option<String>,
}

impl NodeAttributes {
    /// Owner override shorthand.
    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Description shorthand.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resolve against the parent folder's attributes and system defaults.
    pub fn resolve(&self, parent: Option<&Node>) -> ResolvedAttributes {
        ResolvedAttributes {
            owner_id: self.owner_id.or_else(|| parent.and_then(|p| p.owner_id)),
            access_level_id: self
                .access_level_id
                .or_else(|| parent.and_then(|p| p.access_level_id)),
            security_level_id: self
                .security_level_id
                .or_else(|| parent.and_then(|p| p.security_level_id)),
            is_visible: self.is_visible.unwrap_or(true),
            is_erasable: self.is_erasable.unwrap_or(true),
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::model::{NodeType, Node};
    use chrono::Utc;
    use uuid::Uuid;

    fn parent() -> Node {
        Node {
            id: 1,
            node_type: NodeType::Folder,
            name: "hr".into(),
            path: "hr".into(),
            hash: Uuid::new_v4(),
            size: 0,
            extension: None,
            owner_id: Some(7),
            created_by: Some(7),
            access_level_id: Some(2),
            security_level_id: Some(3),
            is_visible: true,
            is_erasable: true,
            description: None,
            lft: 1,
            rgt: 2,
            parent_id: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn explicit_value_wins_over_parent() {
        let attrs = NodeAttributes {
            access_level_id: Some(9),
            ..Default::default()
        };
        let resolved = attrs.resolve(Some(&parent()));
        assert_eq!(resolved.access_level_id, Some(9));
        assert_eq!(resolved.security_level_id, Some(3));
        assert_eq!(resolved.owner_id, Some(7));
    }

    #[test]
    fn system_defaults_apply_without_parent() {
        let resolved = NodeAttributes::default().resolve(None);
        assert!(resolved.is_visible);
        assert!(resolved.is_erasable);
        assert_eq!(resolved.owner_id, None);
    }
}
