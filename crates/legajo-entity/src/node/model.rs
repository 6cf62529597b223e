//! The polymorphic node entity: a folder or file in the logical tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Whether a node is a folder or a file. Fixed at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NodeType {
    /// A folder; the only node type that can have children.
    Folder,
    /// A file; always a leaf.
    File,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Lifecycle state of a node, derived from its soft-delete marker.
///
/// Purged nodes have no row at all, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Live node, visible to normal reads.
    Active,
    /// Soft-deleted node pending restore or purge.
    Trashed,
}

/// Which node states a read path includes.
///
/// Every repository read takes one of these explicitly; there is no
/// implicit soft-delete scoping anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeStates {
    /// Only nodes with `deleted_at IS NULL`.
    ActiveOnly,
    /// Only nodes with `deleted_at IS NOT NULL`.
    TrashedOnly,
    /// All rows regardless of the soft-delete marker.
    All,
}

/// A node in the logical tree, backed by one row of the `nodes` table.
///
/// The `hash` is assigned at creation and never changes; it is the sole
/// key into physical storage, which is why moves and renames touch only
/// the `path` column.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Node {
    /// Unique node identifier.
    pub id: i64,
    /// Folder or file.
    pub node_type: NodeType,
    /// Display name (last path segment).
    pub name: String,
    /// Full slash-separated logical path, unique among active nodes.
    pub path: String,
    /// Immutable physical-storage key component.
    pub hash: Uuid,
    /// Size in bytes (0 for folders).
    pub size: i64,
    /// Lower-cased file extension (files only).
    pub extension: Option<String>,
    /// Owning user.
    pub owner_id: Option<i64>,
    /// Creating user.
    pub created_by: Option<i64>,
    /// Access level reference.
    pub access_level_id: Option<i64>,
    /// Security level reference.
    pub security_level_id: Option<i64>,
    /// Whether the node shows up in normal listings.
    pub is_visible: bool,
    /// Whether the node may be deleted by non-privileged users.
    pub is_erasable: bool,
    /// Free-text description.
    pub description: Option<String>,
    /// Nested-set left bound.
    pub lft: i64,
    /// Nested-set right bound.
    pub rgt: i64,
    /// Direct parent node (None for roots).
    pub parent_id: Option<i64>,
    /// Soft-delete marker; `Some` means trashed.
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Whether this node is a folder.
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    /// Whether this node is a file.
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        if self.deleted_at.is_some() {
            NodeState::Trashed
        } else {
            NodeState::Active
        }
    }

    /// Whether `other` lies strictly inside this node's nested-set range.
    pub fn contains(&self, other: &Node) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    /// Whether this node lies strictly inside `other`'s nested-set range.
    pub fn is_descendant_of(&self, other: &Node) -> bool {
        other.contains(self)
    }

    /// Width of the nested-set range (2 for a leaf).
    pub fn subtree_width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// Number of descendants implied by the nested-set range.
    pub fn descendant_count(&self) -> i64 {
        (self.rgt - self.lft - 1) / 2
    }
}

/// Data required to insert a new node row.
///
/// Bounds are computed by the tree service before insertion; the
/// repository never invents them.
#[derive(Debug, Clone)]
pub struct NewNode {
    /// Folder or file.
    pub node_type: NodeType,
    /// Display name.
    pub name: String,
    /// Full logical path.
    pub path: String,
    /// Physical-storage key component, generated at creation.
    pub hash: Uuid,
    /// Size in bytes (0 for folders).
    pub size: i64,
    /// Lower-cased extension (files only).
    pub extension: Option<String>,
    /// Owning user.
    pub owner_id: Option<i64>,
    /// Creating user.
    pub created_by: Option<i64>,
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
    /// Direct parent node.
    pub parent_id: Option<i64>,
    /// Nested-set left bound.
    pub lft: i64,
    /// Nested-set right bound.
    pub rgt: i64,
}
