//! Trash side-channel records.
//!
//! Every trashed item carries one metadata document keyed by the node's
//! hash (`trash/metadata/{hash}.json` on disk, an object-metadata map on
//! S3) so that restoration is possible without the logical database row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::model::{Node, NodeType};

/// Metadata written next to a trashed item's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashMetadata {
    /// Canonical key the payload occupied before trashing.
    pub original_path: String,
    /// When the item was trashed.
    pub deleted_at: DateTime<Utc>,
    /// Logical node id.
    pub node_id: i64,
    /// Logical path at deletion time.
    pub node_path: String,
    /// Display name at deletion time.
    pub node_name: String,
    /// Folder or file.
    pub node_type: NodeType,
    /// User who performed the deletion.
    pub deleted_by: Option<i64>,
    /// Parent node at deletion time.
    pub parent_id: Option<i64>,
    /// Size in bytes.
    pub size: i64,
    /// Lower-cased extension (files only).
    pub extension: Option<String>,
    /// Descendant count at deletion time (folders only).
    pub children_count: Option<i64>,
}

impl TrashMetadata {
    /// Build metadata for a node about to be trashed.
    pub fn for_node(node: &Node, original_key: &str, deleted_by: Option<i64>) -> Self {
        Self {
            original_path: original_key.to_string(),
            deleted_at: Utc::now(),
            node_id: node.id,
            node_path: node.path.clone(),
            node_name: node.name.clone(),
            node_type: node.node_type,
            deleted_by,
            parent_id: node.parent_id,
            size: node.size,
            extension: node.extension.clone(),
            children_count: if node.is_folder() {
                Some(node.descendant_count())
            } else {
                None
            },
        }
    }
}

/// One entry returned by trash enumeration, payload key merged with its
/// metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashItem {
    /// Node hash the trash entry is keyed by.
    pub hash: Uuid,
    /// Key of the payload inside the trash namespace.
    pub trash_key: String,
    /// Side-channel metadata, if the document was readable.
    pub metadata: Option<TrashMetadata>,
}
