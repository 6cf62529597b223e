//! Canonical key derivation for the flat-hash physical layout.
//!
//! Every physical key is derived solely from a node's immutable hash (and
//! extension, for files). Logical renames and moves therefore never touch
//! physical storage.

use uuid::Uuid;

use legajo_entity::node::Node;

/// Prefix for file payloads.
pub const FILES_PREFIX: &str = "files";
/// Prefix for folder markers.
pub const FOLDERS_PREFIX: &str = "folders";
/// Prefix for the trash namespace.
pub const TRASH_PREFIX: &str = "trash";
/// Prefix for trash metadata documents.
pub const TRASH_METADATA_PREFIX: &str = "trash/metadata";

/// Canonical key for a node: `folders/{hash}` or `files/{hash}.{ext}`.
pub fn canonical_key(node: &Node) -> String {
    if node.is_folder() {
        format!("{FOLDERS_PREFIX}/{}", node.hash)
    } else {
        file_key(node.hash, node.extension.as_deref())
    }
}

/// Canonical key for a file from its hash and extension.
pub fn file_key(hash: Uuid, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{FILES_PREFIX}/{hash}.{ext}"),
        _ => format!("{FILES_PREFIX}/{hash}"),
    }
}

/// Trash mirror of the canonical key: `trash/{canonical}`.
pub fn trash_key(node: &Node) -> String {
    format!("{TRASH_PREFIX}/{}", canonical_key(node))
}

/// Key of the metadata document for a trashed node.
pub fn trash_metadata_key(hash: Uuid) -> String {
    format!("{TRASH_METADATA_PREFIX}/{hash}.json")
}

/// Extract the node hash from a key whose final segment is
/// `{hash}[.suffix]`, e.g. a trash payload key.
pub fn hash_from_key(key: &str) -> Option<Uuid> {
    let stem = key.rsplit('/').next()?;
    let stem = stem.split('.').next()?;
    Uuid::parse_str(stem).ok()
}
