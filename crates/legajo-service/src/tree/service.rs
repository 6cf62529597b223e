//! Logical tree operations over the node repository.
//!
//! Everything here takes a `&mut SqliteConnection`; the orchestrator owns
//! the transaction and passes its connection down, so a multi-step tree
//! mutation either commits whole or rolls back whole. This service is the
//! only component that sequences the repository's nested-set primitives.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use uuid::Uuid;

use legajo_core::error::AppError;
use legajo_core::result::AppResult;
use legajo_core::types::pagination::PageRequest;
use legajo_core::types::sorting::SortField;
use legajo_database::repositories::NodeRepository;
use legajo_entity::node::{
    IncludeStates, NewNode, Node, NodeAttributes, NodeFilter, NodeType,
};

use super::sanitize::{extension_of, sanitize_file_name, split_path};

/// Listing options for [`TreeService::folder_contents`].
#[derive(Debug, Clone, Default)]
pub struct ContentsOptions {
    /// Metadata filters.
    pub filter: NodeFilter,
    /// Sort field and direction (name ascending when absent).
    pub sort: Option<SortField>,
    /// Page to fetch (everything when absent).
    pub page: Option<PageRequest>,
}

/// One folder's direct children, split by type.
#[derive(Debug, Clone)]
pub struct FolderContents {
    /// The listed folder itself.
    pub folder: Node,
    /// Child folders in listing order.
    pub folders: Vec<Node>,
    /// Child files in listing order.
    pub files: Vec<Node>,
    /// Filtered total across all pages.
    pub total: u64,
}

/// Result of a path creation: the deepest node plus what was new.
#[derive(Debug, Clone)]
pub struct CreatedPath {
    /// The node at the full requested path.
    pub node: Node,
    /// Folders inserted by this call, shallowest first. Empty when the
    /// whole chain already existed.
    pub created: Vec<Node>,
}

/// Result of a file creation, carrying the node an overwrite displaced.
#[derive(Debug, Clone)]
pub struct CreatedFile {
    /// The newly inserted file node.
    pub node: Node,
    /// The node that previously held the path, already purged logically.
    /// The caller owns its physical cleanup.
    pub replaced: Option<Node>,
}

/// Result of a move, carrying what the caller needs for the physical side.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// The moved node with its new path and bounds.
    pub node: Node,
    /// The node's path before the move.
    pub old_path: String,
    /// Nodes displaced by an overwrite (subtree roots first), already
    /// purged logically. The caller owns their physical cleanup.
    pub replaced: Vec<Node>,
}

/// Result of a delete: the node as it was, plus affected row count.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// The deleted node (state as of before the delete).
    pub node: Node,
    /// Rows trashed or removed, the node itself included.
    pub affected: u64,
}

/// Logical tree mutations and reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeService {
    repo: NodeRepository,
}

impl TreeService {
    /// Create the tree service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure every folder along `path` exists, creating the missing
    /// suffix, and return the deepest node.
    ///
    /// Existing active folders are reused; `attrs` (and the explicit
    /// owner/creator) apply only to folders created by this call, each
    /// resolving inheritance against its own parent.
    pub async fn create_path(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        attrs: &NodeAttributes,
        owner: Option<i64>,
        creator: Option<i64>,
    ) -> AppResult<CreatedPath> {
        let segments: Vec<String> = split_path(path)
            .iter()
            .map(|s| sanitize_file_name(s))
            .collect();
        if segments.is_empty() {
            return Err(AppError::validation("Path has no usable segments"));
        }

        let mut prefixes = Vec::with_capacity(segments.len());
        let mut acc = String::new();
        for segment in &segments {
            if !acc.is_empty() {
                acc.push('/');
            }
            acc.push_str(segment);
            prefixes.push(acc.clone());
        }

        let existing: HashMap<String, Node> = self
            .repo
            .find_by_paths(conn, &prefixes, IncludeStates::ActiveOnly)
            .await?
            .into_iter()
            .map(|n| (n.path.clone(), n))
            .collect();

        let last = prefixes.len() - 1;
        let mut created = Vec::new();
        let mut parent: Option<Node> = None;
        for (i, prefix) in prefixes.iter().enumerate() {
            let node = match existing.get(prefix) {
                Some(found) if found.is_file() => {
                    return if i == last {
                        Err(AppError::conflict(format!(
                            "Path '{prefix}' is occupied by a file"
                        )))
                    } else {
                        Err(AppError::validation(format!(
                            "'{prefix}' is a file and cannot contain folders"
                        )))
                    };
                }
                Some(found) => found.clone(),
                None => {
                    let node = self
                        .insert_folder(
                            conn,
                            parent.as_ref(),
                            &segments[i],
                            prefix,
                            attrs,
                            owner,
                            creator,
                        )
                        .await?;
                    created.push(node.clone());
                    node
                }
            };
            parent = Some(node);
        }

        // The loop always runs at least once.
        let node =
            parent.ok_or_else(|| AppError::internal("Path resolution produced no node"))?;
        Ok(CreatedPath { node, created })
    }

    /// Create a folder (or folder chain) under an existing parent.
    pub async fn create_subfolder(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        sub_path: &str,
        attrs: &NodeAttributes,
        creator: Option<i64>,
    ) -> AppResult<CreatedPath> {
        let parent = self
            .require_folder(conn, parent_id, IncludeStates::ActiveOnly)
            .await?;
        if split_path(sub_path).is_empty() {
            return Err(AppError::validation("Subfolder path has no usable segments"));
        }
        self.create_path(
            conn,
            &format!("{}/{}", parent.path, sub_path),
            attrs,
            None,
            creator,
        )
        .await
    }

    /// Insert a file node under a folder.
    ///
    /// The name is sanitized first; with `overwrite` the node previously
    /// holding the resulting path is purged and handed back to the caller
    /// for physical cleanup.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_file(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        file_name: &str,
        size: i64,
        attrs: &NodeAttributes,
        creator: Option<i64>,
        overwrite: bool,
    ) -> AppResult<CreatedFile> {
        let parent = self
            .require_folder(conn, parent_id, IncludeStates::ActiveOnly)
            .await?;

        let name = sanitize_file_name(file_name);
        let extension = extension_of(&name);
        let path = format!("{}/{}", parent.path, name);

        let mut replaced = None;
        if let Some(existing) = self
            .repo
            .find_by_path(conn, &path, IncludeStates::ActiveOnly)
            .await?
        {
            if !overwrite {
                return Err(AppError::conflict(format!("Path '{path}' already exists")));
            }
            self.purge(conn, &existing).await?;
            replaced = Some(existing);
        }

        // Bounds may have shifted if an overwrite purged a subtree.
        let parent = self
            .require_folder(conn, parent_id, IncludeStates::ActiveOnly)
            .await?;
        self.repo.open_gap(conn, parent.rgt, 2).await?;

        let resolved = attrs.resolve(Some(&parent));
        let node = self
            .repo
            .insert(
                conn,
                &NewNode {
                    node_type: NodeType::File,
                    name,
                    path,
                    hash: Uuid::new_v4(),
                    size,
                    extension,
                    owner_id: resolved.owner_id,
                    created_by: creator,
                    access_level_id: resolved.access_level_id,
                    security_level_id: resolved.security_level_id,
                    is_visible: resolved.is_visible,
                    is_erasable: resolved.is_erasable,
                    description: resolved.description,
                    parent_id: Some(parent.id),
                    lft: parent.rgt,
                    rgt: parent.rgt + 1,
                },
            )
            .await?;

        Ok(CreatedFile { node, replaced })
    }

    /// Move a folder subtree under a new parent folder.
    pub async fn move_folder(
        &self,
        conn: &mut SqliteConnection,
        folder_id: i64,
        target_folder_id: i64,
        overwrite: bool,
    ) -> AppResult<MoveOutcome> {
        let node = self
            .require_folder(conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        self.move_subtree(conn, node, target_folder_id, overwrite, IncludeStates::ActiveOnly)
            .await
    }

    /// Move any active node (folder subtree or single file) under a new
    /// parent folder. Paths are rewritten; bounds are renumbered; the
    /// physical key never changes.
    pub async fn move_node(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
        target_folder_id: i64,
        overwrite: bool,
    ) -> AppResult<MoveOutcome> {
        let node = self
            .require_node(conn, node_id, IncludeStates::ActiveOnly)
            .await?;
        self.move_subtree(conn, node, target_folder_id, overwrite, IncludeStates::ActiveOnly)
            .await
    }

    /// Relocate a still-trashed subtree under a new parent, used when a
    /// restore targets a custom destination. The node stays trashed; the
    /// caller restores it afterwards.
    pub async fn move_trashed_node(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
        target_folder_id: i64,
    ) -> AppResult<MoveOutcome> {
        let node = self
            .require_node(conn, node_id, IncludeStates::TrashedOnly)
            .await?;
        self.move_subtree(conn, node, target_folder_id, false, IncludeStates::TrashedOnly)
            .await
    }

    async fn move_subtree(
        &self,
        conn: &mut SqliteConnection,
        node: Node,
        target_folder_id: i64,
        overwrite: bool,
        states: IncludeStates,
    ) -> AppResult<MoveOutcome> {
        let target = self
            .require_folder(conn, target_folder_id, IncludeStates::ActiveOnly)
            .await?;

        if node.id == target.id || node.contains(&target) {
            return Err(AppError::validation(format!(
                "Cannot move '{}' into its own subtree",
                node.path
            )));
        }

        let new_path = format!("{}/{}", target.path, node.name);
        let mut replaced = Vec::new();
        if let Some(existing) = self
            .repo
            .find_by_path(conn, &new_path, IncludeStates::ActiveOnly)
            .await?
        {
            if existing.id == node.id {
                // Already in place.
                return Ok(MoveOutcome {
                    old_path: node.path.clone(),
                    node,
                    replaced,
                });
            }
            if !overwrite {
                return Err(AppError::conflict(format!(
                    "Path '{new_path}' already exists"
                )));
            }
            let mut doomed = self
                .repo
                .descendants(conn, existing.lft, existing.rgt, IncludeStates::All)
                .await?;
            doomed.insert(0, existing.clone());
            self.purge(conn, &existing).await?;
            replaced = doomed;
        }

        // Reload both ends; an overwrite purge shifts bounds.
        let node = self.require_node(conn, node.id, states).await?;
        let target = self
            .require_folder(conn, target.id, IncludeStates::ActiveOnly)
            .await?;

        let width = node.subtree_width();
        let old_lft = node.lft;
        let old_path = node.path.clone();

        self.repo.detach_subtree(conn, node.lft, node.rgt).await?;
        self.repo.close_gap(conn, node.rgt, width).await?;

        // The target's bounds shifted again if it sat right of the gap.
        let target = self
            .require_folder(conn, target.id, IncludeStates::ActiveOnly)
            .await?;
        let new_lft = target.rgt;
        self.repo.open_gap(conn, target.rgt, width).await?;
        self.repo.reattach_subtree(conn, new_lft - old_lft).await?;

        let moved = self
            .repo
            .update_path(conn, node.id, &node.name, &new_path, Some(target.id))
            .await?;
        self.repo
            .rewrite_descendant_paths(conn, moved.lft, moved.rgt, &old_path, &new_path)
            .await?;

        Ok(MoveOutcome {
            node: moved,
            old_path,
            replaced,
        })
    }

    /// Delete a folder subtree: soft (trash) by default, permanent with
    /// `force`. Force also accepts already-trashed folders.
    pub async fn delete_folder(
        &self,
        conn: &mut SqliteConnection,
        folder_id: i64,
        force: bool,
    ) -> AppResult<DeleteOutcome> {
        let states = if force {
            IncludeStates::All
        } else {
            IncludeStates::ActiveOnly
        };
        let node = self.require_folder(conn, folder_id, states).await?;
        self.delete_subtree(conn, node, force).await
    }

    /// Delete a single file: soft (trash) by default, permanent with
    /// `force`.
    pub async fn delete_file(
        &self,
        conn: &mut SqliteConnection,
        file_id: i64,
        force: bool,
    ) -> AppResult<DeleteOutcome> {
        let states = if force {
            IncludeStates::All
        } else {
            IncludeStates::ActiveOnly
        };
        let node = self.require_node(conn, file_id, states).await?;
        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node '{}' is not a file",
                node.path
            )));
        }
        self.delete_subtree(conn, node, force).await
    }

    async fn delete_subtree(
        &self,
        conn: &mut SqliteConnection,
        node: Node,
        force: bool,
    ) -> AppResult<DeleteOutcome> {
        let affected = if force {
            self.purge(conn, &node).await?
        } else {
            self.repo.soft_delete_subtree(conn, node.lft, node.rgt).await?
        };
        Ok(DeleteOutcome { node, affected })
    }

    /// Re-activate a trashed node and its subtree at its original path.
    ///
    /// The original parent must still be active and the path free.
    pub async fn restore(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
    ) -> AppResult<Node> {
        let node = self
            .repo
            .find_by_id(conn, node_id, IncludeStates::TrashedOnly)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {node_id} is not in the trash")))?;

        if let Some(parent_id) = node.parent_id {
            let parent = self
                .repo
                .find_by_id(conn, parent_id, IncludeStates::ActiveOnly)
                .await?;
            if parent.is_none() {
                return Err(AppError::validation(format!(
                    "Parent of '{}' is trashed; restore it first",
                    node.path
                )));
            }
        }
        if let Some(occupant) = self
            .repo
            .find_by_path(conn, &node.path, IncludeStates::ActiveOnly)
            .await?
        {
            return Err(AppError::conflict(format!(
                "Path '{}' is now occupied by node {}",
                node.path, occupant.id
            )));
        }

        self.repo.restore_subtree(conn, node.lft, node.rgt).await?;
        self.require_node(conn, node.id, IncludeStates::ActiveOnly).await
    }

    /// All active descendants of a folder, in tree order.
    pub async fn descendants(
        &self,
        conn: &mut SqliteConnection,
        folder_id: i64,
    ) -> AppResult<Vec<Node>> {
        let folder = self
            .require_folder(conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        self.repo
            .descendants(conn, folder.lft, folder.rgt, IncludeStates::ActiveOnly)
            .await
    }

    /// A folder's direct children, filtered, sorted and paginated, split
    /// into folders and files.
    pub async fn folder_contents(
        &self,
        conn: &mut SqliteConnection,
        folder_id: i64,
        options: &ContentsOptions,
    ) -> AppResult<FolderContents> {
        let folder = self
            .require_folder(conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        let (children, total) = self
            .repo
            .children(
                conn,
                folder.id,
                &options.filter,
                options.sort.as_ref(),
                options.page.as_ref(),
            )
            .await?;
        let (folders, files) = children.into_iter().partition(Node::is_folder);
        Ok(FolderContents {
            folder,
            folders,
            files,
            total,
        })
    }

    /// Free-text search over active nodes, optionally scoped to a folder's
    /// subtree.
    pub async fn search(
        &self,
        conn: &mut SqliteConnection,
        term: &str,
        scope_folder_id: Option<i64>,
        filter: &NodeFilter,
        limit: u32,
    ) -> AppResult<Vec<Node>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AppError::validation("Search term is empty"));
        }
        let scope = match scope_folder_id {
            Some(id) => {
                let folder = self
                    .require_folder(conn, id, IncludeStates::ActiveOnly)
                    .await?;
                Some((folder.lft, folder.rgt))
            }
            None => None,
        };
        self.repo.search(conn, term, scope, filter, limit).await
    }

    /// The node's path relative to an ancestor folder.
    pub fn relative_path_from_base(&self, node: &Node, base: &Node) -> AppResult<String> {
        if node.id == base.id {
            return Ok(String::new());
        }
        node.path
            .strip_prefix(&format!("{}/", base.path))
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "'{}' is not inside '{}'",
                    node.path, base.path
                ))
            })
    }

    /// Load a node in the given state or fail with not-found.
    pub async fn require_node(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        states: IncludeStates,
    ) -> AppResult<Node> {
        self.repo
            .find_by_id(conn, id, states)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))
    }

    /// Load a folder node or fail.
    pub async fn require_folder(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        states: IncludeStates,
    ) -> AppResult<Node> {
        let node = self.require_node(conn, id, states).await?;
        if !node.is_folder() {
            return Err(AppError::validation(format!(
                "Node '{}' is not a folder",
                node.path
            )));
        }
        Ok(node)
    }

    async fn insert_folder(
        &self,
        conn: &mut SqliteConnection,
        parent: Option<&Node>,
        name: &str,
        path: &str,
        attrs: &NodeAttributes,
        owner: Option<i64>,
        creator: Option<i64>,
    ) -> AppResult<Node> {
        let (lft, rgt, parent_id) = match parent {
            Some(p) => {
                self.repo.open_gap(conn, p.rgt, 2).await?;
                (p.rgt, p.rgt + 1, Some(p.id))
            }
            None => {
                let max = self.repo.max_right(conn).await?;
                (max + 1, max + 2, None)
            }
        };

        let resolved = attrs.resolve(parent);
        self.repo
            .insert(
                conn,
                &NewNode {
                    node_type: NodeType::Folder,
                    name: name.to_string(),
                    path: path.to_string(),
                    hash: Uuid::new_v4(),
                    size: 0,
                    extension: None,
                    owner_id: owner.or(resolved.owner_id),
                    created_by: creator,
                    access_level_id: resolved.access_level_id,
                    security_level_id: resolved.security_level_id,
                    is_visible: resolved.is_visible,
                    is_erasable: resolved.is_erasable,
                    description: resolved.description,
                    parent_id,
                    lft,
                    rgt,
                },
            )
            .await
    }

    /// Hard-delete a subtree and close its gap. Returns rows removed.
    async fn purge(&self, conn: &mut SqliteConnection, node: &Node) -> AppResult<u64> {
        let removed = self
            .repo
            .hard_delete_subtree(conn, node.lft, node.rgt)
            .await?;
        self.repo
            .close_gap(conn, node.rgt, node.subtree_width())
            .await?;
        Ok(removed)
    }
}
