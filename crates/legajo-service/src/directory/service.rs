//! The directory orchestrator: one transaction per public operation.
//!
//! Every mutation follows the same shape: begin a transaction, apply the
//! logical change through [`TreeService`], apply the physical change
//! through [`StorageService`]'s checked surface, commit, then emit
//! events. A physical failure before commit rolls the logical change
//! back, so the two sides never diverge past an operation boundary.

use std::sync::Arc;

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::events::{EventSink, NodeEvent};
use legajo_core::result::AppResult;
use legajo_database::repositories::NodeRepository;
use legajo_entity::node::{IncludeStates, Node, NodeAttributes, NodeFilter};
use legajo_entity::trash::TrashItem;
use legajo_storage::{keys, StorageService, SyncReport};

use crate::acting_user::ActingUserResolver;
use crate::tree::{ContentsOptions, FolderContents, TreeService};

/// One folder to create in a batch.
#[derive(Debug, Clone)]
pub struct DirectorySpec {
    /// Full logical path to ensure.
    pub path: String,
    /// Attributes for folders the batch item creates.
    pub attributes: NodeAttributes,
    /// Owner override.
    pub owner: Option<i64>,
}

/// One failed item of a best-effort batch creation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateFailure {
    /// The requested path.
    pub path: String,
    /// Failure description.
    pub error: String,
}

/// Outcome of a best-effort batch creation.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateOutcome {
    /// Deepest node per successful item, in request order.
    pub created: Vec<Node>,
    /// Items that failed; the rest of the batch proceeded regardless.
    pub failures: Vec<BatchCreateFailure>,
}

/// Aggregate view of one folder.
#[derive(Debug, Clone)]
pub struct DirectoryInfo {
    /// The folder node.
    pub node: Node,
    /// Whether its physical marker exists.
    pub physically_present: bool,
    /// Direct active children.
    pub child_count: u64,
    /// All active descendants.
    pub descendant_count: u64,
    /// Sum of active descendant file sizes in bytes.
    pub total_size: u64,
}

/// One logical node whose physical counterpart is missing.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyIssue {
    /// Logical node id.
    pub node_id: i64,
    /// Logical path.
    pub path: String,
    /// The physical key that should exist.
    pub key: String,
}

/// Result of a logical-against-physical consistency check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    /// Nodes examined.
    pub checked: u64,
    /// Nodes without a physical counterpart.
    pub missing: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    /// Whether every checked node had its physical counterpart.
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Orchestrates logical tree mutations with their physical side effects.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    pool: SqlitePool,
    tree: TreeService,
    repo: NodeRepository,
    storage: StorageService,
    acting_user: ActingUserResolver,
    events: Arc<dyn EventSink>,
    sync_page_size: u32,
    trash_retention_days: u32,
}

fn tx_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

impl DirectoryService {
    /// Build the orchestrator over a pool, a storage service and its
    /// collaborators.
    pub fn new(
        pool: SqlitePool,
        storage: StorageService,
        acting_user: ActingUserResolver,
        events: Arc<dyn EventSink>,
        sync_page_size: u32,
        trash_retention_days: u32,
    ) -> Self {
        Self {
            pool,
            tree: TreeService::new(),
            repo: NodeRepository,
            storage,
            acting_user,
            events,
            sync_page_size: sync_page_size.max(1),
            trash_retention_days,
        }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(tx_err("Failed to begin transaction"))
    }

    /// Ensure every folder along `path` exists, logically and physically,
    /// and return the deepest node.
    pub async fn create_directory_path(
        &self,
        path: &str,
        attrs: &NodeAttributes,
        owner: Option<i64>,
        creator: Option<i64>,
    ) -> AppResult<Node> {
        let creator = self.acting_user.resolve(creator).await;
        let mut tx = self.begin().await?;

        let outcome = self
            .tree
            .create_path(&mut *tx, path, attrs, owner, creator)
            .await?;
        for folder in &outcome.created {
            self.storage.create_directory_checked(folder).await?;
        }
        // The whole chain may predate this call; markers must still exist.
        if outcome.created.is_empty() {
            self.storage.ensure_directory_exists(&outcome.node).await?;
        }

        tx.commit().await.map_err(tx_err("Failed to commit path creation"))?;

        for folder in &outcome.created {
            info!(node_id = folder.id, path = %folder.path, "Created directory");
            self.events.emit(NodeEvent::Created {
                node_id: folder.id,
                hash: folder.hash,
                path: folder.path.clone(),
            });
        }
        Ok(outcome.node)
    }

    /// Create a folder (or folder chain) under an existing parent.
    pub async fn create_subfolder(
        &self,
        parent_id: i64,
        sub_path: &str,
        attrs: &NodeAttributes,
        creator: Option<i64>,
    ) -> AppResult<Node> {
        let creator = self.acting_user.resolve(creator).await;
        let mut tx = self.begin().await?;

        let outcome = self
            .tree
            .create_subfolder(&mut *tx, parent_id, sub_path, attrs, creator)
            .await?;
        for folder in &outcome.created {
            self.storage.create_directory_checked(folder).await?;
        }
        if outcome.created.is_empty() {
            self.storage.ensure_directory_exists(&outcome.node).await?;
        }

        tx.commit()
            .await
            .map_err(tx_err("Failed to commit subfolder creation"))?;

        for folder in &outcome.created {
            self.events.emit(NodeEvent::Created {
                node_id: folder.id,
                hash: folder.hash,
                path: folder.path.clone(),
            });
        }
        Ok(outcome.node)
    }

    /// Best-effort batch creation: each item runs in its own transaction
    /// and one failure never aborts the rest.
    pub async fn create_directories(&self, specs: &[DirectorySpec]) -> BatchCreateOutcome {
        let mut outcome = BatchCreateOutcome::default();
        for spec in specs {
            match self
                .create_directory_path(&spec.path, &spec.attributes, spec.owner, None)
                .await
            {
                Ok(node) => outcome.created.push(node),
                Err(err) => {
                    warn!(path = %spec.path, error = %err, "Batch directory creation item failed");
                    outcome.failures.push(BatchCreateFailure {
                        path: spec.path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Move a folder subtree under a new parent.
    ///
    /// Logically the paths and bounds are rewritten; physically nothing is
    /// copied, because the hash keys do not depend on the path. With
    /// `overwrite` a node already holding the destination path is
    /// permanently removed first.
    pub async fn move_folder(
        &self,
        folder_id: i64,
        target_folder_id: i64,
        overwrite: bool,
    ) -> AppResult<Node> {
        let mut tx = self.begin().await?;

        let outcome = self
            .tree
            .move_folder(&mut *tx, folder_id, target_folder_id, overwrite)
            .await?;
        for displaced in &outcome.replaced {
            self.storage.delete_node_checked(displaced, true, None).await?;
        }
        self.storage
            .move_node_checked(&outcome.node, &outcome.old_path)
            .await?;

        tx.commit().await.map_err(tx_err("Failed to commit move"))?;

        info!(
            node_id = outcome.node.id,
            from = %outcome.old_path,
            to = %outcome.node.path,
            "Moved folder"
        );
        self.events.emit(NodeEvent::Moved {
            node_id: outcome.node.id,
            from_path: outcome.old_path.clone(),
            to_path: outcome.node.path.clone(),
        });
        Ok(outcome.node)
    }

    /// Delete a folder subtree: to the trash by default, permanently with
    /// `force`. Returns the number of nodes affected.
    pub async fn delete_folder(
        &self,
        folder_id: i64,
        force: bool,
        deleted_by: Option<i64>,
    ) -> AppResult<u64> {
        let deleted_by = self.acting_user.resolve(deleted_by).await;
        let mut tx = self.begin().await?;

        let states = if force {
            IncludeStates::All
        } else {
            IncludeStates::ActiveOnly
        };
        let folder = self.tree.require_folder(&mut *tx, folder_id, states).await?;
        let mut subtree = self
            .repo
            .descendants(&mut *tx, folder.lft, folder.rgt, states)
            .await?;
        subtree.insert(0, folder.clone());

        let outcome = self.tree.delete_folder(&mut *tx, folder_id, force).await?;
        for node in &subtree {
            self.storage.delete_node_checked(node, force, deleted_by).await?;
        }

        tx.commit().await.map_err(tx_err("Failed to commit delete"))?;

        info!(
            node_id = folder.id,
            path = %folder.path,
            force,
            affected = outcome.affected,
            "Deleted folder"
        );
        self.events.emit(NodeEvent::Deleted {
            node_id: folder.id,
            path: folder.path.clone(),
            forced: force,
        });
        Ok(outcome.affected)
    }

    /// Delete a single file: to the trash by default, permanently with
    /// `force`.
    pub async fn delete_file(
        &self,
        file_id: i64,
        force: bool,
        deleted_by: Option<i64>,
    ) -> AppResult<()> {
        let deleted_by = self.acting_user.resolve(deleted_by).await;
        let mut tx = self.begin().await?;

        let outcome = self.tree.delete_file(&mut *tx, file_id, force).await?;
        self.storage
            .delete_node_checked(&outcome.node, force, deleted_by)
            .await?;

        tx.commit().await.map_err(tx_err("Failed to commit delete"))?;

        self.events.emit(NodeEvent::Deleted {
            node_id: outcome.node.id,
            path: outcome.node.path.clone(),
            forced: force,
        });
        Ok(())
    }

    /// Restore a trashed node, optionally re-attaching it under a custom
    /// destination folder path instead of its original parent.
    pub async fn restore_node(
        &self,
        node_id: i64,
        custom_parent_path: Option<&str>,
    ) -> AppResult<Node> {
        let mut tx = self.begin().await?;

        if let Some(parent_path) = custom_parent_path {
            let target = self
                .tree
                .create_path(&mut *tx, parent_path, &NodeAttributes::default(), None, None)
                .await?;
            for folder in &target.created {
                self.storage.create_directory_checked(folder).await?;
            }
            self.tree
                .move_trashed_node(&mut *tx, node_id, target.node.id)
                .await?;
        }

        let restored = self.tree.restore(&mut *tx, node_id).await?;
        let mut subtree = if restored.is_folder() {
            self.repo
                .descendants(&mut *tx, restored.lft, restored.rgt, IncludeStates::ActiveOnly)
                .await?
        } else {
            Vec::new()
        };
        subtree.insert(0, restored.clone());
        for node in &subtree {
            self.storage.restore_from_trash_checked(node, None).await?;
        }

        tx.commit().await.map_err(tx_err("Failed to commit restore"))?;

        info!(node_id = restored.id, path = %restored.path, "Restored node from trash");
        self.events.emit(NodeEvent::Restored {
            node_id: restored.id,
            path: restored.path.clone(),
        });
        Ok(restored)
    }

    /// A folder's direct children, filtered, sorted and paginated.
    pub async fn folder_contents(
        &self,
        folder_id: i64,
        options: &ContentsOptions,
    ) -> AppResult<FolderContents> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(tx_err("Failed to acquire connection"))?;
        self.tree.folder_contents(&mut *conn, folder_id, options).await
    }

    /// Free-text search over active nodes, optionally scoped to a folder.
    pub async fn search(
        &self,
        term: &str,
        scope_folder_id: Option<i64>,
        filter: &NodeFilter,
        limit: u32,
    ) -> AppResult<Vec<Node>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(tx_err("Failed to acquire connection"))?;
        self.tree
            .search(&mut *conn, term, scope_folder_id, filter, limit)
            .await
    }

    /// Aggregate logical and physical information about one folder.
    pub async fn directory_info(&self, folder_id: i64) -> AppResult<DirectoryInfo> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(tx_err("Failed to acquire connection"))?;

        let node = self
            .tree
            .require_folder(&mut *conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        let descendants = self
            .repo
            .descendants(&mut *conn, node.lft, node.rgt, IncludeStates::ActiveOnly)
            .await?;
        drop(conn);

        let child_count = descendants
            .iter()
            .filter(|d| d.parent_id == Some(node.id))
            .count() as u64;
        let total_size: u64 = descendants
            .iter()
            .filter(|d| d.is_file())
            .map(|d| d.size.max(0) as u64)
            .sum();
        let physically_present = self.storage.directory_exists(&node).await;

        Ok(DirectoryInfo {
            physically_present,
            child_count,
            descendant_count: descendants.len() as u64,
            total_size,
            node,
        })
    }

    /// Check that every node in a folder (optionally its whole subtree)
    /// has its physical counterpart.
    pub async fn validate_consistency(
        &self,
        folder_id: i64,
        recursive: bool,
    ) -> AppResult<ConsistencyReport> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(tx_err("Failed to acquire connection"))?;

        let folder = self
            .tree
            .require_folder(&mut *conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        let mut nodes = vec![folder.clone()];
        if recursive {
            nodes.extend(
                self.repo
                    .descendants(&mut *conn, folder.lft, folder.rgt, IncludeStates::ActiveOnly)
                    .await?,
            );
        } else {
            let (children, _) = self
                .repo
                .children(&mut *conn, folder.id, &NodeFilter::default(), None, None)
                .await?;
            nodes.extend(children);
        }
        drop(conn);

        let mut report = ConsistencyReport::default();
        for node in &nodes {
            report.checked += 1;
            let present = if node.is_folder() {
                self.storage.directory_exists_checked(node).await?
            } else {
                self.storage.get_file_size_checked(node).await?.is_some()
            };
            if !present {
                report.missing.push(ConsistencyIssue {
                    node_id: node.id,
                    path: node.path.clone(),
                    key: keys::canonical_key(node),
                });
            }
        }
        debug!(
            folder_id,
            checked = report.checked,
            missing = report.missing.len(),
            "Consistency check finished"
        );
        Ok(report)
    }

    /// Walk active folders in pages and recreate missing physical markers.
    /// `limit` caps the total number of folders visited; `None` walks them
    /// all. Individual failures are reported, never fatal.
    pub async fn sync_all_directories(
        &self,
        prioritize_recent: bool,
        limit: Option<u64>,
    ) -> AppResult<SyncReport> {
        let mut report = SyncReport::default();
        let mut offset = 0u64;
        loop {
            let page_size = match limit {
                Some(cap) if cap.saturating_sub(offset) < self.sync_page_size as u64 => {
                    (cap - offset) as u32
                }
                _ => self.sync_page_size,
            };
            if page_size == 0 {
                break;
            }
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(tx_err("Failed to acquire connection"))?;
            let page = self
                .repo
                .folders_page(&mut *conn, prioritize_recent, page_size, offset)
                .await?;
            drop(conn);

            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            report.merge(self.storage.sync_directories(&page).await);
            offset += page_len as u64;
            if page_len < page_size as usize {
                break;
            }
        }
        info!(
            scanned = report.scanned,
            created = report.created,
            failed = report.failed,
            "Directory synchronization finished"
        );
        Ok(report)
    }

    /// Enumerate trash entries, newest first.
    pub async fn list_trash(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>> {
        self.storage.list_trash_items(limit, offset).await
    }

    /// Purge trash entries older than the retention window (or an explicit
    /// cutoff in days). Logical rows of purged payloads are untouched;
    /// they remain restorable in name only and fail consistency checks.
    pub async fn empty_trash(&self, older_than_days: Option<u32>) -> AppResult<usize> {
        let cutoff = older_than_days.unwrap_or(self.trash_retention_days);
        let purged = self.storage.empty_trash(cutoff).await?;
        info!(purged, cutoff_days = cutoff, "Emptied trash");
        Ok(purged)
    }
}
