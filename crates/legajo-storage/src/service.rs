//! Uniform error handling and trash-routing wrapper around one backend.
//!
//! The service converts backend transport errors into sentinel values for
//! the accessor surface (logging full context) and passes them through on
//! the `*_checked` variants used inside orchestrator transactions. No raw
//! backend error leaks past this boundary.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, warn};

use legajo_core::result::AppResult;
use legajo_entity::node::Node;
use legajo_entity::trash::TrashItem;

use crate::backend::StorageBackend;
use crate::keys;

/// Cap on per-item failure details kept by a sync pass.
const MAX_SYNC_FAILURE_DETAILS: usize = 50;

/// Wrapper around one active [`StorageBackend`].
///
/// The backend is fixed at construction; swapping media means building a
/// new service, so no in-flight operation can observe a mid-flight swap.
#[derive(Debug, Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    verbose: bool,
}

/// One failed item of a directory sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    /// Logical node id.
    pub node_id: i64,
    /// Logical path for diagnostics.
    pub path: String,
    /// Failure description.
    pub error: String,
}

/// Outcome of a batch directory reconciliation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Folders examined.
    pub scanned: u64,
    /// Folders already present physically.
    pub already_present: u64,
    /// Markers created by this pass.
    pub created: u64,
    /// Folders that could not be reconciled.
    pub failed: u64,
    /// Details for the first failures, capped.
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Record one failure, keeping the detail list bounded.
    fn record_failure(&mut self, node: &Node, error: String) {
        self.failed += 1;
        if self.failures.len() < MAX_SYNC_FAILURE_DETAILS {
            self.failures.push(SyncFailure {
                node_id: node.id,
                path: node.path.clone(),
                error,
            });
        }
    }

    /// Merge another report into this one (paged passes).
    pub fn merge(&mut self, other: SyncReport) {
        self.scanned += other.scanned;
        self.already_present += other.already_present;
        self.created += other.created;
        self.failed += other.failed;
        for failure in other.failures {
            if self.failures.len() >= MAX_SYNC_FAILURE_DETAILS {
                break;
            }
            self.failures.push(failure);
        }
    }
}

impl StorageService {
    /// Create a service over the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>, verbose: bool) -> Self {
        Self { backend, verbose }
    }

    /// Name of the active backend.
    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }

    fn log_failure(&self, operation: &str, node: &Node, err: &legajo_core::AppError) {
        error!(
            operation,
            node_id = node.id,
            key = %keys::canonical_key(node),
            kind = %err.kind,
            error = %err,
            "Storage backend operation failed"
        );
    }

    fn trace(&self, operation: &str, node: &Node) {
        if self.verbose {
            debug!(
                operation,
                node_id = node.id,
                key = %keys::canonical_key(node),
                backend = self.backend.backend_type(),
                "Storage call"
            );
        }
    }

    /// Create a folder's physical marker; raises on transport failure.
    pub async fn create_directory_checked(&self, node: &Node) -> AppResult<bool> {
        self.trace("create_directory", node);
        self.backend.create_directory(node).await
    }

    /// Sentinel variant of [`Self::create_directory_checked`].
    pub async fn create_directory(&self, node: &Node) -> bool {
        match self.create_directory_checked(node).await {
            Ok(created) => created,
            Err(err) => {
                self.log_failure("create_directory", node, &err);
                false
            }
        }
    }

    /// Physical existence check; errors become `false`.
    pub async fn directory_exists(&self, node: &Node) -> bool {
        self.trace("directory_exists", node);
        match self.backend.directory_exists(node).await {
            Ok(exists) => exists,
            Err(err) => {
                self.log_failure("directory_exists", node, &err);
                false
            }
        }
    }

    /// Existence check, raising on transport failure.
    pub async fn directory_exists_checked(&self, node: &Node) -> AppResult<bool> {
        self.trace("directory_exists", node);
        self.backend.directory_exists(node).await
    }

    /// Idempotent create-if-missing for a folder marker.
    ///
    /// Returns `Ok(false)` without touching the backend when the node is
    /// not a folder.
    pub async fn ensure_directory_exists(&self, node: &Node) -> AppResult<bool> {
        if !node.is_folder() {
            warn!(node_id = node.id, "ensure_directory_exists called on a file");
            return Ok(false);
        }
        if self.backend.directory_exists(node).await? {
            return Ok(true);
        }
        self.trace("create_directory", node);
        self.backend.create_directory(node).await
    }

    /// Write file content; raises on transport failure.
    pub async fn put_file_checked(&self, node: &Node, content: Bytes) -> AppResult<bool> {
        self.trace("put_file", node);
        self.backend.put_file(node, content).await
    }

    /// Copy a local file into storage; raises on transport failure.
    pub async fn put_file_from_path_checked(&self, node: &Node, source: &Path) -> AppResult<bool> {
        self.trace("put_file_from_path", node);
        self.backend.put_file_from_path(node, source).await
    }

    /// Read file content; errors become `None`.
    pub async fn get_file(&self, node: &Node) -> Option<Bytes> {
        self.trace("get_file", node);
        match self.backend.get_file(node).await {
            Ok(content) => content,
            Err(err) => {
                self.log_failure("get_file", node, &err);
                None
            }
        }
    }

    /// Read file content, raising on transport failure.
    pub async fn get_file_checked(&self, node: &Node) -> AppResult<Option<Bytes>> {
        self.trace("get_file", node);
        self.backend.get_file(node).await
    }

    /// Stored payload size; errors become `None`.
    pub async fn get_file_size(&self, node: &Node) -> Option<u64> {
        self.trace("get_file_size", node);
        match self.backend.get_file_size(node).await {
            Ok(size) => size,
            Err(err) => {
                self.log_failure("get_file_size", node, &err);
                None
            }
        }
    }

    /// Stored payload size, raising on transport failure.
    pub async fn get_file_size_checked(&self, node: &Node) -> AppResult<Option<u64>> {
        self.trace("get_file_size", node);
        self.backend.get_file_size(node).await
    }

    /// Route a delete: soft deletes go to the trash, force deletes are
    /// permanent. A force delete of an already-trashed node removes its
    /// trash copy and metadata; the canonical key was vacated when it was
    /// trashed. Raises on transport failure so the caller can abort.
    pub async fn delete_node_checked(
        &self,
        node: &Node,
        force: bool,
        deleted_by: Option<i64>,
    ) -> AppResult<bool> {
        if !force {
            self.trace("move_to_trash", node);
            return self.backend.move_to_trash(node, deleted_by).await;
        }
        if node.deleted_at.is_some() {
            self.trace("purge_trash", node);
            return self.backend.purge_trash(node).await;
        }
        if node.is_folder() {
            self.trace("delete_directory", node);
            self.backend.delete_directory(node, true).await
        } else {
            self.trace("delete_file", node);
            self.backend.delete_file(node).await
        }
    }

    /// Validate the physical side of a logical move (a no-op in the
    /// flat-hash layout).
    pub async fn move_node_checked(&self, node: &Node, old_path: &str) -> AppResult<bool> {
        if node.is_folder() {
            self.trace("move_directory", node);
            self.backend.move_directory(node, old_path).await
        } else {
            self.trace("move_file", node);
            self.backend.move_file(node, old_path).await
        }
    }

    /// Restore a trashed payload; raises on transport failure.
    pub async fn restore_from_trash_checked(
        &self,
        node: &Node,
        custom_destination: Option<&str>,
    ) -> AppResult<bool> {
        self.trace("restore_from_trash", node);
        self.backend.restore_from_trash(node, custom_destination).await
    }

    /// Enumerate trash entries.
    pub async fn list_trash_items(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>> {
        self.backend.list_trash_items(limit, offset).await
    }

    /// Purge trash entries older than the cutoff.
    pub async fn empty_trash(&self, older_than_days: u32) -> AppResult<usize> {
        self.backend.empty_trash(older_than_days).await
    }

    /// Reconcile one batch of folder nodes against the backend.
    ///
    /// Individual failures are recorded and never abort the batch.
    pub async fn sync_directories(&self, folders: &[Node]) -> SyncReport {
        let mut report = SyncReport::default();
        for node in folders {
            report.scanned += 1;
            match self.backend.directory_exists(node).await {
                Ok(true) => report.already_present += 1,
                Ok(false) => match self.backend.create_directory(node).await {
                    Ok(_) => {
                        report.created += 1;
                        debug!(node_id = node.id, path = %node.path, "Recreated missing directory marker");
                    }
                    Err(err) => {
                        self.log_failure("sync_create_directory", node, &err);
                        report.record_failure(node, err.to_string());
                    }
                },
                Err(err) => {
                    self.log_failure("sync_directory_exists", node, &err);
                    report.record_failure(node, err.to_string());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::local::LocalBackend;
    use chrono::Utc;
    use legajo_entity::node::NodeType;
    use uuid::Uuid;

    fn folder_node(id: i64) -> Node {
        Node {
            id,
            node_type: NodeType::Folder,
            name: format!("f{id}"),
            path: format!("f{id}"),
            hash: Uuid::new_v4(),
            size: 0,
            extension: None,
            owner_id: None,
            created_by: None,
            access_level_id: None,
            security_level_id: None,
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

    async fn service() -> (tempfile::TempDir, StorageService) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();
        (dir, StorageService::new(Arc::new(backend), false))
    }

    #[tokio::test]
    async fn ensure_directory_is_idempotent() {
        let (_dir, service) = service().await;
        let node = folder_node(1);

        assert!(service.ensure_directory_exists(&node).await.unwrap());
        assert!(service.ensure_directory_exists(&node).await.unwrap());
        assert!(service.directory_exists(&node).await);
    }

    #[tokio::test]
    async fn ensure_directory_rejects_files_quietly() {
        let (_dir, service) = service().await;
        let mut node = folder_node(2);
        node.node_type = NodeType::File;
        node.extension = Some("pdf".to_string());

        assert!(!service.ensure_directory_exists(&node).await.unwrap());
    }

    #[tokio::test]
    async fn sync_reports_created_and_present() {
        let (_dir, service) = service().await;
        let a = folder_node(1);
        let b = folder_node(2);
        service.create_directory(&a).await;

        let report = service.sync_directories(&[a, b]).await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn soft_delete_routes_to_trash() {
        let (_dir, service) = service().await;
        let node = folder_node(3);
        service.create_directory(&node).await;

        assert!(service.delete_node_checked(&node, false, Some(1)).await.unwrap());
        assert!(!service.directory_exists(&node).await);
        assert_eq!(service.list_trash_items(None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn force_delete_skips_trash() {
        let (_dir, service) = service().await;
        let node = folder_node(4);
        service.create_directory(&node).await;

        assert!(service.delete_node_checked(&node, true, None).await.unwrap());
        assert!(service.list_trash_items(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn force_delete_of_a_trashed_node_purges_its_trash_entry() {
        let (_dir, service) = service().await;
        let node = folder_node(5);
        service.create_directory(&node).await;
        assert!(service.delete_node_checked(&node, false, Some(1)).await.unwrap());
        assert_eq!(service.list_trash_items(None, None).await.unwrap().len(), 1);

        let mut trashed = node.clone();
        trashed.deleted_at = Some(Utc::now());
        assert!(service.delete_node_checked(&trashed, true, None).await.unwrap());
        assert!(service.list_trash_items(None, None).await.unwrap().is_empty());
    }
}
