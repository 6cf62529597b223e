//! End-to-end tests for the directory orchestrator: path creation, moves,
//! delete/restore and physical reconciliation against a local backend.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::events::NullEventSink;
use legajo_core::identity::StaticIdentity;
use legajo_core::result::AppResult;
use legajo_database::repositories::NodeRepository;
use legajo_database::DatabasePool;
use legajo_entity::node::{IncludeStates, Node, NodeAttributes};
use legajo_entity::trash::TrashItem;
use legajo_service::acting_user::ActingUserResolver;
use legajo_service::directory::DirectorySpec;
use legajo_service::{DirectoryService, UploadService};
use legajo_storage::providers::LocalBackend;
use legajo_storage::{StorageBackend, StorageService};

/// Backend wrapper counting payload transfers, to prove moves are free.
/// Size probes can be made to fail, standing in for a flaky transport.
#[derive(Debug)]
struct CountingBackend {
    inner: LocalBackend,
    puts: AtomicUsize,
    fail_sizes: AtomicBool,
}

impl CountingBackend {
    async fn new(root: &Path) -> Self {
        Self {
            inner: LocalBackend::new(root.to_str().unwrap()).await.unwrap(),
            puts: AtomicUsize::new(0),
            fail_sizes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    fn backend_type(&self) -> &str {
        "counting"
    }

    async fn create_directory(&self, node: &Node) -> AppResult<bool> {
        self.inner.create_directory(node).await
    }

    async fn directory_exists(&self, node: &Node) -> AppResult<bool> {
        self.inner.directory_exists(node).await
    }

    async fn put_file(&self, node: &Node, content: Bytes) -> AppResult<bool> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_file(node, content).await
    }

    async fn put_file_from_path(&self, node: &Node, source: &Path) -> AppResult<bool> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_file_from_path(node, source).await
    }

    async fn get_file(&self, node: &Node) -> AppResult<Option<Bytes>> {
        self.inner.get_file(node).await
    }

    async fn get_file_size(&self, node: &Node) -> AppResult<Option<u64>> {
        if self.fail_sizes.load(Ordering::SeqCst) {
            return Err(AppError::storage("size probe unavailable"));
        }
        self.inner.get_file_size(node).await
    }

    async fn delete_file(&self, node: &Node) -> AppResult<bool> {
        self.inner.delete_file(node).await
    }

    async fn delete_directory(&self, node: &Node, recursive: bool) -> AppResult<bool> {
        self.inner.delete_directory(node, recursive).await
    }

    async fn move_directory(&self, node: &Node, old_path: &str) -> AppResult<bool> {
        self.inner.move_directory(node, old_path).await
    }

    async fn move_file(&self, node: &Node, old_path: &str) -> AppResult<bool> {
        self.inner.move_file(node, old_path).await
    }

    async fn move_to_trash(&self, node: &Node, deleted_by: Option<i64>) -> AppResult<bool> {
        self.inner.move_to_trash(node, deleted_by).await
    }

    async fn restore_from_trash(
        &self,
        node: &Node,
        custom_destination: Option<&str>,
    ) -> AppResult<bool> {
        self.inner.restore_from_trash(node, custom_destination).await
    }

    async fn purge_trash(&self, node: &Node) -> AppResult<bool> {
        self.inner.purge_trash(node).await
    }

    async fn list_trash_items(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>> {
        self.inner.list_trash_items(limit, offset).await
    }

    async fn empty_trash(&self, older_than_days: u32) -> AppResult<usize> {
        self.inner.empty_trash(older_than_days).await
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    db: DatabasePool,
    backend: Arc<CountingBackend>,
    directories: DirectoryService,
    uploads: UploadService,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::in_memory().await.unwrap();
    let backend = Arc::new(CountingBackend::new(dir.path()).await);
    let storage = StorageService::new(backend.clone(), false);
    let acting = ActingUserResolver::new(Arc::new(StaticIdentity {
        current: Some(1),
        fallback: Some(1),
    }));
    let events = Arc::new(NullEventSink);

    let directories = DirectoryService::new(
        db.pool().clone(),
        storage.clone(),
        acting.clone(),
        events.clone(),
        100,
        30,
    );
    let uploads = UploadService::new(db.pool().clone(), storage, acting, events);

    Harness {
        _dir: dir,
        db,
        backend,
        directories,
        uploads,
    }
}

async fn node_at(h: &Harness, path: &str, states: IncludeStates) -> Option<Node> {
    let mut conn = h.db.pool().acquire().await.unwrap();
    NodeRepository
        .find_by_path(&mut *conn, path, states)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_path_builds_chain_and_reuses_existing() {
    let h = harness().await;

    let deepest = h
        .directories
        .create_directory_path(
            "hr/Empleados/12345678A",
            &NodeAttributes::default(),
            Some(7),
            None,
        )
        .await
        .unwrap();
    assert_eq!(deepest.path, "hr/Empleados/12345678A");
    assert_eq!(deepest.owner_id, Some(7));

    // All three levels exist and bounds nest.
    let root = node_at(&h, "hr", IncludeStates::ActiveOnly).await.unwrap();
    let middle = node_at(&h, "hr/Empleados", IncludeStates::ActiveOnly)
        .await
        .unwrap();
    assert!(root.contains(&middle));
    assert!(middle.contains(&deepest));
    assert_eq!(deepest.parent_id, Some(middle.id));

    // A second call reuses every node.
    let again = h
        .directories
        .create_directory_path(
            "hr/Empleados/12345678A",
            &NodeAttributes::default(),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(again.id, deepest.id);

    let report = h
        .directories
        .validate_consistency(root.id, true)
        .await
        .unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.checked, 3);
}

#[tokio::test]
async fn move_folder_rewrites_paths_without_copying_payloads() {
    let h = harness().await;

    let employees = h
        .directories
        .create_directory_path("hr/Empleados/A", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let archive = h
        .directories
        .create_directory_path("hr/Archivo", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let file = h
        .uploads
        .upload_bytes(
            employees.id,
            "contrato.pdf",
            Bytes::from_static(b"contract body"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();
    let puts_before = h.backend.puts.load(Ordering::SeqCst);
    assert_eq!(puts_before, 1);
    let key_before = legajo_storage::keys::canonical_key(&file);

    let moved = h
        .directories
        .move_folder(employees.id, archive.id, false)
        .await
        .unwrap();
    assert_eq!(moved.path, "hr/Archivo/A");

    // Descendant path rewritten, hash key (and the payload) untouched.
    let file_after = node_at(&h, "hr/Archivo/A/contrato.pdf", IncludeStates::ActiveOnly)
        .await
        .unwrap();
    assert_eq!(file_after.id, file.id);
    assert_eq!(legajo_storage::keys::canonical_key(&file_after), key_before);
    assert_eq!(h.backend.puts.load(Ordering::SeqCst), puts_before);
    assert!(node_at(&h, "hr/Empleados/A", IncludeStates::All).await.is_none());

    // Bounds still nest under the new parent.
    let archive = node_at(&h, "hr/Archivo", IncludeStates::ActiveOnly)
        .await
        .unwrap();
    let moved = node_at(&h, "hr/Archivo/A", IncludeStates::ActiveOnly)
        .await
        .unwrap();
    assert!(archive.contains(&moved));
    assert!(moved.contains(&file_after));
}

#[tokio::test]
async fn move_into_own_subtree_is_rejected() {
    let h = harness().await;
    let parent = h
        .directories
        .create_directory_path("a/b", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let root = node_at(&h, "a", IncludeStates::ActiveOnly).await.unwrap();

    let err = h
        .directories
        .move_folder(root.id, parent.id, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("own subtree"));
}

#[tokio::test]
async fn move_conflict_without_overwrite_leaves_both_trees_untouched() {
    let h = harness().await;
    let source = h
        .directories
        .create_directory_path("a/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.directories
        .create_directory_path("b/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let target = node_at(&h, "b", IncludeStates::ActiveOnly).await.unwrap();

    let err = h
        .directories
        .move_folder(source.id, target.id, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    assert!(node_at(&h, "a/x", IncludeStates::ActiveOnly).await.is_some());
    assert!(node_at(&h, "b/x", IncludeStates::ActiveOnly).await.is_some());
}

#[tokio::test]
async fn move_with_overwrite_replaces_the_destination() {
    let h = harness().await;
    let source = h
        .directories
        .create_directory_path("a/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let displaced = h
        .directories
        .create_directory_path("b/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let target = node_at(&h, "b", IncludeStates::ActiveOnly).await.unwrap();

    let moved = h
        .directories
        .move_folder(source.id, target.id, true)
        .await
        .unwrap();
    assert_eq!(moved.id, source.id);
    assert_eq!(moved.path, "b/x");

    // The displaced node is gone entirely, not trashed.
    let mut conn = h.db.pool().acquire().await.unwrap();
    let gone = NodeRepository
        .find_by_id(&mut *conn, displaced.id, IncludeStates::All)
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn soft_delete_cascades_and_restore_brings_the_subtree_back() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr/Empleados", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "dni.pdf",
            Bytes::from_static(b"id card"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    let affected = h.directories.delete_folder(folder.id, false, None).await.unwrap();
    assert_eq!(affected, 2);
    assert!(node_at(&h, "hr/Empleados", IncludeStates::ActiveOnly).await.is_none());
    assert!(node_at(&h, "hr/Empleados/dni.pdf", IncludeStates::TrashedOnly)
        .await
        .is_some());
    assert_eq!(h.directories.list_trash(None, None).await.unwrap().len(), 2);

    let restored = h.directories.restore_node(folder.id, None).await.unwrap();
    assert_eq!(restored.path, "hr/Empleados");
    assert!(node_at(&h, "hr/Empleados/dni.pdf", IncludeStates::ActiveOnly)
        .await
        .is_some());
    assert!(h.directories.list_trash(None, None).await.unwrap().is_empty());

    let report = h
        .directories
        .validate_consistency(restored.id, true)
        .await
        .unwrap();
    assert!(report.is_consistent());
}

#[tokio::test]
async fn force_delete_skips_the_trash_entirely() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("tmp/scratch", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let affected = h.directories.delete_folder(folder.id, true, None).await.unwrap();
    assert_eq!(affected, 1);
    assert!(node_at(&h, "tmp/scratch", IncludeStates::All).await.is_none());
    assert!(h.directories.list_trash(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn force_deleting_a_trashed_subtree_clears_its_trash_entries() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr/Bajas", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "finiquito.pdf",
            Bytes::from_static(b"settlement"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    h.directories.delete_folder(folder.id, false, None).await.unwrap();
    assert_eq!(h.directories.list_trash(None, None).await.unwrap().len(), 2);

    let affected = h.directories.delete_folder(folder.id, true, None).await.unwrap();
    assert_eq!(affected, 2);
    assert!(node_at(&h, "hr/Bajas", IncludeStates::All).await.is_none());
    assert!(h.directories.list_trash(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn consistency_check_aborts_on_transport_errors() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("docs", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "a.txt",
            Bytes::from_static(b"a"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    h.backend.fail_sizes.store(true, Ordering::SeqCst);
    let err = h
        .directories
        .validate_consistency(folder.id, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
}

#[tokio::test]
async fn restore_into_a_custom_destination() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("a/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.directories.delete_folder(folder.id, false, None).await.unwrap();

    let restored = h
        .directories
        .restore_node(folder.id, Some("b"))
        .await
        .unwrap();
    assert_eq!(restored.path, "b/x");
    assert!(node_at(&h, "a/x", IncludeStates::All).await.is_none());
    assert!(node_at(&h, "b", IncludeStates::ActiveOnly).await.is_some());
}

#[tokio::test]
async fn restore_refuses_an_occupied_original_path() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("a/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.directories.delete_folder(folder.id, false, None).await.unwrap();

    // A new active node takes the old path.
    h.directories
        .create_directory_path("a/x", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let err = h.directories.restore_node(folder.id, None).await.unwrap_err();
    assert!(err.to_string().contains("occupied"));
}

#[tokio::test]
async fn batch_creation_is_best_effort() {
    let h = harness().await;
    let specs = vec![
        DirectorySpec {
            path: "hr/Empleados".into(),
            attributes: NodeAttributes::default(),
            owner: None,
        },
        DirectorySpec {
            path: "///".into(),
            attributes: NodeAttributes::default(),
            owner: None,
        },
        DirectorySpec {
            path: "hr/Nominas".into(),
            attributes: NodeAttributes::default(),
            owner: None,
        },
    ];

    let outcome = h.directories.create_directories(&specs).await;
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].path, "///");
    assert!(node_at(&h, "hr/Nominas", IncludeStates::ActiveOnly).await.is_some());
}

#[tokio::test]
async fn sync_recreates_missing_markers() {
    let h = harness().await;
    h.directories
        .create_directory_path("hr/Empleados/A", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    // Wipe every physical marker behind the orchestrator's back.
    std::fs::remove_dir_all(h._dir.path().join("folders")).unwrap();

    let report = h.directories.sync_all_directories(false, None).await.unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.created, 3);
    assert_eq!(report.failed, 0);

    let second = h.directories.sync_all_directories(false, None).await.unwrap();
    assert_eq!(second.already_present, 3);
    assert_eq!(second.created, 0);
}

#[tokio::test]
async fn directory_info_aggregates_the_subtree() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr/Empleados", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "a.txt",
            Bytes::from_static(b"12345"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();
    h.directories
        .create_subfolder(folder.id, "sub", &NodeAttributes::default(), None)
        .await
        .unwrap();

    let info = h.directories.directory_info(folder.id).await.unwrap();
    assert!(info.physically_present);
    assert_eq!(info.child_count, 2);
    assert_eq!(info.descendant_count, 2);
    assert_eq!(info.total_size, 5);
}
