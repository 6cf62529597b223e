//! Upload and download flows: name sanitization, overwrite semantics and
//! folder ZIP packaging.

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use legajo_core::error::AppError;
use legajo_core::events::NullEventSink;
use legajo_core::identity::StaticIdentity;
use legajo_core::result::AppResult;
use legajo_database::DatabasePool;
use legajo_entity::node::{Node, NodeAttributes};
use legajo_entity::trash::TrashItem;
use legajo_service::acting_user::ActingUserResolver;
use legajo_service::{DirectoryService, DownloadService, UploadService};
use legajo_storage::providers::LocalBackend;
use legajo_storage::{StorageBackend, StorageService};

/// Backend wrapper whose writes can be switched to fail, standing in for
/// a storage outage mid-upload.
#[derive(Debug)]
struct FlakyBackend {
    inner: LocalBackend,
    fail_puts: AtomicBool,
}

impl FlakyBackend {
    async fn new(root: &Path) -> Self {
        Self {
            inner: LocalBackend::new(root.to_str().unwrap()).await.unwrap(),
            fail_puts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn backend_type(&self) -> &str {
        "flaky"
    }

    async fn create_directory(&self, node: &Node) -> AppResult<bool> {
        self.inner.create_directory(node).await
    }

    async fn directory_exists(&self, node: &Node) -> AppResult<bool> {
        self.inner.directory_exists(node).await
    }

    async fn put_file(&self, node: &Node, content: Bytes) -> AppResult<bool> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::storage("write refused"));
        }
        self.inner.put_file(node, content).await
    }

    async fn put_file_from_path(&self, node: &Node, source: &Path) -> AppResult<bool> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::storage("write refused"));
        }
        self.inner.put_file_from_path(node, source).await
    }

    async fn get_file(&self, node: &Node) -> AppResult<Option<Bytes>> {
        self.inner.get_file(node).await
    }

    async fn get_file_size(&self, node: &Node) -> AppResult<Option<u64>> {
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
    directories: DirectoryService,
    uploads: UploadService,
    downloads: DownloadService,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::in_memory().await.unwrap();
    let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();
    let storage = StorageService::new(Arc::new(backend), false);
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
    let uploads = UploadService::new(db.pool().clone(), storage.clone(), acting, events);
    let downloads = DownloadService::new(db.pool().clone(), storage);

    Harness {
        _dir: dir,
        directories,
        uploads,
        downloads,
    }
}

#[tokio::test]
async fn upload_sanitizes_the_file_name_and_round_trips() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr/Informes", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let node = h
        .uploads
        .upload_bytes(
            folder.id,
            "Informe Mensual #1.pdf",
            Bytes::from_static(b"monthly report"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(node.name, "Informe_Mensual_1.pdf");
    assert_eq!(node.path, "hr/Informes/Informe_Mensual_1.pdf");
    assert_eq!(node.extension.as_deref(), Some("pdf"));
    assert_eq!(node.size, 14);
    assert_eq!(node.created_by, Some(1));

    let result = h.downloads.download_file(node.id).await.unwrap();
    assert_eq!(result.content.as_ref(), b"monthly report");
    assert_eq!(result.content_type, "application/pdf");
    assert_eq!(result.file_name, "Informe_Mensual_1.pdf");
}

#[tokio::test]
async fn upload_conflicts_unless_overwrite_is_requested() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("docs", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let first = h
        .uploads
        .upload_bytes(
            folder.id,
            "nota.txt",
            Bytes::from_static(b"v1"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    let err = h
        .uploads
        .upload_bytes(
            folder.id,
            "nota.txt",
            Bytes::from_static(b"v2"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    let second = h
        .uploads
        .upload_bytes(
            folder.id,
            "nota.txt",
            Bytes::from_static(b"v2"),
            &NodeAttributes::default(),
            None,
            true,
        )
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.path, first.path);

    let result = h.downloads.download_file(second.id).await.unwrap();
    assert_eq!(result.content.as_ref(), b"v2");

    // The displaced payload is gone along with its node.
    assert!(h.downloads.download_file(first.id).await.is_err());
}

#[tokio::test]
async fn failed_overwrite_leaves_the_previous_payload_intact() {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::in_memory().await.unwrap();
    let backend = Arc::new(FlakyBackend::new(dir.path()).await);
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
    let uploads = UploadService::new(db.pool().clone(), storage.clone(), acting, events);
    let downloads = DownloadService::new(db.pool().clone(), storage);

    let folder = directories
        .create_directory_path("docs", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    let first = uploads
        .upload_bytes(
            folder.id,
            "nota.txt",
            Bytes::from_static(b"v1"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    backend.fail_puts.store(true, Ordering::SeqCst);
    let err = uploads
        .upload_bytes(
            folder.id,
            "nota.txt",
            Bytes::from_static(b"v2"),
            &NodeAttributes::default(),
            None,
            true,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("write refused"));
    backend.fail_puts.store(false, Ordering::SeqCst);

    // The rolled-back overwrite left both the row and its bytes in place.
    let result = downloads.download_file(first.id).await.unwrap();
    assert_eq!(result.content.as_ref(), b"v1");
}

#[tokio::test]
async fn upload_from_a_local_source_path() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("docs", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let staging = tempfile::tempdir().unwrap();
    let source = staging.path().join("contrato firmado.pdf");
    tokio::fs::write(&source, b"signed contract").await.unwrap();

    let node = h
        .uploads
        .upload_from_path(folder.id, &source, None, &NodeAttributes::default(), None, false)
        .await
        .unwrap();
    assert_eq!(node.name, "contrato_firmado.pdf");
    assert_eq!(node.size, 15);

    let result = h.downloads.download_file(node.id).await.unwrap();
    assert_eq!(result.content.as_ref(), b"signed contract");
}

#[tokio::test]
async fn upload_many_reports_per_item_failures() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("docs", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "dup.txt",
            Bytes::from_static(b"original"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    let err = h
        .uploads
        .upload_many(
            folder.id,
            vec![
                ("a.txt".to_string(), Bytes::from_static(b"a")),
                ("dup.txt".to_string(), Bytes::from_static(b"clash")),
                ("b.txt".to_string(), Bytes::from_static(b"b")),
            ],
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.uploaded.len(), 2);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, "dup.txt");
}

#[tokio::test]
async fn folder_download_packages_files_and_empty_folders() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr/Empleados/A", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.directories
        .create_subfolder(folder.id, "vacio", &NodeAttributes::default(), None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "contrato.pdf",
            Bytes::from_static(b"contract"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "dni.png",
            Bytes::from_static(b"image"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    let result = h.downloads.download_folder(folder.id, None).await.unwrap();
    assert_eq!(result.file_name, "A.zip");
    assert_eq!(result.content_type, "application/zip");

    let cursor = std::io::Cursor::new(result.content.to_vec());
    let mut archive = zip::ZipArchive::new(cursor).unwrap();
    assert_eq!(archive.len(), 3);

    let mut contract = String::new();
    archive
        .by_name("contrato.pdf")
        .unwrap()
        .read_to_string(&mut contract)
        .unwrap();
    assert_eq!(contract, "contract");
    assert!(archive.by_name("vacio/").unwrap().is_dir());
}

#[tokio::test]
async fn folder_download_uses_the_requested_archive_name() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let result = h
        .downloads
        .download_folder(folder.id, Some("expediente 2025"))
        .await
        .unwrap();
    assert_eq!(result.file_name, "expediente_2025.zip");
}

#[tokio::test]
async fn downloading_a_folder_as_a_file_is_rejected() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr", &NodeAttributes::default(), None, None)
        .await
        .unwrap();

    let err = h.downloads.download_file(folder.id).await.unwrap_err();
    assert!(err.to_string().contains("not a file"));
}

#[tokio::test]
async fn missing_payloads_are_skipped_in_folder_downloads() {
    let h = harness().await;
    let folder = h
        .directories
        .create_directory_path("hr", &NodeAttributes::default(), None, None)
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "kept.txt",
            Bytes::from_static(b"kept"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();
    h.uploads
        .upload_bytes(
            folder.id,
            "lost.txt",
            Bytes::from_static(b"lost"),
            &NodeAttributes::default(),
            None,
            false,
        )
        .await
        .unwrap();

    // Remove every payload behind the service's back.
    let files_dir = h._dir.path().join("files");
    std::fs::remove_dir_all(&files_dir).unwrap();

    let result = h.downloads.download_folder(folder.id, None).await.unwrap();
    let cursor = std::io::Cursor::new(result.content.to_vec());
    let archive = zip::ZipArchive::new(cursor).unwrap();
    assert_eq!(archive.len(), 0);
}
