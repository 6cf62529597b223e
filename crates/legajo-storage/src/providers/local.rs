//! Local filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use tokio::fs;
use tracing::debug;

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::result::AppResult;
use legajo_entity::node::Node;
use legajo_entity::trash::{TrashItem, TrashMetadata};

use crate::backend::StorageBackend;
use crate::keys;

/// Local filesystem backend rooted at a configured directory.
///
/// Layout under the root mirrors the canonical key scheme: `files/`,
/// `folders/`, `trash/` and `trash/metadata/`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root directory for all stored payloads.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Resolve a storage key to an absolute path within the root.
    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Copy a directory tree. Folder markers are normally empty; copy
    /// recursively anyway.
    async fn copy_dir(&self, from: &Path, to: &Path) -> AppResult<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create directory: {}", dst.display()),
                    e,
                )
            })?;
            let mut entries = fs::read_dir(&src).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read directory: {}", src.display()),
                    e,
                )
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
            })? {
                let entry_src = entry.path();
                let entry_dst = dst.join(entry.file_name());
                let file_type = entry.file_type().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Failed to stat entry", e)
                })?;
                if file_type.is_dir() {
                    pending.push((entry_src, entry_dst));
                } else {
                    fs::copy(&entry_src, &entry_dst).await.map_err(|e| {
                        AppError::with_source(
                            ErrorKind::Storage,
                            format!("Failed to copy {}", entry_src.display()),
                            e,
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    async fn write_trash_metadata(&self, metadata: &TrashMetadata, hash: uuid::Uuid) -> AppResult<()> {
        let path = self.resolve(&keys::trash_metadata_key(hash));
        self.ensure_parent(&path).await?;
        let body = serde_json::to_vec_pretty(metadata)?;
        fs::write(&path, body).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write trash metadata: {}", path.display()),
                e,
            )
        })
    }

    async fn read_trash_metadata(&self, hash: uuid::Uuid) -> AppResult<Option<TrashMetadata>> {
        let path = self.resolve(&keys::trash_metadata_key(hash));
        match fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to read trash metadata: {}", path.display()),
                e,
            )),
        }
    }

    async fn remove_trash_metadata(&self, hash: uuid::Uuid) -> AppResult<()> {
        let path = self.resolve(&keys::trash_metadata_key(hash));
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to remove trash metadata: {}", path.display()),
                e,
            )),
        }
    }

    /// Remove a payload path, file or directory.
    async fn remove_payload(&self, path: &Path) -> AppResult<()> {
        let meta = fs::metadata(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to stat payload: {}", path.display()),
                e,
            )
        })?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        result.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to remove payload: {}", path.display()),
                e,
            )
        })
    }

    /// Collect trash payload entries under one trash sub-namespace.
    async fn trash_entries(&self, prefix: &str, out: &mut Vec<(String, uuid::Uuid)>) -> AppResult<()> {
        let dir = self.resolve(prefix);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to list trash: {}", dir.display()),
                    e,
                ))
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to read trash entry", e)
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            let key = format!("{prefix}/{name}");
            if let Some(hash) = keys::hash_from_key(&key) {
                out.push((key, hash));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn backend_type(&self) -> &str {
        "local"
    }

    async fn create_directory(&self, node: &Node) -> AppResult<bool> {
        if !node.is_folder() {
            return Err(AppError::validation(format!(
                "Node {} is not a folder",
                node.id
            )));
        }
        let path = self.resolve(&keys::canonical_key(node));
        fs::create_dir_all(&path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create directory: {}", path.display()),
                e,
            )
        })?;
        debug!(node_id = node.id, key = %keys::canonical_key(node), "Created directory marker");
        Ok(true)
    }

    async fn directory_exists(&self, node: &Node) -> AppResult<bool> {
        let path = self.resolve(&keys::canonical_key(node));
        if node.is_folder() {
            Ok(path.is_dir())
        } else {
            Ok(path.is_file())
        }
    }

    async fn put_file(&self, node: &Node, content: Bytes) -> AppResult<bool> {
        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node {} is not a file",
                node.id
            )));
        }
        let path = self.resolve(&keys::canonical_key(node));
        self.ensure_parent(&path).await?;
        fs::write(&path, &content).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write file: {}", path.display()),
                e,
            )
        })?;
        debug!(node_id = node.id, bytes = content.len(), "Wrote file payload");
        Ok(true)
    }

    async fn put_file_from_path(&self, node: &Node, source: &Path) -> AppResult<bool> {
        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node {} is not a file",
                node.id
            )));
        }
        let source_meta = fs::metadata(source).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Validation,
                format!("Source not readable: {}", source.display()),
                e,
            )
        })?;
        if !source_meta.is_file() {
            return Err(AppError::validation(format!(
                "Source is not a file: {}",
                source.display()
            )));
        }

        let path = self.resolve(&keys::canonical_key(node));
        self.ensure_parent(&path).await?;
        fs::copy(source, &path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to copy into storage: {}", path.display()),
                e,
            )
        })?;
        Ok(true)
    }

    async fn get_file(&self, node: &Node) -> AppResult<Option<Bytes>> {
        let path = self.resolve(&keys::canonical_key(node));
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to read file: {}", path.display()),
                e,
            )),
        }
    }

    async fn get_file_size(&self, node: &Node) -> AppResult<Option<u64>> {
        let path = self.resolve(&keys::canonical_key(node));
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to stat file: {}", path.display()),
                e,
            )),
        }
    }

    async fn delete_file(&self, node: &Node) -> AppResult<bool> {
        let path = self.resolve(&keys::canonical_key(node));
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete file: {}", path.display()),
                e,
            )),
        }
    }

    async fn delete_directory(&self, node: &Node, recursive: bool) -> AppResult<bool> {
        let path = self.resolve(&keys::canonical_key(node));
        if !path.exists() {
            return Ok(false);
        }
        let result = if recursive {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_dir(&path).await
        };
        result.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete directory: {}", path.display()),
                e,
            )
        })?;
        Ok(true)
    }

    async fn move_directory(&self, node: &Node, old_path: &str) -> AppResult<bool> {
        // Flat-hash layout: the physical key ignores the logical path.
        debug!(
            node_id = node.id,
            old_path,
            new_path = %node.path,
            "Logical directory move, physical no-op"
        );
        Ok(true)
    }

    async fn move_file(&self, node: &Node, old_path: &str) -> AppResult<bool> {
        debug!(
            node_id = node.id,
            old_path,
            new_path = %node.path,
            "Logical file move, physical no-op"
        );
        Ok(true)
    }

    async fn move_to_trash(&self, node: &Node, deleted_by: Option<i64>) -> AppResult<bool> {
        let canonical = keys::canonical_key(node);
        let src = self.resolve(&canonical);
        if !src.exists() {
            return Ok(false);
        }

        let dst = self.resolve(&keys::trash_key(node));
        self.ensure_parent(&dst).await?;
        if node.is_folder() {
            self.copy_dir(&src, &dst).await?;
        } else {
            fs::copy(&src, &dst).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to copy into trash: {}", dst.display()),
                    e,
                )
            })?;
        }

        let metadata = TrashMetadata::for_node(node, &canonical, deleted_by);
        self.write_trash_metadata(&metadata, node.hash).await?;
        self.remove_payload(&src).await?;

        debug!(node_id = node.id, key = %canonical, "Moved payload to trash");
        Ok(true)
    }

    async fn restore_from_trash(
        &self,
        node: &Node,
        custom_destination: Option<&str>,
    ) -> AppResult<bool> {
        let trash_path = self.resolve(&keys::trash_key(node));
        if !trash_path.exists() {
            return Ok(false);
        }

        let metadata = self.read_trash_metadata(node.hash).await?;
        let destination_key = custom_destination
            .map(String::from)
            .or_else(|| metadata.as_ref().map(|m| m.original_path.clone()))
            .unwrap_or_else(|| keys::canonical_key(node));

        let destination = self.resolve(&destination_key);
        if destination.exists() {
            return Err(AppError::conflict(format!(
                "Restore destination already occupied: {destination_key}"
            )));
        }

        self.ensure_parent(&destination).await?;
        let trash_meta = fs::metadata(&trash_path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to stat trash payload", e)
        })?;
        if trash_meta.is_dir() {
            self.copy_dir(&trash_path, &destination).await?;
        } else {
            fs::copy(&trash_path, &destination).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to restore payload to: {}", destination.display()),
                    e,
                )
            })?;
        }

        self.remove_payload(&trash_path).await?;
        self.remove_trash_metadata(node.hash).await?;

        debug!(node_id = node.id, destination = %destination_key, "Restored payload from trash");
        Ok(true)
    }

    async fn purge_trash(&self, node: &Node) -> AppResult<bool> {
        let trash_path = self.resolve(&keys::trash_key(node));
        let existed = trash_path.exists();
        if existed {
            self.remove_payload(&trash_path).await?;
        }
        self.remove_trash_metadata(node.hash).await?;
        if existed {
            debug!(node_id = node.id, key = %keys::trash_key(node), "Purged trash entry");
        }
        Ok(existed)
    }

    async fn list_trash_items(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>> {
        let mut entries = Vec::new();
        self.trash_entries(&format!("{}/{}", keys::TRASH_PREFIX, keys::FILES_PREFIX), &mut entries)
            .await?;
        self.trash_entries(
            &format!("{}/{}", keys::TRASH_PREFIX, keys::FOLDERS_PREFIX),
            &mut entries,
        )
        .await?;

        let mut items = Vec::with_capacity(entries.len());
        for (trash_key, hash) in entries {
            let metadata = self.read_trash_metadata(hash).await?;
            items.push(TrashItem {
                hash,
                trash_key,
                metadata,
            });
        }

        // Newest deletions first; entries without metadata sink to the end.
        items.sort_by(|a, b| {
            let a_time = a.metadata.as_ref().map(|m| m.deleted_at);
            let b_time = b.metadata.as_ref().map(|m| m.deleted_at);
            b_time.cmp(&a_time)
        });

        let offset = offset.unwrap_or(0);
        let items: Vec<TrashItem> = items.into_iter().skip(offset).collect();
        Ok(match limit {
            Some(limit) => items.into_iter().take(limit).collect(),
            None => items,
        })
    }

    async fn empty_trash(&self, older_than_days: u32) -> AppResult<usize> {
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let items = self.list_trash_items(None, None).await?;

        let mut purged = 0usize;
        for item in items {
            let deleted_at = match &item.metadata {
                Some(metadata) => metadata.deleted_at,
                None => {
                    // No metadata; fall back to the filesystem timestamp.
                    let path = self.resolve(&item.trash_key);
                    match fs::metadata(&path).await.ok().and_then(|m| m.modified().ok()) {
                        Some(modified) => chrono::DateTime::<Utc>::from(modified),
                        None => continue,
                    }
                }
            };
            if deleted_at >= cutoff {
                continue;
            }
            self.remove_payload(&self.resolve(&item.trash_key)).await?;
            self.remove_trash_metadata(item.hash).await?;
            purged += 1;
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use legajo_entity::node::NodeType;
    use uuid::Uuid;

    fn test_node(node_type: NodeType, extension: Option<&str>) -> Node {
        Node {
            id: 42,
            node_type,
            name: "contrato.pdf".into(),
            path: "hr/contrato.pdf".into(),
            hash: Uuid::new_v4(),
            size: 0,
            extension: extension.map(String::from),
            owner_id: Some(1),
            created_by: Some(1),
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

    async fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn put_get_delete_file() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));

        assert!(backend.put_file(&node, Bytes::from("payload")).await.unwrap());
        assert_eq!(
            backend.get_file(&node).await.unwrap(),
            Some(Bytes::from("payload"))
        );
        assert_eq!(backend.get_file_size(&node).await.unwrap(), Some(7));

        assert!(backend.delete_file(&node).await.unwrap());
        assert!(!backend.delete_file(&node).await.unwrap());
        assert_eq!(backend.get_file(&node).await.unwrap(), None);
    }

    #[tokio::test]
    async fn directory_marker_lifecycle() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::Folder, None);

        assert!(!backend.directory_exists(&node).await.unwrap());
        assert!(backend.create_directory(&node).await.unwrap());
        assert!(backend.directory_exists(&node).await.unwrap());
        assert!(backend.delete_directory(&node, true).await.unwrap());
        assert!(!backend.directory_exists(&node).await.unwrap());
    }

    #[tokio::test]
    async fn create_directory_rejects_files() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));
        let err = backend.create_directory(&node).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn trash_round_trip_preserves_bytes_and_key() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));
        backend.put_file(&node, Bytes::from("original bytes")).await.unwrap();

        assert!(backend.move_to_trash(&node, Some(9)).await.unwrap());
        assert_eq!(backend.get_file(&node).await.unwrap(), None);

        let items = backend.list_trash_items(None, None).await.unwrap();
        assert_eq!(items.len(), 1);
        let metadata = items[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.deleted_by, Some(9));
        assert_eq!(metadata.original_path, keys::canonical_key(&node));

        assert!(backend.restore_from_trash(&node, None).await.unwrap());
        assert_eq!(
            backend.get_file(&node).await.unwrap(),
            Some(Bytes::from("original bytes"))
        );
        assert!(backend.list_trash_items(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_refuses_occupied_destination() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));
        backend.put_file(&node, Bytes::from("v1")).await.unwrap();
        backend.move_to_trash(&node, None).await.unwrap();
        backend.put_file(&node, Bytes::from("v2")).await.unwrap();

        let err = backend.restore_from_trash(&node, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        // The occupying payload is untouched.
        assert_eq!(backend.get_file(&node).await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn empty_trash_honors_cutoff() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));
        backend.put_file(&node, Bytes::from("x")).await.unwrap();
        backend.move_to_trash(&node, None).await.unwrap();

        // Fresh item survives a 1-day retention pass.
        assert_eq!(backend.empty_trash(1).await.unwrap(), 0);
        assert_eq!(backend.list_trash_items(None, None).await.unwrap().len(), 1);

        // A zero-day cutoff purges everything already trashed.
        assert_eq!(backend.empty_trash(0).await.unwrap(), 1);
        assert!(backend.list_trash_items(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_from_path_validates_source() {
        let (_dir, backend) = backend().await;
        let node = test_node(NodeType::File, Some("pdf"));

        let err = backend
            .put_file_from_path(&node, Path::new("/nonexistent/source.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("source.pdf");
        tokio::fs::write(&src, b"from disk").await.unwrap();
        assert!(backend.put_file_from_path(&node, &src).await.unwrap());
        assert_eq!(
            backend.get_file(&node).await.unwrap(),
            Some(Bytes::from("from disk"))
        );
    }
}
