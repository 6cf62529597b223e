//! File uploads: byte buffers and local source paths into the vault.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::events::{EventSink, NodeEvent};
use legajo_core::result::AppResult;
use legajo_entity::node::{Node, NodeAttributes};
use legajo_storage::StorageService;

use crate::acting_user::ActingUserResolver;
use crate::tree::TreeService;

/// A batch upload that did not fully succeed.
///
/// Items uploaded before (and after) the failures are committed and
/// listed in `uploaded`; the batch is not atomic.
#[derive(Debug, Error)]
#[error("{} of {} uploads failed", failures.len(), failures.len() + uploaded.len())]
pub struct BatchUploadError {
    /// Files that made it in.
    pub uploaded: Vec<Node>,
    /// Original file name and failure per failed item.
    pub failures: Vec<(String, AppError)>,
}

/// Brings file content into the vault: one node row plus one payload per
/// upload, committed together.
#[derive(Debug, Clone)]
pub struct UploadService {
    pool: SqlitePool,
    tree: TreeService,
    storage: StorageService,
    acting_user: ActingUserResolver,
    events: Arc<dyn EventSink>,
}

fn tx_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

impl UploadService {
    /// Build the upload service.
    pub fn new(
        pool: SqlitePool,
        storage: StorageService,
        acting_user: ActingUserResolver,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            pool,
            tree: TreeService::new(),
            storage,
            acting_user,
            events,
        }
    }

    /// Upload an in-memory buffer as a file under `parent_id`.
    ///
    /// The name is sanitized before it becomes part of the logical path.
    /// With `overwrite` an existing node at the resulting path is
    /// replaced, payload included; without it the upload is a conflict.
    pub async fn upload_bytes(
        &self,
        parent_id: i64,
        file_name: &str,
        content: Bytes,
        attrs: &NodeAttributes,
        creator: Option<i64>,
        overwrite: bool,
    ) -> AppResult<Node> {
        let creator = self.acting_user.resolve(creator).await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(tx_err("Failed to begin transaction"))?;

        let created = self
            .tree
            .create_file(
                &mut *tx,
                parent_id,
                file_name,
                content.len() as i64,
                attrs,
                creator,
                overwrite,
            )
            .await?;
        // Distinct hash keys: the replaced payload is removed only once
        // the new one is stored, so a failed put rolls back to an intact
        // predecessor.
        self.storage.put_file_checked(&created.node, content).await?;
        if let Some(replaced) = &created.replaced {
            self.storage.delete_node_checked(replaced, true, None).await?;
        }

        tx.commit().await.map_err(tx_err("Failed to commit upload"))?;

        info!(
            node_id = created.node.id,
            path = %created.node.path,
            size = created.node.size,
            "Uploaded file"
        );
        self.events.emit(NodeEvent::Created {
            node_id: created.node.id,
            hash: created.node.hash,
            path: created.node.path.clone(),
        });
        Ok(created.node)
    }

    /// Upload a file from a local filesystem path.
    ///
    /// The stored name defaults to the source file name.
    pub async fn upload_from_path(
        &self,
        parent_id: i64,
        source: &Path,
        file_name: Option<&str>,
        attrs: &NodeAttributes,
        creator: Option<i64>,
        overwrite: bool,
    ) -> AppResult<Node> {
        let metadata = tokio::fs::metadata(source).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Validation,
                format!("Source file '{}' is not readable", source.display()),
                e,
            )
        })?;
        if !metadata.is_file() {
            return Err(AppError::validation(format!(
                "Source '{}' is not a regular file",
                source.display()
            )));
        }
        let name = match file_name {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "Source '{}' has no file name",
                        source.display()
                    ))
                })?,
        };

        let creator = self.acting_user.resolve(creator).await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(tx_err("Failed to begin transaction"))?;

        let created = self
            .tree
            .create_file(
                &mut *tx,
                parent_id,
                &name,
                metadata.len() as i64,
                attrs,
                creator,
                overwrite,
            )
            .await?;
        self.storage
            .put_file_from_path_checked(&created.node, source)
            .await?;
        if let Some(replaced) = &created.replaced {
            self.storage.delete_node_checked(replaced, true, None).await?;
        }

        tx.commit().await.map_err(tx_err("Failed to commit upload"))?;

        self.events.emit(NodeEvent::Created {
            node_id: created.node.id,
            hash: created.node.hash,
            path: created.node.path.clone(),
        });
        Ok(created.node)
    }

    /// Upload several buffers under one folder.
    ///
    /// Each item runs in its own transaction; one failure does not stop
    /// the rest. When any item failed the whole call returns
    /// [`BatchUploadError`] carrying both halves.
    pub async fn upload_many(
        &self,
        parent_id: i64,
        items: Vec<(String, Bytes)>,
        attrs: &NodeAttributes,
        creator: Option<i64>,
        overwrite: bool,
    ) -> Result<Vec<Node>, BatchUploadError> {
        let mut uploaded = Vec::new();
        let mut failures = Vec::new();
        for (name, content) in items {
            match self
                .upload_bytes(parent_id, &name, content, attrs, creator, overwrite)
                .await
            {
                Ok(node) => uploaded.push(node),
                Err(err) => {
                    warn!(file_name = %name, error = %err, "Batch upload item failed");
                    failures.push((name, err));
                }
            }
        }
        if failures.is_empty() {
            Ok(uploaded)
        } else {
            Err(BatchUploadError { uploaded, failures })
        }
    }
}
