//! File and folder downloads.
//!
//! Single files come back as their raw bytes with a content type derived
//! from the extension. Folders are packaged into a ZIP archive whose
//! entry paths mirror the logical subtree relative to the downloaded
//! folder.

use std::io::{Cursor, Write};

use bytes::Bytes;
use sqlx::SqlitePool;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::result::AppResult;
use legajo_database::repositories::NodeRepository;
use legajo_entity::node::{IncludeStates, Node};
use legajo_storage::StorageService;

use crate::tree::sanitize::sanitize_archive_name;
use crate::tree::TreeService;

use super::mime::mime_type_for;

/// Content ready to be served: bytes plus the headers' worth of metadata.
#[derive(Debug)]
pub struct DownloadResult {
    /// Suggested file name for Content-Disposition.
    pub file_name: String,
    /// MIME type for Content-Type.
    pub content_type: String,
    /// The content itself.
    pub content: Bytes,
}

/// Serves file payloads and folder archives out of the vault.
#[derive(Debug, Clone)]
pub struct DownloadService {
    pool: SqlitePool,
    tree: TreeService,
    repo: NodeRepository,
    storage: StorageService,
}

fn conn_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

impl DownloadService {
    /// Build the download service.
    pub fn new(pool: SqlitePool, storage: StorageService) -> Self {
        Self {
            pool,
            tree: TreeService::new(),
            repo: NodeRepository,
            storage,
        }
    }

    /// Download one file's content.
    pub async fn download_file(&self, file_id: i64) -> AppResult<DownloadResult> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(conn_err("Failed to acquire connection"))?;
        let node = self
            .tree
            .require_node(&mut *conn, file_id, IncludeStates::ActiveOnly)
            .await?;
        drop(conn);

        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node '{}' is not a file",
                node.path
            )));
        }

        let content = self
            .storage
            .get_file_checked(&node)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Payload of '{}' is missing from storage", node.path))
            })?;

        Ok(DownloadResult {
            file_name: node.name.clone(),
            content_type: mime_type_for(node.extension.as_deref()).to_string(),
            content,
        })
    }

    /// Download a folder subtree as a ZIP archive.
    ///
    /// Folder descendants become directory entries (empty folders
    /// included), file descendants become file entries. A file whose
    /// payload is missing is skipped with a warning rather than failing
    /// the whole archive.
    pub async fn download_folder(
        &self,
        folder_id: i64,
        archive_name: Option<&str>,
    ) -> AppResult<DownloadResult> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(conn_err("Failed to acquire connection"))?;
        let folder = self
            .tree
            .require_folder(&mut *conn, folder_id, IncludeStates::ActiveOnly)
            .await?;
        let descendants = self
            .repo
            .descendants(&mut *conn, folder.lft, folder.rgt, IncludeStates::ActiveOnly)
            .await?;
        drop(conn);

        let mut entries = Vec::with_capacity(descendants.len());
        for node in &descendants {
            let relative = self.tree.relative_path_from_base(node, &folder)?;
            let content = if node.is_file() {
                match self.storage.get_file(node).await {
                    Some(content) => Some(content),
                    None => {
                        warn!(
                            node_id = node.id,
                            path = %node.path,
                            "Skipping file with missing payload in folder download"
                        );
                        continue;
                    }
                }
            } else {
                None
            };
            entries.push((relative, node, content));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let archive = build_archive(&entries)?;
        let name = sanitize_archive_name(archive_name.unwrap_or(&folder.name));

        Ok(DownloadResult {
            file_name: name,
            content_type: "application/zip".to_string(),
            content: archive,
        })
    }
}

fn zip_err(e: zip::result::ZipError) -> AppError {
    AppError::with_source(ErrorKind::Internal, "Failed to build archive", e)
}

fn build_archive(entries: &[(String, &Node, Option<Bytes>)]) -> AppResult<Bytes> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (relative, node, content) in entries {
        if node.is_folder() {
            writer
                .add_directory(format!("{relative}/"), options)
                .map_err(zip_err)?;
        } else if let Some(content) = content {
            writer.start_file(relative.as_str(), options).map_err(zip_err)?;
            writer.write_all(content).map_err(|e| {
                AppError::with_source(ErrorKind::Internal, "Failed to write archive entry", e)
            })?;
        }
    }

    let cursor = writer.finish().map_err(zip_err)?;
    Ok(Bytes::from(cursor.into_inner()))
}
