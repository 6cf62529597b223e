//! S3-compatible object storage backend (requires the `s3` feature).
//!
//! Folders are represented by zero-byte marker objects suffixed
//! `.directory`; everything else follows the same flat-hash key scheme as
//! the local backend. Trash metadata lives in JSON documents under
//! `trash/metadata/`, same as on disk, so the two backends stay portable.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{Duration, Utc};
use tracing::debug;

use legajo_core::config::storage::S3StorageConfig;
use legajo_core::error::{AppError, ErrorKind};
use legajo_core::result::AppResult;
use legajo_entity::node::Node;
use legajo_entity::trash::{TrashItem, TrashMetadata};

use crate::backend::StorageBackend;
use crate::keys;

/// Suffix appended to folder marker object keys.
const DIRECTORY_MARKER_SUFFIX: &str = ".directory";

/// S3-compatible storage backend.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Create a new S3 backend from configuration.
    pub async fn new(config: &S3StorageConfig) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("S3 bucket name is not configured"));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if !config.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "legajo-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }
        let client = Client::from_conf(builder.build());

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = %config.endpoint,
            "Initialized S3 storage backend"
        );
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Canonical object key; folders get the marker suffix.
    fn object_key(node: &Node) -> String {
        let key = keys::canonical_key(node);
        if node.is_folder() {
            format!("{key}{DIRECTORY_MARKER_SUFFIX}")
        } else {
            key
        }
    }

    /// Trash mirror of [`Self::object_key`].
    fn trash_object_key(node: &Node) -> String {
        format!("{}/{}", keys::TRASH_PREFIX, Self::object_key(node))
    }

    async fn head(&self, key: &str) -> AppResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0) as u64)),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(None)
                } else {
                    Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("S3 head failed for key: {key}"),
                        service,
                    ))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => {
                let data = resp.body.collect().await.map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("S3 body read failed for key: {key}"),
                        e,
                    )
                })?;
                Ok(Some(data.into_bytes()))
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("S3 get failed for key: {key}"),
                        service,
                    ))
                }
            }
        }
    }

    async fn put(&self, key: &str, body: Bytes) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 put failed for key: {key}"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 delete failed for key: {key}"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> AppResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, from))
            .key(to)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 copy failed: {from} -> {to}"),
                    e,
                )
            })?;
        Ok(())
    }

    /// List object keys under a prefix.
    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut keys_out = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 list failed for prefix: {prefix}"),
                    e,
                )
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys_out.push(key.to_string());
                }
            }
        }
        Ok(keys_out)
    }

    async fn read_trash_metadata(&self, hash: uuid::Uuid) -> AppResult<Option<TrashMetadata>> {
        match self.get(&keys::trash_metadata_key(hash)).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn backend_type(&self) -> &str {
        "s3"
    }

    async fn create_directory(&self, node: &Node) -> AppResult<bool> {
        if !node.is_folder() {
            return Err(AppError::validation(format!(
                "Node {} is not a folder",
                node.id
            )));
        }
        self.put(&Self::object_key(node), Bytes::new()).await?;
        debug!(node_id = node.id, key = %Self::object_key(node), "Created directory marker object");
        Ok(true)
    }

    async fn directory_exists(&self, node: &Node) -> AppResult<bool> {
        Ok(self.head(&Self::object_key(node)).await?.is_some())
    }

    async fn put_file(&self, node: &Node, content: Bytes) -> AppResult<bool> {
        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node {} is not a file",
                node.id
            )));
        }
        self.put(&Self::object_key(node), content).await?;
        Ok(true)
    }

    async fn put_file_from_path(&self, node: &Node, source: &Path) -> AppResult<bool> {
        if !node.is_file() {
            return Err(AppError::validation(format!(
                "Node {} is not a file",
                node.id
            )));
        }
        let data = tokio::fs::read(source).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Validation,
                format!("Source not readable: {}", source.display()),
                e,
            )
        })?;
        self.put(&Self::object_key(node), Bytes::from(data)).await?;
        Ok(true)
    }

    async fn get_file(&self, node: &Node) -> AppResult<Option<Bytes>> {
        self.get(&Self::object_key(node)).await
    }

    async fn get_file_size(&self, node: &Node) -> AppResult<Option<u64>> {
        self.head(&Self::object_key(node)).await
    }

    async fn delete_file(&self, node: &Node) -> AppResult<bool> {
        let key = Self::object_key(node);
        if self.head(&key).await?.is_none() {
            return Ok(false);
        }
        self.delete(&key).await?;
        Ok(true)
    }

    async fn delete_directory(&self, node: &Node, _recursive: bool) -> AppResult<bool> {
        // A folder is a single marker object; recursion has no meaning.
        let key = Self::object_key(node);
        if self.head(&key).await?.is_none() {
            return Ok(false);
        }
        self.delete(&key).await?;
        Ok(true)
    }

    async fn move_directory(&self, node: &Node, old_path: &str) -> AppResult<bool> {
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
        let key = Self::object_key(node);
        if self.head(&key).await?.is_none() {
            return Ok(false);
        }

        let trash_key = Self::trash_object_key(node);
        self.copy(&key, &trash_key).await?;

        let metadata = TrashMetadata::for_node(node, &key, deleted_by);
        self.put(
            &keys::trash_metadata_key(node.hash),
            Bytes::from(serde_json::to_vec(&metadata)?),
        )
        .await?;

        self.delete(&key).await?;
        debug!(node_id = node.id, key = %key, "Moved object to trash");
        Ok(true)
    }

    async fn restore_from_trash(
        &self,
        node: &Node,
        custom_destination: Option<&str>,
    ) -> AppResult<bool> {
        let trash_key = Self::trash_object_key(node);
        if self.head(&trash_key).await?.is_none() {
            return Ok(false);
        }

        let metadata = self.read_trash_metadata(node.hash).await?;
        let destination = custom_destination
            .map(String::from)
            .or_else(|| metadata.as_ref().map(|m| m.original_path.clone()))
            .unwrap_or_else(|| Self::object_key(node));

        if self.head(&destination).await?.is_some() {
            return Err(AppError::conflict(format!(
                "Restore destination already occupied: {destination}"
            )));
        }

        self.copy(&trash_key, &destination).await?;
        self.delete(&trash_key).await?;
        self.delete(&keys::trash_metadata_key(node.hash)).await?;

        debug!(node_id = node.id, destination = %destination, "Restored object from trash");
        Ok(true)
    }

    async fn purge_trash(&self, node: &Node) -> AppResult<bool> {
        let trash_key = Self::trash_object_key(node);
        let existed = self.head(&trash_key).await?.is_some();
        if existed {
            self.delete(&trash_key).await?;
            debug!(node_id = node.id, key = %trash_key, "Purged trash object");
        }
        self.delete(&keys::trash_metadata_key(node.hash)).await?;
        Ok(existed)
    }

    async fn list_trash_items(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>> {
        let mut items = Vec::new();
        for prefix in [
            format!("{}/{}/", keys::TRASH_PREFIX, keys::FILES_PREFIX),
            format!("{}/{}/", keys::TRASH_PREFIX, keys::FOLDERS_PREFIX),
        ] {
            for key in self.list_keys(&prefix).await? {
                let Some(hash) = keys::hash_from_key(&key) else {
                    continue;
                };
                let metadata = self.read_trash_metadata(hash).await?;
                items.push(TrashItem {
                    hash,
                    trash_key: key,
                    metadata,
                });
            }
        }

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
            let Some(metadata) = &item.metadata else {
                // Without a metadata document the deletion time is unknown;
                // leave the entry for manual cleanup.
                continue;
            };
            if metadata.deleted_at >= cutoff {
                continue;
            }
            self.delete(&item.trash_key).await?;
            self.delete(&keys::trash_metadata_key(item.hash)).await?;
            purged += 1;
        }
        Ok(purged)
    }
}
