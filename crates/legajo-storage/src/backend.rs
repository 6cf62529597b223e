//! Storage backend trait for pluggable physical media.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use legajo_core::result::AppResult;
use legajo_entity::node::Node;
use legajo_entity::trash::TrashItem;

/// Trait for physical storage backends.
///
/// Implementations exist for the local filesystem and S3-compatible
/// object stores. All keys are derived from the node's immutable hash via
/// [`crate::keys`], so logical path changes never move bytes.
///
/// Failure semantics: "item not found" is `Ok(false)` / `Ok(None)`, never
/// an error. `Err` is reserved for transport and permission failures; this
/// layer is the only one that catches raw I/O errors, everything above
/// deals in `AppResult` and sentinels.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Return the backend type name (e.g., "local", "s3").
    fn backend_type(&self) -> &str;

    /// Create the physical marker for a folder node at its canonical key.
    async fn create_directory(&self, node: &Node) -> AppResult<bool>;

    /// Check whether a node exists physically (folders by their marker,
    /// files by their content key).
    async fn directory_exists(&self, node: &Node) -> AppResult<bool>;

    /// Write file content to the node's canonical key.
    async fn put_file(&self, node: &Node, content: Bytes) -> AppResult<bool>;

    /// Copy a local file into the node's canonical key. Validates source
    /// readability before any transfer.
    async fn put_file_from_path(&self, node: &Node, source: &Path) -> AppResult<bool>;

    /// Read raw file content; `None` when the key does not exist.
    async fn get_file(&self, node: &Node) -> AppResult<Option<Bytes>>;

    /// Size of the stored payload; `None` when the key does not exist.
    async fn get_file_size(&self, node: &Node) -> AppResult<Option<u64>>;

    /// Permanently remove a file payload. `false` when nothing existed.
    async fn delete_file(&self, node: &Node) -> AppResult<bool>;

    /// Permanently remove a folder marker. `false` when nothing existed.
    async fn delete_directory(&self, node: &Node, recursive: bool) -> AppResult<bool>;

    /// Logical folder move. A no-op returning `true` in the flat-hash
    /// layout; implementations only log.
    async fn move_directory(&self, node: &Node, old_path: &str) -> AppResult<bool>;

    /// Logical file move. A no-op returning `true`; see
    /// [`Self::move_directory`].
    async fn move_file(&self, node: &Node, old_path: &str) -> AppResult<bool>;

    /// Copy the payload into the trash namespace, write the metadata
    /// side-channel document, then delete the original.
    async fn move_to_trash(&self, node: &Node, deleted_by: Option<i64>) -> AppResult<bool>;

    /// Restore a trashed payload. Destination resolution: custom >
    /// original key from metadata > canonical key. Refuses an occupied
    /// destination with a conflict error; removes the trash copy and its
    /// metadata on success. `false` when no trash copy exists.
    async fn restore_from_trash(
        &self,
        node: &Node,
        custom_destination: Option<&str>,
    ) -> AppResult<bool>;

    /// Permanently remove a trashed payload and its metadata document.
    /// `false` when no trash copy exists; stale metadata is removed either
    /// way.
    async fn purge_trash(&self, node: &Node) -> AppResult<bool>;

    /// Enumerate trash entries merged with their metadata, deletion time
    /// descending.
    async fn list_trash_items(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> AppResult<Vec<TrashItem>>;

    /// Permanently purge trash entries (payload and metadata) older than
    /// the cutoff. Returns the number of purged payloads.
    async fn empty_trash(&self, older_than_days: u32) -> AppResult<usize>;
}
