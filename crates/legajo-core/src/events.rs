//! Node-related domain events and the collaborator sink trait.
//!
//! Legajo exposes an extension point for "node created/moved/deleted"
//! notifications without implementing its own async dispatch: the
//! orchestrator emits into an [`EventSink`] after an operation has fully
//! succeeded and never consumes a return value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events related to logical tree mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    /// A node (folder or file) was created.
    Created {
        /// The node ID.
        node_id: i64,
        /// The node's immutable hash.
        hash: Uuid,
        /// The logical path at creation.
        path: String,
    },
    /// A folder subtree was moved.
    Moved {
        /// The moved node ID.
        node_id: i64,
        /// The path before the move.
        from_path: String,
        /// The path after the move.
        to_path: String,
    },
    /// A node was soft-deleted (trashed) or force-deleted.
    Deleted {
        /// The node ID.
        node_id: i64,
        /// The path at deletion.
        path: String,
        /// Whether the delete was permanent.
        forced: bool,
    },
    /// A trashed node was restored.
    Restored {
        /// The node ID.
        node_id: i64,
        /// The path the node was restored to.
        path: String,
    },
}

/// Fire-and-forget event sink consumed by the orchestrator.
///
/// Implementations must not block for long; the core never inspects a
/// result and never retries.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Deliver one event.
    fn emit(&self, event: NodeEvent);
}

/// Default sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: NodeEvent) {}
}
