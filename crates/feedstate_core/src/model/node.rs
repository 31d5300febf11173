//! Subscription tree node model.
//!
//! # Responsibility
//! - Describe feeds and folders as seen by state propagation.
//! - Carry the cached unread aggregate and its dirty flag.
//!
//! # Invariants
//! - `children` is only populated for `NodeKind::Folder`.
//! - `needs_recount == true` means `unread_count` may be stale.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// String identifier of a feed or folder.
pub type NodeId = String;

/// Handler id used by folders and by nodes without a remote backend.
pub const LOCAL_SOURCE: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Subscription that owns items.
    Feed,
    /// Grouping node; its unread count is the sum of its children.
    Folder,
}

/// One node of the subscription tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Subscription handler id deciding how state changes are committed.
    pub source: String,
    pub unread_count: u32,
    pub needs_recount: bool,
}

impl Node {
    /// Creates a feed node backed by the given subscription handler.
    pub fn feed(
        id: impl Into<NodeId>,
        title: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Feed,
            title: title.into(),
            parent_id: None,
            children: Vec::new(),
            source: source.into(),
            unread_count: 0,
            needs_recount: false,
        }
    }

    /// Creates a folder node.
    pub fn folder(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Folder,
            ..Self::feed(id, title, LOCAL_SOURCE)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Generates a fresh node id.
pub fn generate_node_id() -> NodeId {
    Uuid::new_v4().simple().to_string()
}
