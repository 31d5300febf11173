//! In-memory subscription tree and node lookup.
//!
//! # Responsibility
//! - Own feed and folder nodes for the lifetime of the process.
//! - Resolve weak node ids; unknown or detached ids resolve to `None`.
//!
//! # Invariants
//! - Parents are always folders.
//! - A node id is registered at most once.
//! - Removing a node removes its whole subtree; items are left untouched.

use crate::model::node::{generate_node_id, Node, NodeId};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Node lookup consumed by state propagation.
pub trait NodeRegistry {
    /// Resolves a node id. `None` means the reference is orphaned.
    fn resolve(&self, node_id: &str) -> Option<&Node>;
    fn resolve_mut(&mut self, node_id: &str) -> Option<&mut Node>;
    /// Every registered node id, sorted.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Distance from the root level; root nodes and orphans have depth 0.
    fn depth(&self, node_id: &str) -> usize {
        let mut depth = 0;
        let mut cursor = self
            .resolve(node_id)
            .and_then(|node| node.parent_id.as_deref());
        while let Some(parent_id) = cursor {
            depth += 1;
            cursor = self
                .resolve(parent_id)
                .and_then(|node| node.parent_id.as_deref());
        }
        depth
    }
}

/// Feed list mutation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedListError {
    InvalidNodeId(String),
    DuplicateNodeId(NodeId),
    ParentNotFound(NodeId),
    ParentMustBeFolder(NodeId),
    NodeNotFound(NodeId),
}

impl Display for FeedListError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeId(value) => write!(f, "node id is invalid: `{value}`"),
            Self::DuplicateNodeId(id) => write!(f, "node id already registered: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent node not found: {id}"),
            Self::ParentMustBeFolder(id) => write!(f, "parent node must be a folder: {id}"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
        }
    }
}

impl Error for FeedListError {}

/// Subscription tree keyed by node id.
#[derive(Debug, Default)]
pub struct FeedList {
    nodes: BTreeMap<NodeId, Node>,
}

impl FeedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a folder with a generated id.
    pub fn add_folder(
        &mut self,
        parent_id: Option<&str>,
        title: impl Into<String>,
    ) -> Result<NodeId, FeedListError> {
        self.insert_node(parent_id, Node::folder(generate_node_id(), title))
    }

    /// Creates a feed with a generated id, committed through `source`.
    pub fn add_feed(
        &mut self,
        parent_id: Option<&str>,
        title: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<NodeId, FeedListError> {
        self.insert_node(parent_id, Node::feed(generate_node_id(), title, source))
    }

    /// Registers a caller-built node under an optional parent folder.
    ///
    /// Used by hosts that restore node ids from their own persistence.
    pub fn insert_node(
        &mut self,
        parent_id: Option<&str>,
        mut node: Node,
    ) -> Result<NodeId, FeedListError> {
        let node_id = node.id.trim().to_string();
        if node_id.is_empty() {
            return Err(FeedListError::InvalidNodeId(node.id));
        }
        if self.nodes.contains_key(&node_id) {
            return Err(FeedListError::DuplicateNodeId(node_id));
        }

        if let Some(parent_id) = parent_id {
            let parent = self
                .nodes
                .get_mut(parent_id)
                .ok_or_else(|| FeedListError::ParentNotFound(parent_id.to_string()))?;
            if !parent.is_folder() {
                return Err(FeedListError::ParentMustBeFolder(parent_id.to_string()));
            }
            parent.children.push(node_id.clone());
        }

        node.id = node_id.clone();
        node.parent_id = parent_id.map(str::to_string);
        node.children.clear();
        self.nodes.insert(node_id.clone(), node);
        Ok(node_id)
    }

    /// Detaches a node and its subtree. Returns removed ids.
    ///
    /// Items owned by removed feeds stay in the item store and become orphans.
    pub fn remove_node(&mut self, node_id: &str) -> Result<Vec<NodeId>, FeedListError> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| FeedListError::NodeNotFound(node_id.to_string()))?;

        if let Some(parent_id) = node.parent_id.clone() {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|child| child != node_id);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![node_id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                removed.push(current);
            }
        }
        Ok(removed)
    }
}

impl NodeRegistry for FeedList {
    fn resolve(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    fn resolve_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }
}
