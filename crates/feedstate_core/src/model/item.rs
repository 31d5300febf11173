//! Feed item domain model.
//!
//! # Responsibility
//! - Define the persisted item record and its state bits.
//! - Validate item invariants before they reach storage.
//!
//! # Invariants
//! - `id` is assigned by the item store and stays stable for the process.
//! - `node_id` is a weak reference; the node may no longer exist.
//! - `valid_guid == true` implies a non-blank `source_id`.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned numeric item identifier.
pub type ItemId = i64;

/// One feed entry as persisted in the item store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Store-assigned id. `0` until the item has been created.
    pub id: ItemId,
    /// Owning feed node.
    pub node_id: NodeId,
    /// GUID-derived id used to match the same article across feeds.
    pub source_id: String,
    /// Whether `source_id` is trustworthy for duplicate matching.
    pub valid_guid: bool,
    pub title: String,
    pub read_status: bool,
    /// "Important" marker.
    pub flag_status: bool,
    /// Content changed since the item was last read. Cleared on every read
    /// state change.
    pub update_status: bool,
    /// New-item popup already shown for this item.
    pub popup_status: bool,
}

impl Item {
    /// Creates an unread item without a trustworthy GUID.
    pub fn new(node_id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            node_id: node_id.into(),
            source_id: String::new(),
            valid_guid: false,
            title: title.into(),
            read_status: false,
            flag_status: false,
            update_status: false,
            popup_status: false,
        }
    }

    /// Creates an unread item that takes part in duplicate matching.
    pub fn with_guid(
        node_id: impl Into<NodeId>,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            valid_guid: true,
            ..Self::new(node_id, title)
        }
    }

    /// Returns whether this item can have duplicates in other feeds.
    pub fn has_duplicates_key(&self) -> bool {
        self.valid_guid && !self.source_id.trim().is_empty()
    }

    /// Validates invariants required before persistence.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.node_id.trim().is_empty() {
            return Err(ItemValidationError::BlankNodeId);
        }
        if self.valid_guid && self.source_id.trim().is_empty() {
            return Err(ItemValidationError::MissingSourceId);
        }
        Ok(())
    }
}

/// Item invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemValidationError {
    BlankNodeId,
    MissingSourceId,
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankNodeId => write!(f, "item must reference an owning node"),
            Self::MissingSourceId => {
                write!(f, "item with valid_guid must carry a non-blank source_id")
            }
        }
    }
}

impl Error for ItemValidationError {}
