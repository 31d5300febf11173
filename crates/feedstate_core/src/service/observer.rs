//! Display and notification hooks fired by state propagation.

use crate::model::item::Item;
use crate::model::node::Node;

/// Receives display refresh requests from `ItemStateService`.
///
/// Implementations must not call back into the service.
pub trait ItemStateObserver {
    /// The item's row in the item list must be redrawn.
    fn item_updated(&mut self, _item: &Item) {}
    /// The node's unread counter was recomputed.
    fn node_counters_updated(&mut self, _node: &Node) {}
    /// The global new-item notification counter must be reset.
    fn new_item_count_reset(&mut self) {}
    /// A node-dependent step was skipped because `item.node_id` no longer
    /// resolves.
    fn item_orphaned(&mut self, _item: &Item) {}
}

/// Observer for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ItemStateObserver for NoopObserver {}
