//! Item state propagation service.
//!
//! # Responsibility
//! - Accept read/flag change requests and route them to the owning
//!   subscription handler.
//! - Finalize accepted changes: persistence, saved search recheck, display
//!   refresh, unread counters and duplicate fan-out.
//! - Provide the bulk mark-all-read pass and the deferred recount pass.
//!
//! # Invariants
//! - A read request is a no-op only when the read bit is unchanged and the
//!   item carries no "updated" marker.
//! - Every read finalization clears `update_status`.
//! - Saved searches are rechecked only after the new state is persisted.
//! - Duplicate fan-out re-enters through `request_read_change`, never the
//!   finalizer, and always skips the originating item id.
//! - Orphaned node references and unreadable item rows are logged and
//!   skipped, never fatal; only storage transport errors abort a pass.
//! - Inside `mark_all_read` no per-item display refresh or counter recompute
//!   happens; nodes are only flagged with `needs_recount`.

use crate::config::PropagationConfig;
use crate::feedlist::NodeRegistry;
use crate::model::item::{Item, ItemId};
use crate::model::node::{NodeId, NodeKind};
use crate::repo::item_repo::{ItemRepository, RepoError};
use crate::repo::search_folder_repo::SavedSearchIndex;
use crate::service::observer::ItemStateObserver;
use crate::source::{
    HandlerRegistry, PendingStateChange, StateChange, StateCommit, SubscriptionHandler,
};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type StateResult<T> = Result<T, StateError>;

/// Errors surfaced by state propagation.
///
/// Inconsistent data (orphans, missing duplicates) is never an error; only
/// storage failures reach callers.
#[derive(Debug)]
pub enum StateError {
    Repo(RepoError),
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for StateError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Item state propagator.
///
/// Owns its collaborators for the duration of a session; all methods run on
/// the caller's thread.
pub struct ItemStateService<R, S, N, O>
where
    R: ItemRepository,
    S: SavedSearchIndex,
    N: NodeRegistry,
    O: ItemStateObserver,
{
    items: R,
    searches: S,
    nodes: N,
    observer: O,
    handlers: HandlerRegistry,
    config: PropagationConfig,
    bulk_depth: usize,
}

impl<R, S, N, O> ItemStateService<R, S, N, O>
where
    R: ItemRepository,
    S: SavedSearchIndex,
    N: NodeRegistry,
    O: ItemStateObserver,
{
    /// Creates a service with default propagation settings and only the
    /// `local` subscription handler.
    pub fn new(items: R, searches: S, nodes: N, observer: O) -> Self {
        Self {
            items,
            searches,
            nodes,
            observer,
            handlers: HandlerRegistry::new(),
            config: PropagationConfig::default(),
            bulk_depth: 0,
        }
    }

    pub fn with_config(mut self, config: PropagationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    pub fn items(&self) -> &R {
        &self.items
    }

    pub fn searches(&self) -> &S {
        &self.searches
    }

    pub fn nodes(&self) -> &N {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut N {
        &mut self.nodes
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Requests a flag ("important") change for `item`.
    ///
    /// No-op when the flag already has the requested value. Otherwise the
    /// owning node's handler decides when the change is committed.
    pub fn request_flag_change(&mut self, item: &mut Item, new_state: bool) -> StateResult<()> {
        if new_state == item.flag_status {
            return Ok(());
        }

        let handler = self.handler_for(&item.node_id);
        handler.accept_flag_change(self, item, new_state)
    }

    /// Requests a read state change for `item`.
    ///
    /// Runs even when the read bit is unchanged if the item is still marked
    /// as updated, so that marker gets cleared.
    pub fn request_read_change(&mut self, item: &mut Item, new_state: bool) -> StateResult<()> {
        if new_state == item.read_status && !item.update_status {
            return Ok(());
        }

        let handler = self.handler_for(&item.node_id);
        handler.accept_read_change(self, item, new_state)
    }

    /// Commits a change a deferring handler accepted on an earlier turn.
    ///
    /// The item is reloaded from the store. Returns `false` when it no longer
    /// exists.
    pub fn commit_deferred(&mut self, pending: PendingStateChange) -> StateResult<bool> {
        let Some(mut item) = self.items.load_item(pending.item_id)? else {
            warn!(
                "event=state_commit module=item_state status=skipped reason=item_missing item_id={}",
                pending.item_id
            );
            return Ok(false);
        };

        let result = match pending.change {
            StateChange::Read(new_state) => self.on_read_state_changed(&mut item, new_state),
            StateChange::Flag(new_state) => self.on_flag_state_changed(&mut item, new_state),
        };
        self.items.unload_item(item);
        result.map(|()| true)
    }

    /// Marks every unread item under `node_id` as read.
    ///
    /// Folders include the items of all descendant feeds. Only dirty flags
    /// are set on affected nodes; call [`Self::update_dirty_counters`]
    /// afterwards to refresh counters and displays in one pass.
    ///
    /// Returns the number of items handed to subscription handlers.
    pub fn mark_all_read(&mut self, node_id: &str) -> StateResult<usize> {
        let Some(node) = self.nodes.resolve(node_id) else {
            warn!(
                "event=mark_all_read module=item_state status=skipped reason=node_not_found node_id={node_id}"
            );
            return Ok(0);
        };
        if node.unread_count == 0 {
            return Ok(0);
        }

        let started_at = Instant::now();
        let item_ids = self.collect_item_ids(node_id)?;

        self.bulk_depth += 1;
        let result = self.mark_items_read(&item_ids);
        self.bulk_depth -= 1;

        let accepted = result?;
        debug!(
            "event=mark_all_read module=item_state status=ok node_id={} items={} accepted={} duration_ms={}",
            node_id,
            item_ids.len(),
            accepted,
            started_at.elapsed().as_millis()
        );
        Ok(accepted)
    }

    /// Marks the new-item popup of every item under `node_id` as shown.
    ///
    /// One batched store call; no display side effect.
    pub fn set_all_popup_shown(&mut self, node_id: &str) -> StateResult<usize> {
        let changed = self.items.mark_all_popup_shown(node_id)?;
        debug!(
            "event=popup_shown module=item_state status=ok node_id={node_id} changed={changed}"
        );
        Ok(changed)
    }

    /// Recomputes the unread counter of `node_id` and of every ancestor.
    ///
    /// Returns `false` when the node does not resolve.
    pub fn update_node_counters(&mut self, node_id: &str) -> StateResult<bool> {
        let mut cursor = Some(node_id.to_string());
        let mut updated = false;
        while let Some(current) = cursor {
            let Some(parent_id) = self.recount_node(&current)? else {
                break;
            };
            updated = true;
            if let Some(node) = self.nodes.resolve(&current) {
                self.observer.node_counters_updated(node);
            }
            cursor = parent_id;
        }
        Ok(updated)
    }

    /// Recounts every node flagged with `needs_recount`, plus their
    /// ancestors, exactly once and children first.
    ///
    /// Returns the number of recounted nodes.
    pub fn update_dirty_counters(&mut self) -> StateResult<usize> {
        let mut pending = BTreeSet::new();
        for node_id in self.nodes.node_ids() {
            let is_dirty = self
                .nodes
                .resolve(&node_id)
                .is_some_and(|node| node.needs_recount);
            if is_dirty {
                self.collect_with_ancestors(node_id, &mut pending);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let mut ordered: Vec<(usize, NodeId)> = pending
            .into_iter()
            .map(|node_id| (self.nodes.depth(&node_id), node_id))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut recounted = 0;
        for (_, node_id) in ordered {
            if self.recount_node(&node_id)?.is_none() {
                continue;
            }
            recounted += 1;
            if let Some(node) = self.nodes.resolve(&node_id) {
                self.observer.node_counters_updated(node);
            }
        }

        if recounted > 0 {
            self.observer.new_item_count_reset();
        }
        debug!("event=recount module=item_state status=ok recounted={recounted}");
        Ok(recounted)
    }

    fn in_bulk(&self) -> bool {
        self.bulk_depth > 0
    }

    /// Loads an item for a multi-item pass. Rows that fail validation are
    /// logged and reported as absent.
    fn load_or_skip(&self, item_id: ItemId, event: &str) -> StateResult<Option<Item>> {
        match self.items.load_item(item_id) {
            Ok(item) => Ok(item),
            Err(err @ (RepoError::Validation(_) | RepoError::InvalidData(_))) => {
                warn!(
                    "event={event} module=item_state status=skipped reason=invalid_item item_id={item_id} error={err}"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn handler_for(&self, node_id: &str) -> Arc<dyn SubscriptionHandler> {
        let Some(node) = self.nodes.resolve(node_id) else {
            return self.handlers.local();
        };

        match self.handlers.get(&node.source) {
            Some(handler) => handler,
            None => {
                warn!(
                    "event=handler_dispatch module=item_state status=fallback reason=unknown_source node_id={} source={}",
                    node_id, node.source
                );
                self.handlers.local()
            }
        }
    }

    fn recheck_search_folders(&self, item: &Item) -> StateResult<()> {
        for folder_id in self.searches.search_folder_ids() {
            self.searches.recheck_membership(folder_id, item)?;
        }
        Ok(())
    }

    /// Flags a node for the deferred recount pass. Returns `false` for
    /// orphaned ids.
    fn mark_needs_recount(&mut self, node_id: &str) -> bool {
        match self.nodes.resolve_mut(node_id) {
            Some(node) => {
                node.needs_recount = true;
                true
            }
            None => false,
        }
    }

    /// Recomputes one node from the store (feeds) or its children (folders).
    ///
    /// Returns `None` when the node does not resolve, otherwise its parent id.
    fn recount_node(&mut self, node_id: &str) -> StateResult<Option<Option<NodeId>>> {
        let Some(node) = self.nodes.resolve(node_id) else {
            return Ok(None);
        };

        let unread = match node.kind {
            NodeKind::Feed => self.items.count_unread(node_id)?,
            NodeKind::Folder => node
                .children
                .iter()
                .filter_map(|child_id| self.nodes.resolve(child_id))
                .map(|child| child.unread_count)
                .sum(),
        };

        let Some(node) = self.nodes.resolve_mut(node_id) else {
            return Ok(None);
        };
        node.unread_count = unread;
        node.needs_recount = false;
        Ok(Some(node.parent_id.clone()))
    }

    fn collect_with_ancestors(&self, node_id: NodeId, into: &mut BTreeSet<NodeId>) {
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            cursor = self
                .nodes
                .resolve(&current)
                .and_then(|node| node.parent_id.clone());
            if !into.insert(current) {
                break;
            }
        }
    }

    fn collect_item_ids(&self, node_id: &str) -> StateResult<Vec<ItemId>> {
        let mut item_ids = Vec::new();
        let mut stack = vec![node_id.to_string()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.resolve(&current) else {
                continue;
            };
            match node.kind {
                NodeKind::Feed => item_ids.extend(self.items.list_item_ids(&current)?),
                NodeKind::Folder => stack.extend(node.children.iter().rev().cloned()),
            }
        }
        Ok(item_ids)
    }

    fn mark_items_read(&mut self, item_ids: &[ItemId]) -> StateResult<usize> {
        let mut accepted = 0;
        for &item_id in item_ids {
            let Some(mut item) = self.load_or_skip(item_id, "mark_all_read")? else {
                continue;
            };
            let result = self.mark_loaded_item_read(&mut item);
            self.items.unload_item(item);
            if result? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn mark_loaded_item_read(&mut self, item: &mut Item) -> StateResult<bool> {
        if item.read_status {
            return Ok(false);
        }

        let mut accepted = false;
        if self.mark_needs_recount(&item.node_id) {
            let handler = self.handler_for(&item.node_id);
            handler.accept_read_change(self, item, true)?;
            accepted = true;
        } else {
            warn!(
                "event=mark_all_read module=item_state status=skipped reason=orphaned_item item_id={} node_id={}",
                item.id, item.node_id
            );
            self.observer.item_orphaned(item);
        }

        if item.has_duplicates_key() {
            let started_at = Instant::now();
            for node_id in self.items.find_duplicate_node_ids(&item.source_id)? {
                self.mark_needs_recount(&node_id);
            }
            debug!(
                "event=mark_all_read module=item_state status=duplicates_flagged item_id={} duration_ms={}",
                item.id,
                started_at.elapsed().as_millis()
            );
        }

        Ok(accepted)
    }

    fn propagate_to_duplicates(&mut self, item: &Item, change: StateChange) -> StateResult<()> {
        if !item.has_duplicates_key() {
            return Ok(());
        }

        for duplicate_id in self.items.find_duplicate_ids(&item.source_id)? {
            if duplicate_id == item.id {
                continue;
            }
            let Some(mut duplicate) = self.load_or_skip(duplicate_id, "duplicate_propagation")?
            else {
                continue;
            };

            let result = if self.nodes.resolve(&duplicate.node_id).is_some() {
                match change {
                    StateChange::Read(new_state) => {
                        self.request_read_change(&mut duplicate, new_state)
                    }
                    StateChange::Flag(new_state) => {
                        self.request_flag_change(&mut duplicate, new_state)
                    }
                }
            } else {
                warn!(
                    "event=duplicate_propagation module=item_state status=skipped reason=orphaned_item item_id={} node_id={} source_item_id={}",
                    duplicate.id, duplicate.node_id, item.id
                );
                self.observer.item_orphaned(&duplicate);
                Ok(())
            };

            self.items.unload_item(duplicate);
            result?;
        }
        Ok(())
    }
}

impl<R, S, N, O> StateCommit for ItemStateService<R, S, N, O>
where
    R: ItemRepository,
    S: SavedSearchIndex,
    N: NodeRegistry,
    O: ItemStateObserver,
{
    fn on_flag_state_changed(&mut self, item: &mut Item, new_state: bool) -> StateResult<()> {
        item.flag_status = new_state;
        self.items.update_item_state(item)?;

        self.observer.item_updated(item);
        self.recheck_search_folders(item)?;
        self.observer.new_item_count_reset();

        if self.config.propagate_flag_to_duplicates {
            self.propagate_to_duplicates(item, StateChange::Flag(new_state))?;
        }

        debug!(
            "event=flag_state module=item_state status=ok item_id={} new_state={}",
            item.id, new_state
        );
        Ok(())
    }

    fn on_read_state_changed(&mut self, item: &mut Item, new_state: bool) -> StateResult<()> {
        let started_at = Instant::now();

        item.read_status = new_state;
        item.update_status = false;
        self.items.update_item_state(item)?;

        self.recheck_search_folders(item)?;

        if self.in_bulk() {
            if !self.mark_needs_recount(&item.node_id) {
                warn!(
                    "event=read_state module=item_state status=orphaned step=flag_recount item_id={} node_id={}",
                    item.id, item.node_id
                );
                self.observer.item_orphaned(item);
            }
        } else {
            self.observer.item_updated(item);
            if !self.update_node_counters(&item.node_id)? {
                warn!(
                    "event=read_state module=item_state status=orphaned step=update_counters item_id={} node_id={}",
                    item.id, item.node_id
                );
                self.observer.item_orphaned(item);
            }
            self.observer.new_item_count_reset();
        }

        if self.config.propagate_read_to_duplicates {
            self.propagate_to_duplicates(item, StateChange::Read(new_state))?;
        }

        debug!(
            "event=read_state module=item_state status=ok item_id={} new_state={} duration_ms={}",
            item.id,
            new_state,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}
