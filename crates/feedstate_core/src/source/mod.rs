//! Subscription-type handlers deciding how item state changes are committed.
//!
//! # Responsibility
//! - Define the handler contract and the finalizer callbacks handlers use.
//! - Map node `source` ids to handler instances.
//!
//! # Invariants
//! - The `local` handler is always registered and serves as fallback.
//! - Handlers never persist state themselves; they accept a change by
//!   calling the matching `StateCommit` finalizer, now or on a later turn.

mod deferred;
mod local;

pub use deferred::{DeferredSyncHandler, PendingStateChange, StateChange, REMOTE_SYNC_SOURCE};
pub use local::LocalSourceHandler;

use crate::model::item::Item;
use crate::model::node::LOCAL_SOURCE;
use crate::service::item_state::StateResult;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Finalizers a handler invokes once it accepts a state change.
pub trait StateCommit {
    fn on_flag_state_changed(&mut self, item: &mut Item, new_state: bool) -> StateResult<()>;
    fn on_read_state_changed(&mut self, item: &mut Item, new_state: bool) -> StateResult<()>;
}

/// Per-subscription-kind commit policy.
pub trait SubscriptionHandler {
    /// Stable id matched against `Node::source`.
    fn source_kind(&self) -> &str;
    fn accept_flag_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()>;
    fn accept_read_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()>;
}

/// Handler registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerRegistryError {
    InvalidSourceKind(String),
    DuplicateSourceKind(String),
}

impl Display for HandlerRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSourceKind(value) => write!(f, "source kind is invalid: {value}"),
            Self::DuplicateSourceKind(value) => {
                write!(f, "source kind already registered: {value}")
            }
        }
    }
}

impl Error for HandlerRegistryError {}

/// Handlers keyed by source kind.
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn SubscriptionHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut handlers: BTreeMap<String, Arc<dyn SubscriptionHandler>> = BTreeMap::new();
        handlers.insert(LOCAL_SOURCE.to_string(), Arc::new(LocalSourceHandler));
        Self { handlers }
    }
}

impl HandlerRegistry {
    /// Creates a registry holding only the `local` handler.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), HandlerRegistryError> {
        let source_kind = handler.source_kind().trim().to_string();
        if !is_valid_source_kind(&source_kind) {
            return Err(HandlerRegistryError::InvalidSourceKind(source_kind));
        }
        if self.handlers.contains_key(&source_kind) {
            return Err(HandlerRegistryError::DuplicateSourceKind(source_kind));
        }
        self.handlers.insert(source_kind, handler);
        Ok(())
    }

    /// Sorted source kinds.
    pub fn source_kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn get(&self, source_kind: &str) -> Option<Arc<dyn SubscriptionHandler>> {
        self.handlers.get(source_kind.trim()).cloned()
    }

    pub fn local(&self) -> Arc<dyn SubscriptionHandler> {
        self.get(LOCAL_SOURCE).unwrap_or_else(|| Arc::new(LocalSourceHandler))
    }
}

fn is_valid_source_kind(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{DeferredSyncHandler, HandlerRegistry, HandlerRegistryError, LocalSourceHandler};
    use crate::model::node::LOCAL_SOURCE;
    use std::sync::Arc;

    #[test]
    fn local_handler_is_always_present() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.source_kinds(), vec![LOCAL_SOURCE.to_string()]);
        assert_eq!(registry.local().source_kind(), LOCAL_SOURCE);
    }

    #[test]
    fn registers_remote_handler_and_rejects_duplicates() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(DeferredSyncHandler::new("reader_sync")))
            .expect("remote handler should register");
        assert!(registry.get(" reader_sync ").is_some());

        let duplicate = registry.register(Arc::new(LocalSourceHandler));
        assert_eq!(
            duplicate,
            Err(HandlerRegistryError::DuplicateSourceKind(
                LOCAL_SOURCE.to_string()
            ))
        );

        let invalid = registry.register(Arc::new(DeferredSyncHandler::new("Reader Sync")));
        assert!(matches!(
            invalid,
            Err(HandlerRegistryError::InvalidSourceKind(_))
        ));
    }
}
