//! Item state propagation core for a feed reader.
//!
//! Keeps read and flag state of feed items consistent across the item store,
//! feed and folder unread counters, duplicate copies of the same article in
//! other feeds, and saved search memberships.

pub mod config;
pub mod db;
pub mod feedlist;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod source;

pub use config::{ConfigError, FeedStateConfig, LogConfig, PropagationConfig};
pub use feedlist::{FeedList, FeedListError, NodeRegistry};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemId, ItemValidationError};
pub use model::node::{Node, NodeId, NodeKind, LOCAL_SOURCE};
pub use model::search_folder::{SearchFolder, SearchFolderId, SearchRule, SearchRuleError};
pub use repo::item_repo::{ItemRepository, RepoError, RepoResult, SqliteItemRepository};
pub use repo::search_folder_repo::{SavedSearchIndex, SqliteSearchFolderIndex};
pub use service::item_state::{ItemStateService, StateError, StateResult};
pub use service::observer::{ItemStateObserver, NoopObserver};
pub use source::{
    DeferredSyncHandler, HandlerRegistry, HandlerRegistryError, LocalSourceHandler,
    PendingStateChange, StateChange, StateCommit, SubscriptionHandler, REMOTE_SYNC_SOURCE,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
