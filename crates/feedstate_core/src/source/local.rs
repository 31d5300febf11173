//! Handler for subscriptions without a remote backend.

use super::{StateCommit, SubscriptionHandler};
use crate::model::item::Item;
use crate::model::node::LOCAL_SOURCE;
use crate::service::item_state::StateResult;

/// Accepts every change synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSourceHandler;

impl SubscriptionHandler for LocalSourceHandler {
    fn source_kind(&self) -> &str {
        LOCAL_SOURCE
    }

    fn accept_flag_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        commit.on_flag_state_changed(item, new_state)
    }

    fn accept_read_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        commit.on_read_state_changed(item, new_state)
    }
}
