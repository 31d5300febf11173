//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate item store, feed list and saved search collaborators into
//!   item state propagation.
//! - Keep display layers decoupled through `ItemStateObserver`.

pub mod item_state;
pub mod observer;
