//! Domain model for item state propagation.
//!
//! # Responsibility
//! - Define items, subscription tree nodes and saved searches.
//! - Keep validation next to the data it protects.
//!
//! # Invariants
//! - Items reference their owning node by id only; liveness is never assumed.

pub mod item;
pub mod node;
pub mod search_folder;
