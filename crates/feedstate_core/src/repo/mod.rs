//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the item store and saved search contracts propagation relies on.
//! - Isolate SQLite query details from state propagation.
//!
//! # Invariants
//! - Repository writes must enforce model validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod item_repo;
pub mod search_folder_repo;
