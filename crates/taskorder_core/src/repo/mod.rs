//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the item store contracts consumed by the ordering engine.
//! - Isolate SQLite query details from ordering and coordination logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`ItemNotFound`, `ListNotFound`)
//!   in addition to DB transport errors.
//! - Repository methods never open transactions on their own.

pub mod item_repo;
