//! Item and list records consumed by the ordering engine.
//!
//! # Invariants
//! - Items are identified by a backend-local `ItemId` and a globally unique
//!   string `uuid`; only the latter appears in serialized legacy trees.
//! - An item's parent chain never loops back to itself.

pub mod item;
