//! Core ordering engine for taskorder.
//! This crate is the single source of truth for position and hierarchy
//! invariants of to-do items.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod service;

pub use config::{ConfigError, OrderingConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{
    creation_key, is_valid_item_uuid, Item, ItemId, ListBackend, ListId, OrderDomain, TaskList,
    APPLE_EPOCH_MS,
};
pub use ordering::dual_key::DualKeyPositioner;
pub use ordering::nested_tree::{MoveTarget, NestedTreeModel, NodeView, TreeParseError, ROOT_ID};
pub use ordering::order_key::OrderKeyStore;
pub use ordering::{InvariantViolation, OrderError, OrderResult};
pub use repo::item_repo::{
    ItemQuery, ItemStore, NewItem, OrderWriter, RepoError, RepoResult, SqliteItemRepository,
    Transactional, TreeBlobStore,
};
pub use service::manual_order::ManualOrderService;
pub use service::reorder::{DragState, PendingDrop, ReorderCoordinator, VisualRow};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
