//! Item domain model.
//!
//! # Responsibility
//! - Define the item/list records that carry order keys and parent links.
//! - Derive the effective order key used when no explicit key is stored.
//!
//! # Invariants
//! - `sort_order = None` means "sort by creation time".
//! - Creation-derived keys count whole seconds since 2001-01-01 UTC.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backend-local integer identifier for one item row.
pub type ItemId = i64;

/// Stable identifier of one task list.
pub type ListId = Uuid;

/// Epoch (ms) that creation-derived order keys are measured from.
pub const APPLE_EPOCH_MS: i64 = 978_307_200_000;

static NUMERIC_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").expect("valid numeric id regex"));

/// Converts an epoch-ms creation timestamp into its default order key.
pub fn creation_key(created_at_ms: i64) -> i64 {
    (created_at_ms - APPLE_EPOCH_MS) / 1000
}

/// Returns whether `value` can identify an item in a serialized tree.
///
/// Accepted shapes are positive decimal integers (legacy remote ids) and
/// hyphenated UUIDs.
pub fn is_valid_item_uuid(value: &str) -> bool {
    NUMERIC_ID_RE.is_match(value) || Uuid::parse_str(value).is_ok()
}

/// Position encoding used by one task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListBackend {
    /// Calendar-style list: one sparse integer key per item.
    Calendar,
    /// Task-list backend: dense positions per sibling group.
    TaskList,
    /// Legacy manual ordering kept as a serialized nested tree.
    Manual,
}

impl ListBackend {
    /// Storage label persisted in `task_lists.backend`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::TaskList => "task_list",
            Self::Manual => "manual",
        }
    }

    /// Parses a storage label.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calendar" => Some(Self::Calendar),
            "task_list" => Some(Self::TaskList),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// One task list and the backend that owns its ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    pub list_uuid: ListId,
    pub name: String,
    pub backend: ListBackend,
}

/// Item read model as seen by the ordering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Backend-local row id.
    pub id: ItemId,
    /// Globally unique identifier shared with sync and legacy trees.
    pub uuid: String,
    /// Owning list.
    pub list_uuid: ListId,
    /// Containing item. `None` means top level.
    pub parent_id: Option<ItemId>,
    /// User-facing title. Never logged.
    pub title: String,
    /// Explicit order key; meaning depends on the list backend.
    pub sort_order: Option<i64>,
    pub is_completed: bool,
    pub is_deleted: bool,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms modification timestamp.
    pub updated_at: i64,
}

impl Item {
    /// Order key derived from the creation timestamp.
    pub fn creation_key(&self) -> i64 {
        creation_key(self.created_at)
    }

    /// Explicit key when set, creation-derived key otherwise.
    pub fn effective_key(&self) -> i64 {
        self.sort_order.unwrap_or_else(|| self.creation_key())
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Ordering domain this item currently belongs to.
    pub fn domain(&self) -> OrderDomain {
        OrderDomain::new(self.list_uuid, self.parent_id)
    }
}

/// Scope inside which order keys are compared: one list plus one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderDomain {
    pub list_uuid: ListId,
    pub parent_id: Option<ItemId>,
}

impl OrderDomain {
    pub fn new(list_uuid: ListId, parent_id: Option<ItemId>) -> Self {
        Self {
            list_uuid,
            parent_id,
        }
    }

    /// Top-level domain of a list.
    pub fn root(list_uuid: ListId) -> Self {
        Self::new(list_uuid, None)
    }
}
