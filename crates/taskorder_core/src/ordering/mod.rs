//! Ordering engine: per-backend position primitives.
//!
//! # Responsibility
//! - Assign, shift and rewrite persisted order keys for the calendar and
//!   task-list backends.
//! - Maintain the legacy nested tree used by manual ordering.
//!
//! # Invariants
//! - Components never open transactions; callers own atomicity.
//! - Inconsistent references (missing item, parent or anchor) are no-ops.
//! - Storage failures are the only propagated errors, besides failed
//!   invariant passes when checks are enabled.

pub mod dual_key;
pub mod nested_tree;
pub mod order_key;

use crate::model::item::{ItemId, OrderDomain};
use crate::repo::item_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type OrderResult<T> = Result<T, OrderError>;

/// Errors from ordering and reorder operations.
#[derive(Debug)]
pub enum OrderError {
    /// Repository-level failure.
    Repo(RepoError),
    /// A sibling group is not a dense permutation after a mutation.
    InvariantViolation(InvariantViolation),
}

impl Display for OrderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvariantViolation(violation) => write!(f, "{violation}"),
        }
    }
}

impl Error for OrderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvariantViolation(_) => None,
        }
    }
}

impl From<RepoError> for OrderError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<crate::db::DbError> for OrderError {
    fn from(value: crate::db::DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// First position mismatch found in one sibling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub domain: OrderDomain,
    pub item_id: ItemId,
    /// Dense index the item occupies in display order.
    pub expected: i64,
    /// Stored key.
    pub found: Option<i64>,
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parent = self
            .domain
            .parent_id
            .map_or_else(|| "root".to_string(), |id| id.to_string());
        let found = self
            .found
            .map_or_else(|| "null".to_string(), |key| key.to_string());
        write!(
            f,
            "sibling group {}/{} is not dense: item {} has position {}, expected {}",
            self.domain.list_uuid, parent, self.item_id, found, self.expected
        )
    }
}

/// Whether the build asks for post-mutation invariant passes.
pub fn invariant_checks_compiled() -> bool {
    cfg!(debug_assertions) || cfg!(feature = "invariant-checks")
}
