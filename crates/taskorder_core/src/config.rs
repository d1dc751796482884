//! Ordering engine configuration.
//!
//! # Responsibility
//! - Hold user/runtime knobs that change placement and verification.
//! - Parse and validate the JSON form handed over by the host app.
//!
//! # Invariants
//! - Unknown keys are rejected.
//! - `max_task_list_depth` is never negative; `0` means a flat list.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Runtime settings for placement and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderingConfig {
    /// Place newly created items first instead of last.
    pub new_items_on_top: bool,
    /// Run the dense-position pass after every task-list mutation, even in
    /// release builds.
    pub verify_invariants: bool,
    /// Deepest nesting level the task-list backend accepts.
    pub max_task_list_depth: i32,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            new_items_on_top: false,
            verify_invariants: cfg!(debug_assertions),
            max_task_list_depth: 1,
        }
    }
}

impl OrderingConfig {
    /// Parses and validates the JSON form.
    ///
    /// Missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_task_list_depth < 0 {
            return Err(ConfigError::InvalidMaxDepth(self.max_task_list_depth));
        }
        Ok(())
    }
}

/// Errors from configuration parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// Input is not a valid config document.
    Parse(serde_json::Error),
    /// Depth limit is negative.
    InvalidMaxDepth(i32),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid ordering config: {err}"),
            Self::InvalidMaxDepth(depth) => {
                write!(f, "max_task_list_depth must be >= 0, got {depth}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidMaxDepth(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}
