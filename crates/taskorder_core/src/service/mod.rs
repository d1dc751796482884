//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate ordering components into list-level operations.
//! - Own transaction boundaries for multi-step reorders.
//! - Keep UI/FFI layers decoupled from backend position encodings.

pub mod manual_order;
pub mod reorder;
