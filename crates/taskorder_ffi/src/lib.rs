//! Flutter-facing FFI facade over `taskorder_core`.

pub mod api;
