//! Shared domain types for the roomlink workspace.

pub mod error;
pub mod room;
pub mod types;
