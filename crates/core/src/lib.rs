//! Core types and utilities for stowage
//!
//! This is the foundation crate (Layer 0) that all other stowage crates depend on.
//! It provides:
//! - Path types (`AbsPath`, `RelPath`)
//! - Entry-name validation shared by tree walking and component selection
//! - Base error types
//!
//! This crate has no dependencies on other stowage crates.

pub mod error;
pub mod path;

pub use error::{Error, Result};
pub use path::{AbsPath, RelPath, validate_entry_name};
