//! Configuration management for stowage
//!
//! This crate handles:
//! - Configuration loading and validation
//! - XDG directory management
//! - Logging initialization

pub mod config;
pub mod dirs;
pub mod logging;

// Re-export error types from core
pub use stowage_core::{Error, Result};

// Re-export main types
pub use config::{Config, GeneralConfig, InstallConfig, StructuredConfig};
pub use dirs::{config_dir, default_config_file, state_dir};
