//! CLI command implementations

pub mod diagnose;
pub mod manifest;
pub mod repair;
pub mod sync;
pub mod verify;
