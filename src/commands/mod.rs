//! CLI command implementations for generic-json-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `config`: Configuration file generation
//! - `probe`: One-off scrape of every configured endpoint

pub mod config;
pub mod probe;

// Re-export command functions
pub use config::command_config;
pub use probe::command_probe;
