//! Configuration module for PageVault
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pagevault::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pagevault.toml")).unwrap();
//! println!("Database: {}", config.storage.database_path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, QueueConfig, StorageConfig, TenantConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
