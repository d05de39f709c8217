//! Configuration module for ghgraph
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ghgraph::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ghgraph.toml")).unwrap();
//! println!("Relatives merged per relation: {}", config.crawler.relatives_cap);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CrawlerConfig, OutputConfig, RetryConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
