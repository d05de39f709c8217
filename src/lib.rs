//! ghgraph: an incremental GitHub graph crawler
//!
//! This crate discovers repositories, users and their related entities through
//! the GitHub GraphQL API and merges them into a persistent property graph.
//! Crawling happens in restartable passes over the set of unprocessed nodes.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("Expansion of {uri} timed out after {timeout_secs}s")]
    NodeTimeout { uri: String, timeout_secs: u64 },
}

impl SpiderError {
    /// Returns true for errors that indicate a corrupted graph.
    ///
    /// These must stop the crawl instead of quarantining a single node.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(storage::StorageError::InvariantViolation { .. })
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, SpiderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Frontier, PassReport};
pub use state::{EntityKind, NodeState};
pub use storage::{GraphStore, SqliteGraphStore};
