//! Storage module for the persistent property graph
//!
//! This module handles all graph persistence for the crawler, including:
//! - Idempotent node upserts keyed by the external `uri`
//! - Idempotent edge upserts keyed by `(label, start, end)`
//! - Sparse attribute merging for nodes and edges
//! - Processing and quarantine markers
//! - Pass tracking for resumption and reporting

mod scalar;
mod schema;
mod sqlite;
mod traits;

pub use scalar::{AttributeMap, Properties, Scalar};
pub use sqlite::SqliteGraphStore;
pub use traits::{GraphStore, StorageError, StorageResult};

use crate::state::NodeState;
use chrono::Utc;

/// Current time as stored in the `created`/`processed` columns
///
/// Microseconds since the Unix epoch. Never returns the `UNPROCESSED`
/// sentinel for any realistic clock.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp_micros()
}

/// Transient handle to a node, valid for the duration of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub id: i64,
    pub uri: String,
    pub label: String,
}

/// A node row as persisted
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: i64,
    pub uri: String,
    pub label: String,
    pub created: i64,
    pub processed: i64,
    pub error: Option<String>,
    pub error_trace: Option<String>,
}

impl NodeRecord {
    pub fn state(&self) -> NodeState {
        NodeState::derive(self.processed, self.error.is_some())
    }

    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            uri: self.uri.clone(),
            label: self.label.clone(),
        }
    }
}

/// Result of an edge upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRef {
    pub id: i64,
    /// True if this call inserted the edge
    pub created: bool,
}

/// An edge row as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub id: i64,
    pub label: String,
    pub start_id: i64,
    pub end_id: i64,
}

/// Ordering and filtering of an unprocessed-node snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    /// Exclude quarantined nodes
    pub skip_errored: bool,

    /// Put repositories ahead of every other kind
    pub repositories_first: bool,

    /// Randomize order within each group instead of creation order
    pub shuffle: bool,
}

/// Represents one crawl pass
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: PassStatus,
    pub nodes_to_process: u64,
    pub total_nodes: u64,
    pub processed: u64,
    pub quarantined: u64,
}

/// Status of a crawl pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Running,
    Completed,
    Aborted,
    Failed,
}

impl PassStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
