//! Storage traits and error types
//!
//! This module defines the trait interface for graph store backends and
//! associated error types.

use crate::state::EntityKind;
use crate::storage::{
    AttributeMap, EdgeRecord, EdgeRef, NodeRecord, NodeRef, PassRecord, PassStatus, Properties,
    SnapshotOptions,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Attribute '{key}' is {size} bytes, limit is {limit}")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Store invariant violated for {uri}: {detail}")]
    InvariantViolation { uri: String, detail: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for property graph backends
///
/// Node and edge upserts must be atomic: concurrent calls for the same `uri`
/// or the same `(label, start, end)` triple never create duplicates. The
/// crawler relies on this instead of locking on its own.
pub trait GraphStore: Send + Sync {
    // ===== Nodes =====

    /// Returns the node stored under `uri`, creating it if needed
    ///
    /// A new node gets `created = now` and `processed = 0`. An existing node
    /// stored under a different label is an invariant violation.
    fn get_or_create_node(&self, kind: EntityKind, uri: &str) -> StorageResult<NodeRef>;

    /// Looks up a node by uri; more than one match is an invariant violation
    fn find_by_uri(&self, uri: &str) -> StorageResult<Option<NodeRef>>;

    /// Gets the full node row by uri
    fn get_node(&self, uri: &str) -> StorageResult<Option<NodeRecord>>;

    /// Sets every non-null attribute; never removes existing ones
    ///
    /// Fails with `ValueTooLarge` without writing anything if any value
    /// exceeds the configured maximum size.
    fn merge_node_attributes(&self, node_id: i64, attributes: &AttributeMap)
        -> StorageResult<()>;

    /// Gets all attributes of a node
    fn node_attributes(&self, node_id: i64) -> StorageResult<Properties>;

    // ===== Edges =====

    /// Returns the edge `(label, start, end)`, creating it if needed
    fn get_or_create_edge(&self, label: &str, start_id: i64, end_id: i64)
        -> StorageResult<EdgeRef>;

    /// Looks up a single edge
    fn find_edge(&self, label: &str, start_id: i64, end_id: i64)
        -> StorageResult<Option<EdgeRecord>>;

    /// Same semantics as `merge_node_attributes`, for edges
    fn merge_edge_attributes(&self, edge_id: i64, attributes: &AttributeMap)
        -> StorageResult<()>;

    /// Gets all attributes of an edge
    fn edge_attributes(&self, edge_id: i64) -> StorageResult<Properties>;

    // ===== Processing state =====

    /// Sets the processed timestamp and drops any stale error marker; idempotent
    fn mark_processed(&self, node_id: i64, timestamp: i64) -> StorageResult<()>;

    /// Records an expansion failure; leaves `processed` untouched
    fn mark_errored(&self, node_id: i64, message: &str, trace: &str) -> StorageResult<()>;

    /// Removes the error marker of a single node
    fn clear_error(&self, node_id: i64) -> StorageResult<()>;

    /// Removes every error marker, returning how many nodes were released
    fn clear_all_errors(&self) -> StorageResult<u64>;

    /// Nodes with `processed = 0` and `created <= as_of`
    fn snapshot_unprocessed(&self, as_of: i64, options: &SnapshotOptions)
        -> StorageResult<Vec<NodeRef>>;

    /// Number of nodes a snapshot taken at `as_of` would contain
    fn count_unprocessed(&self, as_of: i64, skip_errored: bool) -> StorageResult<u64>;

    /// True if any node still has `processed = 0`
    ///
    /// Errored nodes count only when `skip_errored` is false.
    fn has_unprocessed(&self, skip_errored: bool) -> StorageResult<bool>;

    // ===== Statistics =====

    fn count_nodes(&self) -> StorageResult<u64>;

    fn count_edges(&self) -> StorageResult<u64>;

    fn count_processed(&self) -> StorageResult<u64>;

    /// Unprocessed nodes carrying an error marker
    fn count_quarantined(&self) -> StorageResult<u64>;

    fn count_nodes_by_label(&self) -> StorageResult<HashMap<String, u64>>;

    fn count_edges_by_label(&self) -> StorageResult<HashMap<String, u64>>;

    /// Lists quarantined nodes, most recently created first
    fn list_quarantined(&self, limit: usize) -> StorageResult<Vec<NodeRecord>>;

    // ===== Pass tracking =====

    /// Records the start of a pass and returns its ID
    fn begin_pass(
        &self,
        config_hash: &str,
        nodes_to_process: u64,
        total_nodes: u64,
    ) -> StorageResult<i64>;

    /// Records the outcome of a pass
    fn finish_pass(
        &self,
        pass_id: i64,
        status: PassStatus,
        processed: u64,
        quarantined: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent pass
    fn latest_pass(&self) -> StorageResult<Option<PassRecord>>;

    fn count_passes(&self) -> StorageResult<u64>;
}
