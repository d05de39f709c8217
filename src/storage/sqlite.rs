//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the GraphStore trait.

use crate::state::EntityKind;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{GraphStore, StorageError, StorageResult};
use crate::storage::{
    now_timestamp, AttributeMap, EdgeRecord, EdgeRef, NodeRecord, NodeRef, PassRecord,
    PassStatus, Properties, Scalar, SnapshotOptions,
};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Default maximum size of a single attribute value (bytes)
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64 * 1024;

const NODE_COLUMNS: &str = "id, uri, label, created, processed, error, error_trace";

/// SQLite graph store
///
/// The connection sits behind a mutex so the store can be shared between the
/// concurrent relation expansions of a node. Uniqueness is enforced by the
/// `UNIQUE` constraints together with `ON CONFLICT DO NOTHING` inserts.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    max_value_size: usize,
}

impl SqliteGraphStore {
    /// Opens or creates a graph database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        })
    }

    /// Sets the maximum attribute size accepted by merges
    pub fn with_max_value_size(mut self, limit: usize) -> Self {
        self.max_value_size = limit;
        self
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }

    fn check_sizes(&self, attributes: &AttributeMap) -> StorageResult<()> {
        for (key, value) in attributes {
            if let Some(value) = value {
                let size = value.size();
                if size > self.max_value_size {
                    return Err(StorageError::ValueTooLarge {
                        key: key.clone(),
                        size,
                        limit: self.max_value_size,
                    });
                }
            }
        }
        Ok(())
    }

    /// Writes non-null attributes into `table`, keyed by `owner_column`
    fn merge_into(
        &self,
        table: &str,
        owner_column: &str,
        owner_id: i64,
        attributes: &AttributeMap,
    ) -> StorageResult<()> {
        self.check_sizes(attributes)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} ({owner_column}, key, kind, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT({owner_column}, key)
                 DO UPDATE SET kind = excluded.kind, value = excluded.value"
            ))?;
            for (key, value) in attributes {
                if let Some(value) = value {
                    stmt.execute(params![owner_id, key, value.kind_str(), value.to_sql_value()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_properties(
        &self,
        table: &str,
        owner_column: &str,
        owner_id: i64,
    ) -> StorageResult<Properties> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT key, kind, value FROM {table} WHERE {owner_column} = ?1"
        ))?;

        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Value>(2)?,
            ))
        })?;

        let mut properties = Properties::new();
        for row in rows {
            let (key, kind, value) = row?;
            match Scalar::from_sql_value(&kind, value) {
                Some(scalar) => {
                    properties.insert(key, scalar);
                }
                None => tracing::warn!("Skipping undecodable {} attribute '{}'", kind, key),
            }
        }
        Ok(properties)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_grouped(&self, sql: &str) -> StorageResult<HashMap<String, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (label, count) = row?;
            counts.insert(label, count as u64);
        }
        Ok(counts)
    }
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    Ok(NodeRecord {
        id: row.get(0)?,
        uri: row.get(1)?,
        label: row.get(2)?,
        created: row.get(3)?,
        processed: row.get(4)?,
        error: row.get(5)?,
        error_trace: row.get(6)?,
    })
}

fn row_to_pass(row: &Row<'_>) -> rusqlite::Result<PassRecord> {
    Ok(PassRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: PassStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(PassStatus::Failed),
        nodes_to_process: row.get::<_, i64>(5)? as u64,
        total_nodes: row.get::<_, i64>(6)? as u64,
        processed: row.get::<_, i64>(7)? as u64,
        quarantined: row.get::<_, i64>(8)? as u64,
    })
}

/// Selects the single node stored under `uri`
fn select_node(conn: &Connection, uri: &str) -> StorageResult<Option<NodeRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE uri = ?1"))?;
    let mut nodes = stmt
        .query_map(params![uri], row_to_node)?
        .collect::<Result<Vec<_>, _>>()?;

    if nodes.len() > 1 {
        return Err(StorageError::InvariantViolation {
            uri: uri.to_string(),
            detail: format!("{} nodes share this uri", nodes.len()),
        });
    }
    Ok(nodes.pop())
}

impl GraphStore for SqliteGraphStore {
    // ===== Nodes =====

    fn get_or_create_node(&self, kind: EntityKind, uri: &str) -> StorageResult<NodeRef> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (uri, label, created, processed) VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(uri) DO NOTHING",
            params![uri, kind.to_label(), now_timestamp()],
        )?;

        let node = select_node(&conn, uri)?.ok_or_else(|| StorageError::InvariantViolation {
            uri: uri.to_string(),
            detail: "node vanished right after insertion".to_string(),
        })?;

        if node.label != kind.to_label() {
            return Err(StorageError::InvariantViolation {
                uri: uri.to_string(),
                detail: format!(
                    "stored as '{}', rediscovered as '{}'",
                    node.label,
                    kind.to_label()
                ),
            });
        }

        Ok(node.to_ref())
    }

    fn find_by_uri(&self, uri: &str) -> StorageResult<Option<NodeRef>> {
        let conn = self.conn()?;
        Ok(select_node(&conn, uri)?.map(|node| node.to_ref()))
    }

    fn get_node(&self, uri: &str) -> StorageResult<Option<NodeRecord>> {
        let conn = self.conn()?;
        select_node(&conn, uri)
    }

    fn merge_node_attributes(
        &self,
        node_id: i64,
        attributes: &AttributeMap,
    ) -> StorageResult<()> {
        self.merge_into("node_attributes", "node_id", node_id, attributes)
    }

    fn node_attributes(&self, node_id: i64) -> StorageResult<Properties> {
        self.read_properties("node_attributes", "node_id", node_id)
    }

    // ===== Edges =====

    fn get_or_create_edge(
        &self,
        label: &str,
        start_id: i64,
        end_id: i64,
    ) -> StorageResult<EdgeRef> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO edges (label, start_id, end_id, created) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(label, start_id, end_id) DO NOTHING",
            params![label, start_id, end_id, now_timestamp()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM edges WHERE label = ?1 AND start_id = ?2 AND end_id = ?3",
            params![label, start_id, end_id],
            |row| row.get(0),
        )?;

        Ok(EdgeRef {
            id,
            created: inserted == 1,
        })
    }

    fn find_edge(
        &self,
        label: &str,
        start_id: i64,
        end_id: i64,
    ) -> StorageResult<Option<EdgeRecord>> {
        let conn = self.conn()?;
        let edge = conn
            .query_row(
                "SELECT id, label, start_id, end_id FROM edges
                 WHERE label = ?1 AND start_id = ?2 AND end_id = ?3",
                params![label, start_id, end_id],
                |row| {
                    Ok(EdgeRecord {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        start_id: row.get(2)?,
                        end_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(edge)
    }

    fn merge_edge_attributes(
        &self,
        edge_id: i64,
        attributes: &AttributeMap,
    ) -> StorageResult<()> {
        self.merge_into("edge_attributes", "edge_id", edge_id, attributes)
    }

    fn edge_attributes(&self, edge_id: i64) -> StorageResult<Properties> {
        self.read_properties("edge_attributes", "edge_id", edge_id)
    }

    // ===== Processing state =====

    fn mark_processed(&self, node_id: i64, timestamp: i64) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nodes SET processed = ?1, error = NULL, error_trace = NULL WHERE id = ?2",
            params![timestamp, node_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(format!("Node ID {}", node_id)));
        }
        Ok(())
    }

    fn mark_errored(&self, node_id: i64, message: &str, trace: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nodes SET error = ?1, error_trace = ?2 WHERE id = ?3",
            params![message, trace, node_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(format!("Node ID {}", node_id)));
        }
        Ok(())
    }

    fn clear_error(&self, node_id: i64) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE nodes SET error = NULL, error_trace = NULL WHERE id = ?1",
            params![node_id],
        )?;
        Ok(())
    }

    fn clear_all_errors(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let cleared = conn.execute(
            "UPDATE nodes SET error = NULL, error_trace = NULL
             WHERE processed = 0 AND error IS NOT NULL",
            [],
        )?;
        Ok(cleared as u64)
    }

    fn snapshot_unprocessed(
        &self,
        as_of: i64,
        options: &SnapshotOptions,
    ) -> StorageResult<Vec<NodeRef>> {
        let mut sql =
            String::from("SELECT id, uri, label FROM nodes WHERE processed = 0 AND created <= ?1");
        if options.skip_errored {
            sql.push_str(" AND error IS NULL");
        }

        let mut order = Vec::new();
        if options.repositories_first {
            order.push(format!(
                "CASE WHEN label = '{}' THEN 0 ELSE 1 END",
                EntityKind::Repository.to_label()
            ));
        }
        if options.shuffle {
            order.push("RANDOM()".to_string());
        } else {
            order.push("created, id".to_string());
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![as_of], |row| {
                Ok(NodeRef {
                    id: row.get(0)?,
                    uri: row.get(1)?,
                    label: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    fn count_unprocessed(&self, as_of: i64, skip_errored: bool) -> StorageResult<u64> {
        let sql = if skip_errored {
            "SELECT COUNT(*) FROM nodes WHERE processed = 0 AND created <= ?1 AND error IS NULL"
        } else {
            "SELECT COUNT(*) FROM nodes WHERE processed = 0 AND created <= ?1"
        };
        let conn = self.conn()?;
        let count: i64 = conn.query_row(sql, params![as_of], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn has_unprocessed(&self, skip_errored: bool) -> StorageResult<bool> {
        let sql = if skip_errored {
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE processed = 0 AND error IS NULL)"
        } else {
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE processed = 0)"
        };
        let conn = self.conn()?;
        let exists: bool = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(exists)
    }

    // ===== Statistics =====

    fn count_nodes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM nodes")
    }

    fn count_edges(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM edges")
    }

    fn count_processed(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM nodes WHERE processed != 0")
    }

    fn count_quarantined(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM nodes WHERE processed = 0 AND error IS NOT NULL")
    }

    fn count_nodes_by_label(&self) -> StorageResult<HashMap<String, u64>> {
        self.count_grouped("SELECT label, COUNT(*) FROM nodes GROUP BY label")
    }

    fn count_edges_by_label(&self) -> StorageResult<HashMap<String, u64>> {
        self.count_grouped("SELECT label, COUNT(*) FROM edges GROUP BY label")
    }

    fn list_quarantined(&self, limit: usize) -> StorageResult<Vec<NodeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE processed = 0 AND error IS NOT NULL
             ORDER BY created DESC LIMIT ?1"
        ))?;
        let nodes = stmt
            .query_map(params![limit as i64], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    // ===== Pass tracking =====

    fn begin_pass(
        &self,
        config_hash: &str,
        nodes_to_process: u64,
        total_nodes: u64,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO passes (started_at, config_hash, status, nodes_to_process, total_nodes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                config_hash,
                PassStatus::Running.to_db_string(),
                nodes_to_process as i64,
                total_nodes as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_pass(
        &self,
        pass_id: i64,
        status: PassStatus,
        processed: u64,
        quarantined: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "UPDATE passes SET status = ?1, finished_at = ?2, processed = ?3, quarantined = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                processed as i64,
                quarantined as i64,
                pass_id
            ],
        )?;
        Ok(())
    }

    fn latest_pass(&self) -> StorageResult<Option<PassRecord>> {
        let conn = self.conn()?;
        let pass = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, nodes_to_process,
                 total_nodes, processed, quarantined FROM passes ORDER BY id DESC LIMIT 1",
                [],
                row_to_pass,
            )
            .optional()?;
        Ok(pass)
    }

    fn count_passes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM passes")
    }
}
