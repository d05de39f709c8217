//! Database schema definitions
//!
//! Reserved node fields (`uri`, `created`, `processed`, `error`,
//! `error_trace`) are columns of `nodes`. Domain attributes live in
//! `node_attributes`, so an API field can never overwrite a reserved one.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl passes
CREATE TABLE IF NOT EXISTS passes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    nodes_to_process INTEGER NOT NULL DEFAULT 0,
    total_nodes INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    quarantined INTEGER NOT NULL DEFAULT 0
);

-- Graph vertices; processed = 0 means not yet expanded
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    created INTEGER NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    error_trace TEXT
);

CREATE INDEX IF NOT EXISTS idx_nodes_frontier ON nodes(processed, created);
CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

CREATE TABLE IF NOT EXISTS node_attributes (
    node_id INTEGER NOT NULL REFERENCES nodes(id),
    key TEXT NOT NULL,
    kind TEXT NOT NULL,
    value,
    PRIMARY KEY (node_id, key)
);

-- Graph edges; one row per (label, start, end)
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    start_id INTEGER NOT NULL REFERENCES nodes(id),
    end_id INTEGER NOT NULL REFERENCES nodes(id),
    created INTEGER NOT NULL,
    UNIQUE(label, start_id, end_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_end ON edges(end_id);

CREATE TABLE IF NOT EXISTS edge_attributes (
    edge_id INTEGER NOT NULL REFERENCES edges(id),
    key TEXT NOT NULL,
    kind TEXT NOT NULL,
    value,
    PRIMARY KEY (edge_id, key)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
