//! Statistics generation from the graph database
//!
//! This module provides functionality for extracting and displaying
//! graph statistics from the storage layer.

use crate::storage::{GraphStore, NodeRecord, PassRecord, StorageResult};
use std::collections::HashMap;

/// Quarantined nodes listed in a report
const QUARANTINE_SAMPLE: usize = 10;

/// Graph statistics summary
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    pub total_nodes: u64,
    pub total_edges: u64,

    /// Nodes already expanded
    pub processed: u64,

    /// Nodes waiting for a pass (quarantined nodes excluded)
    pub pending: u64,

    pub quarantined: u64,

    /// Count of nodes by label
    pub nodes_by_label: HashMap<String, u64>,

    /// Count of edges by label
    pub edges_by_label: HashMap<String, u64>,

    pub passes: u64,
    pub latest_pass: Option<PassRecord>,

    /// Most recently created quarantined nodes
    pub quarantine_sample: Vec<NodeRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The graph store to query
///
/// # Returns
///
/// * `Ok(GraphStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn GraphStore) -> StorageResult<GraphStatistics> {
    let total_nodes = store.count_nodes()?;
    let processed = store.count_processed()?;
    let quarantined = store.count_quarantined()?;

    Ok(GraphStatistics {
        total_nodes,
        total_edges: store.count_edges()?,
        processed,
        pending: total_nodes.saturating_sub(processed + quarantined),
        quarantined,
        nodes_by_label: store.count_nodes_by_label()?,
        edges_by_label: store.count_edges_by_label()?,
        passes: store.count_passes()?,
        latest_pass: store.latest_pass()?,
        quarantine_sample: store.list_quarantined(QUARANTINE_SAMPLE)?,
    })
}

fn sorted_counts(counts: &HashMap<String, u64>) -> Vec<(&String, &u64)> {
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &GraphStatistics) {
    println!("=== Graph Statistics ===\n");

    println!("Overview:");
    println!("  Nodes: {}", stats.total_nodes);
    println!("  Edges: {}", stats.total_edges);
    println!("  Processed: {}", stats.processed);
    println!("  Pending: {}", stats.pending);
    println!("  Quarantined: {}", stats.quarantined);
    println!();

    println!("Nodes by Label:");
    for (label, count) in sorted_counts(&stats.nodes_by_label) {
        let percentage = if stats.total_nodes > 0 {
            (*count as f64 / stats.total_nodes as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    if !stats.edges_by_label.is_empty() {
        println!("Edges by Label:");
        for (label, count) in sorted_counts(&stats.edges_by_label) {
            println!("  {}: {}", label, count);
        }
        println!();
    }

    println!("Passes: {}", stats.passes);
    if let Some(pass) = &stats.latest_pass {
        println!(
            "  Latest: #{} {} ({} of {} nodes processed, {} quarantined)",
            pass.id,
            pass.status.to_db_string(),
            pass.processed,
            pass.nodes_to_process,
            pass.quarantined
        );
        println!("  Started: {}", pass.started_at);
        if let Some(finished) = &pass.finished_at {
            println!("  Finished: {}", finished);
        }
    }

    if !stats.quarantine_sample.is_empty() {
        println!();
        println!("Recently Quarantined ({} shown):", stats.quarantine_sample.len());
        for node in &stats.quarantine_sample {
            println!(
                "  - {} {}: {}",
                node.label,
                node.uri,
                node.error.as_deref().unwrap_or("")
            );
        }
    }
}
