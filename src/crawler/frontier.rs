//! Frontier - pass orchestration
//!
//! A pass works on a snapshot of the unprocessed nodes taken when it starts:
//! - Nodes discovered during the pass wait for the next one
//! - Every snapshot node is visited exactly once
//! - A failing node is quarantined and the pass goes on
//! - A corrupted graph aborts the pass with an error

use crate::config::CrawlerConfig;
use crate::crawler::budget::RateBudget;
use crate::crawler::expander::{EntityExpander, ExpanderSettings};
use crate::crawler::quarantine::quarantine;
use crate::fetch::Fetcher;
use crate::state::EntityKind;
use crate::storage::{now_timestamp, GraphStore, NodeRef, PassStatus};
use crate::{Result, SpiderError};
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Nodes between two progress lines
const PROGRESS_EVERY: u64 = 50;

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: i64,

    /// Snapshot timestamp (microseconds)
    pub started_at: i64,

    pub nodes_to_process: u64,
    pub total_nodes: u64,
    pub processed: u64,
    pub quarantined: u64,

    /// True if the pass was stopped through the abort handle
    pub aborted: bool,
}

impl PassReport {
    /// True if at least one node was processed, or there was nothing to do
    pub fn made_progress(&self) -> bool {
        self.processed > 0 || self.nodes_to_process == 0
    }
}

/// Drives crawl passes over the graph
pub struct Frontier {
    store: Arc<dyn GraphStore>,
    fetcher: Arc<dyn Fetcher>,
    expander: EntityExpander,
    budget: RateBudget,
    settings: CrawlerConfig,
    config_hash: String,
    abort: Arc<AtomicBool>,
}

impl Frontier {
    /// Creates a frontier over `store`
    ///
    /// # Arguments
    ///
    /// * `store` - The graph being built
    /// * `fetcher` - Source of related entities
    /// * `budget` - Credential pacing, probed through `fetcher`
    /// * `settings` - Crawler limits and ordering
    /// * `config_hash` - Recorded with every pass
    pub fn new(
        store: Arc<dyn GraphStore>,
        fetcher: Arc<dyn Fetcher>,
        budget: RateBudget,
        settings: CrawlerConfig,
        config_hash: impl Into<String>,
    ) -> Self {
        let expander = EntityExpander::new(
            store.clone(),
            fetcher.clone(),
            ExpanderSettings::from(&settings),
        );

        Self {
            store,
            fetcher,
            expander,
            budget,
            settings,
            config_hash: config_hash.into(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the current pass before its next node when set
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Fetches the seed entity and merges it into the graph
    pub async fn seed(&self, kind: EntityKind, id_or_url: &str) -> Result<NodeRef> {
        let record = self.fetcher.fetch_entity(kind, id_or_url).await?;
        let node = self.store.get_or_create_node(kind, &record.uri)?;
        self.store.merge_node_attributes(node.id, &record.attributes)?;

        tracing::info!("Seeded {} {} as {}", kind, id_or_url, node.uri);
        if let Some(record) = self.store.get_node(&node.uri)? {
            let state = record.state();
            if !state.is_schedulable(self.settings.skip_errored) {
                tracing::warn!("Seed {} is {} and will not be expanded again", node.uri, state);
            }
        }
        Ok(node)
    }

    /// Reports whether schedulable work remains
    pub fn has_unprocessed(&self) -> Result<bool> {
        Ok(self.store.has_unprocessed(self.settings.skip_errored)?)
    }

    /// Runs one pass over the nodes unprocessed at its start
    pub async fn process(&mut self) -> Result<PassReport> {
        let as_of = now_timestamp();
        let nodes = self
            .store
            .snapshot_unprocessed(as_of, &self.settings.snapshot_options())?;
        let total_nodes = self.store.count_nodes()?;

        tracing::info!(
            timestamp = as_of,
            nodes_to_process = nodes.len(),
            total_nodes,
            "Starting pass"
        );

        let pass_id = self
            .store
            .begin_pass(&self.config_hash, nodes.len() as u64, total_nodes)?;

        let mut report = PassReport {
            pass_id,
            started_at: as_of,
            nodes_to_process: nodes.len() as u64,
            total_nodes,
            processed: 0,
            quarantined: 0,
            aborted: false,
        };

        if let Err(e) = self.dispatch(&nodes, &mut report).await {
            tracing::error!("Pass {} failed: {}", pass_id, e);
            self.store.finish_pass(
                pass_id,
                PassStatus::Failed,
                report.processed,
                report.quarantined,
            )?;
            return Err(e);
        }

        let status = if report.aborted {
            PassStatus::Aborted
        } else {
            PassStatus::Completed
        };
        self.store
            .finish_pass(pass_id, status, report.processed, report.quarantined)?;

        tracing::info!(
            "Pass {} {}: {} processed, {} quarantined",
            pass_id,
            status.to_db_string(),
            report.processed,
            report.quarantined
        );
        Ok(report)
    }

    /// Runs passes while work remains
    ///
    /// Stops early when a pass is aborted, when a pass processes nothing
    /// (every node it visited failed), or after `max_passes` passes.
    pub async fn run(&mut self, max_passes: Option<u32>) -> Result<Vec<PassReport>> {
        let mut reports = Vec::new();

        while self.has_unprocessed()? {
            if max_passes.is_some_and(|max| reports.len() as u32 >= max) {
                tracing::info!("Reached the limit of {} passes", reports.len());
                break;
            }

            let report = self.process().await?;
            let stop = report.aborted || !report.made_progress();
            if !report.made_progress() {
                tracing::warn!(
                    "Pass {} made no progress, {} nodes remain quarantined",
                    report.pass_id,
                    report.quarantined
                );
            }
            reports.push(report);

            if stop {
                break;
            }
        }

        Ok(reports)
    }

    async fn dispatch(&mut self, nodes: &[NodeRef], report: &mut PassReport) -> Result<()> {
        let start_time = Instant::now();
        self.budget.reset_schedule();

        for node in nodes {
            if self.abort.load(Ordering::SeqCst) {
                tracing::warn!("Pass {} aborted", report.pass_id);
                report.aborted = true;
                break;
            }

            match self.process_node(node).await {
                Ok(()) => {
                    self.store.mark_processed(node.id, now_timestamp())?;
                    report.processed += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    quarantine(self.store.as_ref(), node, &e)?;
                    report.quarantined += 1;
                }
            }

            let visited = report.processed + report.quarantined;
            if visited % PROGRESS_EVERY == 0 {
                let rate = visited as f64 / start_time.elapsed().as_secs_f64();
                tracing::info!(
                    "Progress: {}/{} nodes, {} quarantined, {:.2} nodes/sec",
                    visited,
                    report.nodes_to_process,
                    report.quarantined,
                    rate
                );
            }
        }

        Ok(())
    }

    async fn process_node(&mut self, node: &NodeRef) -> Result<()> {
        let kind: EntityKind = node.label.parse()?;

        if kind.is_expandable() {
            self.budget.maintain(self.fetcher.as_ref()).await;
        }

        let timeout = self.settings.node_timeout();
        match tokio::time::timeout(timeout, self.expander.expand(node, kind)).await {
            Ok(result) => {
                let summary = result?;
                tracing::debug!(
                    "Expanded {} {}: {} relatives, {} new edges",
                    kind,
                    node.uri,
                    summary.relatives,
                    summary.edges_created
                );
                Ok(())
            }
            Err(_) => Err(SpiderError::NodeTimeout {
                uri: node.uri.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Turns interrupt signals into an abort of the running pass
///
/// The first signal sets the abort flag so the pass stops between nodes.
/// Returns true on a second signal, when the caller should exit at once,
/// and false if the signal stream ends first.
pub async fn watch_interrupts<S>(signals: S, abort: Arc<AtomicBool>) -> bool
where
    S: Stream<Item = ()>,
{
    futures::pin_mut!(signals);
    let mut received = 0u32;

    while signals.next().await.is_some() {
        received += 1;
        if received > 1 {
            return true;
        }
        tracing::warn!("Interrupt received, finishing the current node (interrupt again to quit)");
        abort.store(true, Ordering::SeqCst);
    }
    false
}
