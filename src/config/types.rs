use crate::fetch::{RetryPolicy, DEFAULT_ENDPOINT};
use crate::state::EntityKind;
use crate::storage::SnapshotOptions;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for ghgraph
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Node ID or URL of the entity the crawl starts from
    pub seed: String,

    /// Label of the seed entity
    #[serde(rename = "seed-kind", default = "default_seed_kind")]
    pub seed_kind: String,

    pub api: ApiConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    pub output: OutputConfig,
}

impl Config {
    /// The seed kind as an entity kind (validated on load)
    pub fn seed_kind(&self) -> crate::Result<EntityKind> {
        self.seed_kind.parse()
    }
}

/// API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// GraphQL endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Credentials, rotated round robin
    pub tokens: Vec<String>,

    /// Remaining quota below which the next credential is used
    #[serde(rename = "rotate-below", default = "default_rotate_below")]
    pub rotate_below: u32,

    /// Nodes between quota checks
    #[serde(rename = "check-every", default = "default_check_every")]
    pub check_every: u32,

    /// Items requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,
}

/// Retry behavior for transient API failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Unit of the Fibonacci backoff (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of a single backoff (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..Default::default()
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum relatives merged per relation and node
    #[serde(rename = "relatives-cap", default = "default_relatives_cap")]
    pub relatives_cap: usize,

    /// Relations declaring more entries than this are refused
    #[serde(rename = "total-count-limit", default = "default_total_count_limit")]
    pub total_count_limit: u64,

    /// Maximum size of a stored scalar (bytes)
    #[serde(rename = "max-value-size", default = "default_max_value_size")]
    pub max_value_size: usize,

    /// Leave quarantined nodes out of passes
    #[serde(rename = "skip-errored", default = "default_true")]
    pub skip_errored: bool,

    /// Process repositories before other kinds
    #[serde(rename = "repositories-first", default = "default_true")]
    pub repositories_first: bool,

    /// Shuffle the order of a pass
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// Time budget for expanding one node (seconds)
    #[serde(rename = "node-timeout-secs", default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,

    /// Relations of one node fetched concurrently
    #[serde(
        rename = "max-concurrent-relations",
        default = "default_max_concurrent_relations"
    )]
    pub max_concurrent_relations: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            relatives_cap: default_relatives_cap(),
            total_count_limit: default_total_count_limit(),
            max_value_size: default_max_value_size(),
            skip_errored: true,
            repositories_first: true,
            shuffle: true,
            node_timeout_secs: default_node_timeout_secs(),
            max_concurrent_relations: default_max_concurrent_relations(),
        }
    }
}

impl CrawlerConfig {
    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            skip_errored: self.skip_errored,
            repositories_first: self.repositories_first,
            shuffle: self.shuffle,
        }
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_seed_kind() -> String {
    EntityKind::Repository.to_label().to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_rotate_below() -> u32 {
    500
}

fn default_check_every() -> u32 {
    50
}

fn default_page_size() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_relatives_cap() -> usize {
    128
}

fn default_total_count_limit() -> u64 {
    10_000
}

fn default_max_value_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

fn default_node_timeout_secs() -> u64 {
    600
}

fn default_max_concurrent_relations() -> usize {
    4
}
