//! ghgraph main entry point
//!
//! This is the command-line interface for the ghgraph crawler.

use anyhow::Context;
use clap::Parser;
use ghgraph::config::{load_config_with_hash, Config};
use ghgraph::crawler::{release_all, watch_interrupts, Frontier, RateBudget};
use ghgraph::fetch::{build_http_client, GitHubFetcher};
use ghgraph::output::{load_statistics, print_statistics};
use ghgraph::storage::{GraphStore, SqliteGraphStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// ghgraph: an incremental GitHub graph crawler
///
/// ghgraph starts from a seed repository or user and grows a property graph
/// of related entities, one pass over the unprocessed nodes at a time.
/// Interrupted crawls resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "ghgraph")]
#[command(version)]
#[command(about = "An incremental GitHub graph crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "clear_errors"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "clear_errors"])]
    stats: bool,

    /// Return every quarantined node to the frontier and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    clear_errors: bool,

    /// Do not fetch the seed; continue from the nodes already stored
    #[arg(long)]
    no_seed: bool,

    /// Stop after this many passes
    #[arg(long, value_name = "N")]
    max_passes: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.clear_errors {
        handle_clear_errors(&config)
    } else {
        handle_crawl(config, config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ghgraph=info,warn"),
            1 => EnvFilter::new("ghgraph=debug,info"),
            2 => EnvFilter::new("ghgraph=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<SqliteGraphStore> {
    let path = Path::new(&config.output.database_path);
    let store = SqliteGraphStore::new(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_max_value_size(config.crawler.max_value_size);
    Ok(store)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== ghgraph Dry Run ===\n");

    println!("Seed:");
    println!("  {} {}", config.seed_kind, config.seed);

    println!("\nAPI:");
    println!("  Endpoint: {}", config.api.endpoint);
    println!("  Credentials: {}", config.api.tokens.len());
    println!("  Rotate below: {} remaining calls", config.api.rotate_below);
    println!("  Quota check every: {} nodes", config.api.check_every);
    println!("  Page size: {}", config.api.page_size);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms max",
        config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    println!("\nCrawler:");
    println!("  Relatives cap: {}", config.crawler.relatives_cap);
    println!("  Total count limit: {}", config.crawler.total_count_limit);
    println!("  Max value size: {} bytes", config.crawler.max_value_size);
    println!("  Skip errored: {}", config.crawler.skip_errored);
    println!("  Repositories first: {}", config.crawler.repositories_first);
    println!("  Shuffle: {}", config.crawler.shuffle);
    println!("  Node timeout: {}s", config.crawler.node_timeout_secs);
    println!(
        "  Concurrent relations: {}",
        config.crawler.max_concurrent_relations
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_store(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --clear-errors mode: releases quarantined nodes
fn handle_clear_errors(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let released = release_all(&store)?;
    println!("✓ Released {} quarantined nodes", released);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, cli: &Cli) -> anyhow::Result<()> {
    let store: Arc<dyn GraphStore> = Arc::new(open_store(&config)?);

    let endpoint = Url::parse(&config.api.endpoint)?;
    let fetcher = Arc::new(GitHubFetcher::new(
        build_http_client()?,
        endpoint,
        config.api.tokens[0].clone(),
        config.retry.to_policy(),
        config.api.page_size,
    ));

    let budget = RateBudget::new(
        config.api.tokens.clone(),
        config.api.rotate_below,
        config.api.check_every,
    );

    let mut frontier = Frontier::new(
        store.clone(),
        fetcher,
        budget,
        config.crawler.clone(),
        config_hash,
    );

    // Stop between nodes on Ctrl-C, quit on a second one
    let abort = frontier.abort_handle();
    tokio::spawn(async move {
        let signals = futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        });
        if watch_interrupts(signals, abort).await {
            tracing::error!("Second interrupt received, exiting");
            std::process::exit(130);
        }
    });

    if !cli.no_seed {
        let kind = config.seed_kind()?;
        frontier
            .seed(kind, &config.seed)
            .await
            .with_context(|| format!("failed to seed {}", config.seed))?;
    }

    let reports = frontier.run(cli.max_passes).await?;

    let processed: u64 = reports.iter().map(|r| r.processed).sum();
    let quarantined: u64 = reports.iter().map(|r| r.quarantined).sum();
    tracing::info!(
        "Crawl finished after {} passes: {} processed, {} quarantined, {} nodes, {} edges",
        reports.len(),
        processed,
        quarantined,
        store.count_nodes()?,
        store.count_edges()?
    );

    if frontier.has_unprocessed()? {
        tracing::info!("Unprocessed nodes remain; run again to continue");
    }

    Ok(())
}
