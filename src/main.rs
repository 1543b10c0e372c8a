//! Seine-Harvest command-line entry point
//!
//! Wires the engine, buffer, shard store and search index together around a
//! TOML configuration and exposes the operations as subcommands.

use anyhow::Context;
use clap::{Parser, Subcommand};
use seine_harvest::config::load_config_with_hash;
use seine_harvest::engine::JobSpec;
use seine_harvest::fetch::HttpFetcher;
use seine_harvest::search::{SearchIndex, SearchOptions};
use seine_harvest::{CrawlEngine, ResultBuffer, ShardStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Seine-Harvest: keyword-driven web harvesting into training shards
#[derive(Parser, Debug)]
#[command(name = "seine")]
#[command(version = "1.0.0")]
#[command(about = "Crawl, score and accumulate web content as training data", long_about = None)]
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

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one crawl job to completion and flush its results
    Crawl {
        /// Comma-separated keyword list
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Seed URLs (repeatable)
        #[arg(long, required = true)]
        seed: Vec<String>,

        /// Override the configured depth bound
        #[arg(long)]
        max_depth: Option<u32>,

        /// Override the configured page budget
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Query the visible corpus
    Search {
        /// Query string
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long)]
        freshness_days: Option<i64>,
    },

    /// Show the shard catalog
    Stats,

    /// Run the retention sweep now
    Compact,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) =
        load_config_with_hash(&cli.config).context("failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    let buffer = Arc::new(ResultBuffer::new(config.buffer.max_memory_bytes));
    let shards = Arc::new(
        ShardStore::open(
            &config.storage.train_dir,
            config.storage.retention_days,
            Arc::clone(&buffer),
        )
        .context("failed to open the training directory")?,
    );

    match cli.command {
        Command::Crawl {
            keywords,
            seed,
            max_depth,
            max_pages,
        } => {
            handle_crawl(&config, buffer, shards, keywords, seed, max_depth, max_pages).await
        }
        Command::Search {
            query,
            limit,
            min_score,
            freshness_days,
        } => handle_search(&config, buffer, shards, query, limit, min_score, freshness_days),
        Command::Stats => handle_stats(shards),
        Command::Compact => handle_compact(shards),
    }
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("seine_harvest=info,warn"),
            1 => EnvFilter::new("seine_harvest=debug,info"),
            2 => EnvFilter::new("seine_harvest=trace,debug"),
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

async fn handle_crawl(
    config: &seine_harvest::Config,
    buffer: Arc<ResultBuffer>,
    shards: Arc<ShardStore>,
    keywords: Vec<String>,
    seeds: Vec<String>,
    max_depth: Option<u32>,
    max_pages: Option<u32>,
) -> anyhow::Result<()> {
    let fetcher = Arc::new(
        HttpFetcher::new(&config.user_agent).context("failed to build the HTTP client")?,
    );
    let engine = CrawlEngine::new(config.crawler.clone(), fetcher, buffer, shards);
    let handles =
        engine.spawn_maintenance(Duration::from_secs(config.storage.flush_interval_secs));

    let job_id = engine.create_job(JobSpec {
        keywords,
        seeds,
        max_depth,
        max_pages,
        min_relevance: None,
    })?;
    println!("Job {} started", job_id);

    let job = engine.wait_until_terminal(&job_id).await?;
    println!(
        "Job {}: {} ({} pages crawled, {} results kept)",
        job.id, job.status, job.pages_crawled, job.result_count
    );
    if let Some(error) = &job.error {
        println!("Error: {}", error);
    }

    // Orderly shutdown flushes whatever the job buffered
    engine.shutdown(handles).await;
    Ok(())
}

fn handle_search(
    config: &seine_harvest::Config,
    buffer: Arc<ResultBuffer>,
    shards: Arc<ShardStore>,
    query: String,
    limit: Option<usize>,
    min_score: Option<f64>,
    freshness_days: Option<i64>,
) -> anyhow::Result<()> {
    let index = SearchIndex::new(buffer, shards);
    let opts = SearchOptions {
        limit: limit.unwrap_or(config.search.default_limit),
        min_score: min_score.unwrap_or(config.search.min_score),
        freshness_days: freshness_days.unwrap_or(config.search.freshness_days),
    };

    let hits = index.search(&query, &opts)?;
    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }

    for hit in hits {
        println!("{:.3}  {}  {}", hit.score, hit.url, hit.title);
        println!("       {}", hit.excerpt);
    }
    Ok(())
}

fn handle_stats(shards: Arc<ShardStore>) -> anyhow::Result<()> {
    let entries = shards.catalog_entries();
    if entries.is_empty() {
        println!("No shards yet");
        return Ok(());
    }

    println!("{:<36} {:>10} {:>12}  {}", "shard", "records", "bytes", "state");
    for (name, entry) in &entries {
        println!(
            "{:<36} {:>10} {:>12}  {}",
            name,
            entry.record_count,
            entry.size_bytes,
            if entry.archived { "archived" } else { "hot" }
        );
    }
    println!("Total records: {}", shards.total_records());
    Ok(())
}

fn handle_compact(shards: Arc<ShardStore>) -> anyhow::Result<()> {
    let report = shards.compact()?;
    if report.archived.is_empty() {
        println!("Nothing to archive");
    } else {
        for name in &report.archived {
            println!("Archived {}", name);
        }
    }
    Ok(())
}
