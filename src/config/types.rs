use serde::Deserialize;

/// Main configuration structure for Seine-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Crawl engine behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Default maximum depth from seed URLs
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Default maximum pages fetched per job
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Global worker pool size (concurrent fetches across all jobs)
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-domain in-flight fetch cap (politeness)
    #[serde(rename = "max-per-domain", default = "default_max_per_domain")]
    pub max_per_domain: usize,

    /// Default relevance threshold for keeping a page
    #[serde(rename = "min-relevance", default = "default_min_relevance")]
    pub min_relevance: f64,

    /// Backoff before the single fetch retry (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// User agent identification
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    #[serde(rename = "contact-url")]
    pub contact_url: String,

    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Result buffer budget
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Maximum bytes of serialized results held in RAM
    #[serde(rename = "max-memory-bytes", default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
}

/// Training-data persistence
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding shards, the catalog and the archive
    #[serde(rename = "train-dir", default = "default_train_dir")]
    pub train_dir: String,

    /// Seconds between automatic flushes
    #[serde(rename = "flush-interval-secs", default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Days a shard stays hot before the archival sweep takes it
    #[serde(rename = "retention-days", default = "default_retention_days")]
    pub retention_days: i64,
}

/// Search defaults
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(rename = "default-limit", default = "default_search_limit")]
    pub default_limit: usize,

    #[serde(rename = "min-score", default = "default_min_score")]
    pub min_score: f64,

    #[serde(rename = "freshness-days", default = "default_freshness_days")]
    pub freshness_days: i64,
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_pages() -> u32 {
    50
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_per_domain() -> usize {
    2
}

fn default_min_relevance() -> f64 {
    0.35
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_memory_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_train_dir() -> String {
    "data/train".to_string()
}

fn default_flush_interval_secs() -> u64 {
    3600
}

fn default_retention_days() -> i64 {
    30
}

fn default_search_limit() -> usize {
    10
}

fn default_min_score() -> f64 {
    0.35
}

fn default_freshness_days() -> i64 {
    7
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_per_domain: default_max_per_domain(),
            min_relevance: default_min_relevance(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: default_max_memory_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            train_dir: default_train_dir(),
            flush_interval_secs: default_flush_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            min_score: default_min_score(),
            freshness_days: default_freshness_days(),
        }
    }
}
