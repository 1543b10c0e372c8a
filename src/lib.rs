//! Seine-Harvest: a keyword-driven web harvester that accumulates training data
//!
//! This crate implements an on-demand crawl job engine: pages are fetched
//! breadth-first from seed URLs, scored against a job's keyword list, buffered
//! in RAM under a byte budget, flushed hourly to durable JSONL shards, and
//! archived after a retention window. A BM25-style search runs over the
//! in-memory buffer and the recent on-disk shards together.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod model;
pub mod score;
pub mod search;
pub mod shard;
pub mod url;

use thiserror::Error;

/// Main error type for Seine-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Buffer full: {needed} bytes requested, {in_use} in use of {capacity}")]
    BufferFull {
        needed: usize,
        in_use: usize,
        capacity: usize,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] shard::PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarvestError {
    /// Stable machine-readable code for user-visible errors
    pub fn error_code(&self) -> &'static str {
        match self {
            HarvestError::InvalidInput(_) => "invalid_input",
            HarvestError::NotFound(_) => "not_found",
            HarvestError::Fetch(_) => "fetch_failed",
            HarvestError::BufferFull { .. } => "buffer_full",
            HarvestError::Persistence(_) => "persistence",
            HarvestError::Config(_) => "config",
            HarvestError::UrlError(_) | HarvestError::UrlParse(_) => "url",
            HarvestError::Io(_) => "io",
            HarvestError::Internal(_) => "internal",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Seine-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use buffer::ResultBuffer;
pub use config::Config;
pub use engine::CrawlEngine;
pub use model::{CrawlResult, Job, JobStatus};
pub use search::SearchIndex;
pub use shard::ShardStore;
pub use url::{canonical_url, extract_domain};
