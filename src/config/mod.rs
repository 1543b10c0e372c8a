//! Configuration loading and validation
//!
//! Settings come from a single TOML file with kebab-case keys. The loader
//! parses, validates, and hashes the file so runs can detect configuration
//! drift.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    BufferConfig, Config, CrawlerConfig, SearchConfig, StorageConfig, UserAgentConfig,
};
pub use validation::validate;
