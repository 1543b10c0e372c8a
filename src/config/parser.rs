use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect configuration drift between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL: &str = r#"
[user-agent]
crawler-name = "SeineTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "ops@example.com"
"#;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.crawler.max_pages, 50);
        assert_eq!(config.crawler.max_concurrent_fetches, 8);
        assert_eq!(config.storage.flush_interval_secs, 3600);
        assert_eq!(config.storage.retention_days, 30);
        assert_eq!(config.search.freshness_days, 7);
        assert!((config.search.min_score - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
[crawler]
max-depth = 3
max-pages = 100
max-concurrent-fetches = 4
max-per-domain = 1
min-relevance = 0.5
retry-backoff-ms = 250

[user-agent]
crawler-name = "SeineTest"
crawler-version = "2.0"
contact-url = "https://example.com/bot"
contact-email = "crawler@example.com"

[buffer]
max-memory-bytes = 1048576

[storage]
train-dir = "/tmp/seine-train"
flush-interval-secs = 60
retention-days = 7

[search]
default-limit = 20
min-score = 0.4
freshness-days = 3
"#;
        let file = create_temp_config(content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_per_domain, 1);
        assert_eq!(config.buffer.max_memory_bytes, 1048576);
        assert_eq!(config.storage.train_dir, "/tmp/seine-train");
        assert_eq!(config.search.default_limit, 20);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        assert!(load_config(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = r#"
[crawler]
max-concurrent-fetches = 0

[user-agent]
crawler-name = "SeineTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "ops@example.com"
"#;
        let file = create_temp_config(content);
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_compute_config_hash_is_stable() {
        let file = create_temp_config("test content");
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");
        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config(MINIMAL);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.user_agent.crawler_name, "SeineTest");
        assert_eq!(hash.len(), 64);
    }
}
