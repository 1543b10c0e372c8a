//! Semantic validation of a parsed configuration

use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration
///
/// Checks the constraints TOML's type system cannot express: positive
/// concurrency limits, in-range thresholds, non-empty identification fields.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.max_pages == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-pages must be at least 1".to_string(),
        ));
    }

    if crawler.max_concurrent_fetches == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-concurrent-fetches must be at least 1".to_string(),
        ));
    }

    if crawler.max_per_domain == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-per-domain must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&crawler.min_relevance) {
        return Err(ConfigError::Validation(format!(
            "crawler.min-relevance must be within [0.0, 1.0], got {}",
            crawler.min_relevance
        )));
    }

    if config.user_agent.crawler_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent.crawler-name must not be empty".to_string(),
        ));
    }

    if config.user_agent.contact_email.trim().is_empty()
        || !config.user_agent.contact_email.contains('@')
    {
        return Err(ConfigError::Validation(
            "user-agent.contact-email must be a plausible email address".to_string(),
        ));
    }

    if !config.user_agent.contact_url.starts_with("http") {
        return Err(ConfigError::InvalidUrl(
            config.user_agent.contact_url.clone(),
        ));
    }

    if config.buffer.max_memory_bytes == 0 {
        return Err(ConfigError::Validation(
            "buffer.max-memory-bytes must be greater than zero".to_string(),
        ));
    }

    if config.storage.train_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.train-dir must not be empty".to_string(),
        ));
    }

    if config.storage.flush_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "storage.flush-interval-secs must be at least 1".to_string(),
        ));
    }

    if config.storage.retention_days < 1 {
        return Err(ConfigError::Validation(
            "storage.retention-days must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.search.min_score) {
        return Err(ConfigError::Validation(format!(
            "search.min-score must be within [0.0, 1.0], got {}",
            config.search.min_score
        )));
    }

    if config.search.freshness_days < 0 {
        return Err(ConfigError::Validation(
            "search.freshness-days must not be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn valid_config() -> Config {
        Config {
            crawler: CrawlerConfig::default(),
            user_agent: UserAgentConfig {
                crawler_name: "SeineHarvest".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "ops@example.com".to_string(),
            },
            buffer: BufferConfig::default(),
            storage: StorageConfig::default(),
            search: SearchConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.crawler.max_concurrent_fetches = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_max_pages_rejected() {
        let mut config = valid_config();
        config.crawler.max_pages = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_out_of_range_relevance_rejected() {
        let mut config = valid_config();
        config.crawler.min_relevance = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_contact_email_rejected() {
        let mut config = valid_config();
        config.user_agent.contact_email = "not-an-email".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_contact_url_rejected() {
        let mut config = valid_config();
        config.user_agent.contact_url = "ftp://example.com".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = valid_config();
        config.buffer.max_memory_bytes = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_train_dir_rejected() {
        let mut config = valid_config();
        config.storage.train_dir = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let mut config = valid_config();
        config.storage.retention_days = 0;
        assert!(validate(&config).is_err());
    }
}
