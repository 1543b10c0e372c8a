//! Job and Result data model
//!
//! `Job` is the registry snapshot callers see; frontier and visited state
//! stay inside the owning worker. `CrawlResult` is the unit of training data:
//! immutable once created apart from its append-only `labels` list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Maximum excerpt length in characters
const EXCERPT_MAX_LEN: usize = 420;

/// Lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A crawl job as seen through the registry
///
/// Mutated only by its owning worker task; everyone else gets clones.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub keywords: Vec<String>,
    #[serde(serialize_with = "serialize_urls")]
    pub seeds: Vec<Url>,
    pub max_depth: u32,
    pub max_pages: u32,
    pub min_relevance: f64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pages_crawled: u32,
    pub result_count: u32,
    pub failed_fetches: u32,
    pub error: Option<String>,
}

fn serialize_urls<S>(urls: &[Url], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(urls.iter().map(|u| u.as_str()))
}

impl Job {
    /// Creates a queued job with fresh timestamps
    pub fn new(
        id: String,
        keywords: Vec<String>,
        seeds: Vec<Url>,
        max_depth: u32,
        max_pages: u32,
        min_relevance: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            keywords,
            seeds,
            max_depth,
            max_pages,
            min_relevance,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            completed_at: None,
            pages_crawled: 0,
            result_count: 0,
            failed_fetches: 0,
            error: None,
        }
    }
}

/// One accepted page, shaped for the training corpus
///
/// Full page bodies are never retained; only the derived fields below are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub job_id: String,
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub normalized_text: String,
    pub matched_keywords: Vec<String>,
    pub score: f64,
    #[serde(default)]
    pub publish_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub source_domain: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub content_hash: String,
    pub tokens_est: usize,
}

impl CrawlResult {
    /// Builds a Result from a scored page
    ///
    /// Collapses whitespace into `normalized_text`, derives the excerpt and
    /// token estimate from it, and hashes it for cross-job deduplication.
    pub fn from_page(
        job_id: &str,
        url: &Url,
        title: &str,
        text: &str,
        matched_keywords: Vec<String>,
        score: f64,
        publish_date: Option<String>,
    ) -> Self {
        let normalized_text = normalize_text(text);
        let content_hash = hex::encode(Sha256::digest(normalized_text.as_bytes()));
        let tokens_est = normalized_text.split_whitespace().count();
        let source_domain = crate::url::extract_domain(url).unwrap_or_default();

        Self {
            job_id: job_id.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            excerpt: build_excerpt(&normalized_text),
            normalized_text,
            matched_keywords,
            score,
            publish_date,
            created_at: Utc::now(),
            source_domain,
            labels: Vec::new(),
            content_hash,
            tokens_est,
        }
    }
}

/// Collapses all whitespace runs into single spaces
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds a bounded excerpt from normalized text
fn build_excerpt(normalized: &str) -> String {
    if normalized.chars().count() <= EXCERPT_MAX_LEN {
        return normalized.to_string();
    }
    let cut: String = normalized.chars().take(EXCERPT_MAX_LEN - 3).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(text: &str) -> CrawlResult {
        let url = Url::parse("https://example.com/article").unwrap();
        CrawlResult::from_page(
            "job-1",
            &url,
            "Sample",
            text,
            vec!["rust".to_string()],
            0.8,
            None,
        )
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_job_defaults() {
        let seeds = vec![Url::parse("https://example.com/").unwrap()];
        let job = Job::new("id-1".into(), vec!["k".into()], seeds, 2, 50, 0.35);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.pages_crawled, 0);
        assert_eq!(job.result_count, 0);
        assert!(job.completed_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let result = sample_result("rust content body");
        assert_eq!(result.content_hash.len(), 64);
        assert!(result.content_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_text_same_hash_across_jobs() {
        let url = Url::parse("https://a.example.com/x").unwrap();
        let other = Url::parse("https://b.example.com/y").unwrap();
        let a = CrawlResult::from_page("job-a", &url, "t", "identical body", vec![], 0.5, None);
        let b = CrawlResult::from_page("job-b", &other, "t", "identical body", vec![], 0.5, None);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a\n\n  b\t c  "), "a b c");
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        let result = sample_result("short body");
        assert_eq!(result.excerpt, "short body");
    }

    #[test]
    fn test_excerpt_truncated_with_ellipsis() {
        let long = "word ".repeat(200);
        let result = sample_result(&long);
        assert!(result.excerpt.chars().count() <= EXCERPT_MAX_LEN);
        assert!(result.excerpt.ends_with("..."));
    }

    #[test]
    fn test_tokens_est_counts_whitespace_tokens() {
        let result = sample_result("one two three");
        assert_eq!(result.tokens_est, 3);
    }

    #[test]
    fn test_source_domain_lowercased() {
        let url = Url::parse("https://News.Example.COM/item").unwrap();
        let r = CrawlResult::from_page("j", &url, "t", "text", vec![], 0.4, None);
        assert_eq!(r.source_domain, "news.example.com");
    }

    #[test]
    fn test_result_roundtrips_through_json() {
        let result = sample_result("serialize me please");
        let line = serde_json::to_string(&result).unwrap();
        let back: CrawlResult = serde_json::from_str(&line).unwrap();
        assert_eq!(back.content_hash, result.content_hash);
        assert_eq!(back.url, result.url);
        assert_eq!(back.tokens_est, result.tokens_est);
    }
}
