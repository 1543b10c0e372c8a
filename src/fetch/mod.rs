//! Page fetching
//!
//! The crawl engine consumes pages through the [`PageFetcher`] trait so the
//! rendering pipeline (plain HTTP here, a headless browser elsewhere) stays
//! swappable and tests can substitute canned pages. [`HttpFetcher`] is the
//! bundled reqwest-based implementation.

mod http;

pub use http::{build_http_client, HttpFetcher};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A fetched and text-extracted page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Page title, if one was found
    pub title: Option<String>,

    /// Extracted readable text
    pub text: String,

    /// Absolute outbound links
    pub links: Vec<String>,

    /// Publish date as an ISO-8601 string, if the page declared one
    pub publish_date: Option<String>,
}

/// Per-page fetch failures
///
/// These are recorded and skipped by the crawl engine; they never propagate
/// to the caller of `create_job`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Not HTML at {url}: {content_type}")]
    NotHtml { url: String, content_type: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    /// Whether a single retry with backoff is worthwhile
    ///
    /// Server errors, timeouts and transport failures are transient; client
    /// errors and non-HTML responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::NotHtml { .. } | FetchError::Body { .. } => false,
        }
    }
}

/// Interface to the page-rendering layer
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches one URL and returns its rendered text, links and metadata
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}
