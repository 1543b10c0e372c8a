//! Reqwest-based fetch adapter
//!
//! Fetches a page over plain HTTP, checks the Content-Type, and extracts
//! title, readable text, outbound links and a publish date from the HTML.
//! All HTML parsing happens synchronously between awaits; `scraper::Html`
//! is not `Send` and must never be held across a suspension point.

use crate::config::UserAgentConfig;
use crate::fetch::{FetchError, FetchedPage, PageFetcher};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Meta keys checked for a publish date, in order of preference
const PUBLISH_META_KEYS: &[&str] = &[
    "article:published_time",
    "article:modified_time",
    "og:updated_time",
    "date",
];

/// Builds an HTTP client with the crawler's user-agent string
///
/// # Arguments
///
/// * `config` - The user agent configuration
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The bundled [`PageFetcher`] implementation
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Wraps an already-built client (shared connection pools)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") {
            return Err(FetchError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let extracted = extract_page(&body, &final_url);

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            title: extracted.title,
            text: extracted.text,
            links: extracted.links,
            publish_date: extracted.publish_date,
        })
    }
}

fn classify_transport_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

struct ExtractedPage {
    title: Option<String>,
    text: String,
    links: Vec<String>,
    publish_date: Option<String>,
}

/// Parses HTML and pulls out everything the engine needs in one pass
fn extract_page(html: &str, base_url: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);

    ExtractedPage {
        title: extract_title(&document),
        text: extract_text(&document),
        links: extract_links(&document, base_url),
        publish_date: extract_publish_date(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects readable text from content-bearing elements
///
/// Headings, paragraphs and list items cover article bodies well without
/// dragging in navigation chrome or script payloads.
fn extract_text(document: &Html) -> String {
    let selector = match Selector::parse("p, h1, h2, h3, h4, h5, h6, li") {
        Ok(s) => s,
        Err(_) => return String::new(),
    };

    let mut parts = Vec::new();
    for element in document.select(&selector) {
        let chunk = element.text().collect::<String>();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            parts.push(chunk.to_string());
        }
    }

    parts.join(" ")
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    links.push(absolute);
                }
            }
        }
    }

    links
}

/// Resolves an href to an absolute http(s) URL, or drops it
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

fn extract_publish_date(document: &Html) -> Option<String> {
    for key in PUBLISH_META_KEYS {
        for attr in ["property", "name"] {
            let query = format!("meta[{}=\"{}\"]", attr, key);
            if let Some(selector) = Selector::parse(&query).ok() {
                if let Some(content) = document
                    .select(&selector)
                    .next()
                    .and_then(|e| e.value().attr("content"))
                {
                    let content = content.trim();
                    if !content.is_empty() {
                        return Some(content.to_string());
                    }
                }
            }
        }
    }

    let selector = Selector::parse("time[datetime]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("datetime"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
