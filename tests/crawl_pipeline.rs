//! End-to-end tests for the crawl pipeline
//!
//! These tests use wiremock to stand up a real HTTP server and drive the
//! whole path: fetch, score, buffer, flush to shards, and search.

use seine_harvest::config::{CrawlerConfig, UserAgentConfig};
use seine_harvest::engine::JobSpec;
use seine_harvest::fetch::HttpFetcher;
use seine_harvest::search::{SearchIndex, SearchOptions};
use seine_harvest::{CrawlEngine, JobStatus, ResultBuffer, ShardStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "SeineTest".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

async fn mount_site(server: &MockServer) {
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<html><head><title>Rust Hub</title></head><body>
            <p>rust articles and rust news collected here, all about rust</p>
            <a href="{base}/post">Rust post</a>
            <a href="{base}/gardening">Gardening</a>
            </body></html>"#,
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html(
            r#"<html><head><title>Async Rust</title>
            <meta property="article:published_time" content="2026-08-01T10:00:00Z">
            </head><body>
            <p>a long rust writeup about rust runtimes and rust executors</p>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gardening"))
        .respond_with(html(
            r#"<html><head><title>Tomatoes</title></head><body>
            <p>soil, compost and watering schedules</p>
            </body></html>"#,
        ))
        .mount(server)
        .await;
}

struct Pipeline {
    engine: Arc<CrawlEngine>,
    buffer: Arc<ResultBuffer>,
    shards: Arc<ShardStore>,
    _dir: tempfile::TempDir,
}

fn build_pipeline() -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let buffer = Arc::new(ResultBuffer::new(4 << 20));
    let shards = Arc::new(ShardStore::open(dir.path(), 30, Arc::clone(&buffer)).unwrap());
    let fetcher = Arc::new(HttpFetcher::new(&test_user_agent()).unwrap());
    let config = CrawlerConfig {
        retry_backoff_ms: 10,
        ..CrawlerConfig::default()
    };
    let engine = CrawlEngine::new(config, fetcher, Arc::clone(&buffer), Arc::clone(&shards));
    Pipeline {
        engine,
        buffer,
        shards,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_crawl_flush_search_roundtrip() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let pipeline = build_pipeline();
    let job_id = pipeline
        .engine
        .create_job(JobSpec {
            keywords: vec!["rust".to_string()],
            seeds: vec![format!("{}/", server.uri())],
            max_pages: Some(3),
            ..JobSpec::default()
        })
        .unwrap();

    let job = pipeline.engine.wait_until_terminal(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.pages_crawled <= 3);
    assert_eq!(job.result_count, 2, "the gardening page is filtered out");

    // Hash and metadata sanity on every kept record
    for record in pipeline.buffer.snapshot() {
        assert_eq!(record.content_hash.len(), 64);
        assert!(record.content_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(record.matched_keywords.contains(&"rust".to_string()));
        assert!(record.score >= 0.35);
        assert!(record.tokens_est > 0);
    }

    // The publish date made it through the adapter
    assert!(pipeline
        .buffer
        .snapshot()
        .iter()
        .any(|r| r.publish_date.as_deref() == Some("2026-08-01T10:00:00Z")));

    // Flush and verify durability accounting
    let shard = pipeline.shards.flush_now().unwrap().expect("data to flush");
    assert_eq!(pipeline.shards.total_records(), 2);
    assert!(pipeline.shards.train_dir().join(&shard).exists());

    // Search returns the matching results above the default threshold
    let index = SearchIndex::new(
        Arc::clone(&pipeline.buffer),
        Arc::clone(&pipeline.shards),
    );
    let hits = index.search("rust", &SearchOptions::default()).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.score >= 0.35));
    assert!(hits.iter().any(|h| h.title == "Async Rust"));
}

#[tokio::test]
async fn test_restart_preserves_durable_records() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let total_flushed;

    {
        let buffer = Arc::new(ResultBuffer::new(4 << 20));
        let shards = Arc::new(ShardStore::open(dir.path(), 30, Arc::clone(&buffer)).unwrap());
        let fetcher = Arc::new(HttpFetcher::new(&test_user_agent()).unwrap());
        let config = CrawlerConfig {
            retry_backoff_ms: 10,
            ..CrawlerConfig::default()
        };
        let engine = CrawlEngine::new(config, fetcher, Arc::clone(&buffer), Arc::clone(&shards));

        let job_id = engine
            .create_job(JobSpec {
                keywords: vec!["rust".to_string()],
                seeds: vec![format!("{}/", server.uri())],
                ..JobSpec::default()
            })
            .unwrap();
        engine.wait_until_terminal(&job_id).await.unwrap();

        shards.flush_now().unwrap().expect("data to flush");
        total_flushed = shards.total_records();
        assert!(total_flushed > 0);

        // Simulate losing the catalog in a crash; the shard files survive
        std::fs::remove_file(dir.path().join("index.json")).unwrap();
    }

    // A fresh process reconciles the catalog from disk: no loss, no dupes
    let buffer = Arc::new(ResultBuffer::new(4 << 20));
    let shards = Arc::new(ShardStore::open(dir.path(), 30, Arc::clone(&buffer)).unwrap());
    assert_eq!(shards.total_records(), total_flushed);

    // And the recovered records are still searchable from cold storage
    let index = SearchIndex::new(buffer, shards);
    let hits = index.search("rust", &SearchOptions::default()).unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn test_crawl_tolerates_dead_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<html><head><title>Rust Hub</title></head><body>
            <p>rust rust rust</p>
            <a href="{base}/missing">broken</a>
            </body></html>"#,
        )))
        .mount(&server)
        .await;
    // /missing is unmocked and returns 404

    let pipeline = build_pipeline();
    let job_id = pipeline
        .engine
        .create_job(JobSpec {
            keywords: vec!["rust".to_string()],
            seeds: vec![format!("{}/", base)],
            ..JobSpec::default()
        })
        .unwrap();

    let job = pipeline.engine.wait_until_terminal(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_count, 1);
}

#[tokio::test]
async fn test_maintenance_timer_flushes_periodically() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let pipeline = build_pipeline();
    let handles = pipeline
        .engine
        .spawn_maintenance(Duration::from_millis(50));

    let job_id = pipeline
        .engine
        .create_job(JobSpec {
            keywords: vec!["rust".to_string()],
            seeds: vec![format!("{}/", server.uri())],
            ..JobSpec::default()
        })
        .unwrap();
    pipeline.engine.wait_until_terminal(&job_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(pipeline.shards.total_records() > 0);

    pipeline.engine.shutdown(handles).await;
}
