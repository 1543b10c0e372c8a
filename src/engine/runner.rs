//! Per-job crawl worker
//!
//! Each job is driven by exactly one owner task, which is the only place the
//! job's registry entry is mutated. The owner walks the frontier in BFS
//! order and fans page fetches out onto the shared worker pool: a global
//! semaphore bounds fetches across all jobs, and the domain guard defers any
//! URL whose domain is already at its in-flight cap.

use crate::engine::domains::DomainPermit;
use crate::engine::CrawlEngine;
use crate::fetch::PageFetcher;
use crate::model::{CrawlResult, JobStatus};
use crate::score::score_page;
use crate::url::{canonical_url, extract_domain};
use crate::HarvestError;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

/// Title recorded when a page declares none
const UNTITLED: &str = "Untitled Document";

/// Idle wait when every frontier domain is at its politeness cap
const DEFERRAL_WAIT: Duration = Duration::from_millis(50);

/// What one fetch task hands back to the job owner
struct PageOutcome {
    depth: u32,
    result: Option<CrawlResult>,
    links: Vec<String>,
    fetch_failed: bool,
}

/// Runs a job to a terminal status
pub(crate) async fn run_job(engine: Arc<CrawlEngine>, job_id: String, cancel: Arc<AtomicBool>) {
    let Some(job) = engine.job_snapshot(&job_id) else {
        tracing::error!("Job {} vanished before its worker started", job_id);
        return;
    };

    engine.update_job(&job_id, |j| {
        j.status = JobStatus::Running;
        j.updated_at = Utc::now();
    });

    let keywords = Arc::new(job.keywords.clone());
    let max_depth = job.max_depth;
    let max_pages = job.max_pages;
    let min_relevance = job.min_relevance;

    // Link eligibility: stay on the seed domains
    let allowed_domains: HashSet<String> =
        job.seeds.iter().filter_map(extract_domain).collect();

    let mut frontier: VecDeque<(Url, u32)> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    for seed in &job.seeds {
        if visited.insert(seed.as_str().to_string()) {
            frontier.push_back((seed.clone(), 0));
        }
    }

    let mut in_flight: JoinSet<PageOutcome> = JoinSet::new();
    let mut dispatched: u32 = 0;
    let mut pages_crawled: u32 = 0;
    let mut result_count: u32 = 0;
    let mut failed_fetches: u32 = 0;
    let mut internal_error: Option<String> = None;

    'crawl: loop {
        // Cancellation is polled between frontier items
        if cancel.load(Ordering::Relaxed) {
            break 'crawl;
        }

        // Dispatch as much ready work as the pool allows
        while dispatched < max_pages
            && in_flight.len() < engine.config.max_concurrent_fetches
        {
            let Some((url, depth, domain_permit)) = pop_ready(&mut frontier, &engine) else {
                break;
            };

            let permit = match engine.fetch_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    internal_error = Some("fetch pool closed".to_string());
                    break 'crawl;
                }
            };

            let fetcher = Arc::clone(&engine.fetcher);
            let task_job_id = job_id.clone();
            let task_keywords = Arc::clone(&keywords);
            let backoff_ms = engine.config.retry_backoff_ms;
            in_flight.spawn(async move {
                let outcome = fetch_and_score(
                    fetcher,
                    url,
                    depth,
                    task_job_id,
                    task_keywords,
                    min_relevance,
                    backoff_ms,
                )
                .await;
                drop(domain_permit);
                drop(permit);
                outcome
            });
            dispatched += 1;
        }

        if in_flight.is_empty() {
            if frontier.is_empty() || dispatched >= max_pages {
                break 'crawl;
            }
            // Every queued domain is saturated (possibly by other jobs):
            // defer without blocking anyone else's progress
            tokio::time::sleep(DEFERRAL_WAIT).await;
            continue;
        }

        let outcome = match in_flight.join_next().await {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                tracing::error!("Crawl task for job {} panicked: {}", job_id, e);
                pages_crawled += 1;
                continue;
            }
            None => continue,
        };
        pages_crawled += 1;
        if outcome.fetch_failed {
            failed_fetches += 1;
        }

        // Results arriving after cancellation are discarded
        if cancel.load(Ordering::Relaxed) {
            continue;
        }

        if let Some(result) = outcome.result {
            match append_with_backpressure(&engine, result) {
                Ok(()) => result_count += 1,
                Err(message) => {
                    internal_error = Some(message);
                    break 'crawl;
                }
            }
        }

        if outcome.depth < max_depth {
            for link in outcome.links {
                let Ok(link_url) = canonical_url(&link) else {
                    continue;
                };
                let Some(domain) = extract_domain(&link_url) else {
                    continue;
                };
                if !allowed_domains.contains(&domain) {
                    continue;
                }
                if visited.insert(link_url.as_str().to_string()) {
                    frontier.push_back((link_url, outcome.depth + 1));
                }
            }
        }

        engine.update_job(&job_id, |j| {
            j.pages_crawled = pages_crawled;
            j.result_count = result_count;
            j.failed_fetches = failed_fetches;
            j.updated_at = Utc::now();
        });
    }

    // Let in-flight fetches finish, discarding whatever they return
    while in_flight.join_next().await.is_some() {}

    let status = if internal_error.is_some() {
        JobStatus::Failed
    } else if cancel.load(Ordering::Relaxed) {
        JobStatus::Cancelled
    } else {
        JobStatus::Completed
    };

    engine.update_job(&job_id, |j| {
        j.status = status;
        j.pages_crawled = pages_crawled;
        j.result_count = result_count;
        j.failed_fetches = failed_fetches;
        j.error = internal_error.clone();
        j.completed_at = Some(Utc::now());
        j.updated_at = Utc::now();
    });

    tracing::info!(
        "Job {} {} after {} pages ({} results kept)",
        job_id,
        status,
        pages_crawled,
        result_count
    );
}

/// Pops the first frontier URL whose domain has a free politeness slot
///
/// URLs whose domain is at its cap rotate to the back of the queue; one full
/// rotation without a hit means nothing is ready right now.
fn pop_ready(
    frontier: &mut VecDeque<(Url, u32)>,
    engine: &Arc<CrawlEngine>,
) -> Option<(Url, u32, DomainPermit)> {
    for _ in 0..frontier.len() {
        let (url, depth) = frontier.pop_front()?;
        let domain = extract_domain(&url).unwrap_or_default();
        match engine.domains.try_begin(&domain) {
            Some(permit) => return Some((url, depth, permit)),
            None => frontier.push_back((url, depth)),
        }
    }
    None
}

/// Fetches one page (with a single retry) and scores it
async fn fetch_and_score(
    fetcher: Arc<dyn PageFetcher>,
    url: Url,
    depth: u32,
    job_id: String,
    keywords: Arc<Vec<String>>,
    min_relevance: f64,
    backoff_ms: u64,
) -> PageOutcome {
    let page = match fetcher.fetch(&url).await {
        Ok(page) => page,
        Err(e) if e.is_retryable() => {
            tracing::debug!("Retrying {} after transient failure: {}", url, e);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            match fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Dropping {} after retry: {}", url, e);
                    return PageOutcome {
                        depth,
                        result: None,
                        links: Vec::new(),
                        fetch_failed: true,
                    };
                }
            }
        }
        Err(e) => {
            tracing::warn!("Dropping {}: {}", url, e);
            return PageOutcome {
                depth,
                result: None,
                links: Vec::new(),
                fetch_failed: true,
            };
        }
    };

    let title = page.title.unwrap_or_else(|| UNTITLED.to_string());
    let (score, matched) = score_page(&page.text, &title, &keywords);

    let result = if score >= min_relevance {
        Some(CrawlResult::from_page(
            &job_id,
            &url,
            &title,
            &page.text,
            matched,
            score,
            page.publish_date,
        ))
    } else {
        tracing::debug!("Rejected {} with score {:.3}", url, score);
        None
    };

    PageOutcome {
        depth,
        result,
        links: page.links,
        fetch_failed: false,
    }
}

/// Appends a result, treating a full buffer as backpressure
///
/// The first rejection triggers an immediate flush (which makes the oldest
/// entries evictable) and one retry. A second rejection means the buffer
/// cannot hold the record at all, which is the unrecoverable capacity error
/// that fails the job.
fn append_with_backpressure(engine: &Arc<CrawlEngine>, result: CrawlResult) -> Result<(), String> {
    match engine.buffer.append(result.clone()) {
        Ok(_) => Ok(()),
        Err(HarvestError::BufferFull { .. }) => {
            tracing::warn!("Result buffer full, forcing an early flush");
            if let Err(e) = engine.shards.flush_now() {
                tracing::error!("Forced flush failed: {}", e);
            }
            match engine.buffer.append(result) {
                Ok(_) => Ok(()),
                Err(e) => Err(format!("buffer capacity exhausted: {}", e)),
            }
        }
        Err(e) => Err(format!("buffer append failed: {}", e)),
    }
}
