//! Crawl job engine
//!
//! Owns the job registry and the shared fetch resources. Each created job
//! gets its own owner task (see `runner`); the registry hands out snapshots
//! only. The buffer and shard store are injected at construction and shared
//! with the maintenance timers; nothing here is a process-wide global.

mod domains;
mod runner;

pub use domains::DomainGuard;

use crate::buffer::ResultBuffer;
use crate::config::CrawlerConfig;
use crate::fetch::PageFetcher;
use crate::model::Job;
use crate::shard::ShardStore;
use crate::{HarvestError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use url::Url;

/// Hours a terminal job stays in the registry before pruning
const JOB_RETENTION_HOURS: i64 = 24;

/// Hard ceiling on requested crawl depth
const MAX_DEPTH_CEILING: u32 = 5;

/// Hard ceiling on requested pages per job
const MAX_PAGES_CEILING: u32 = 500;

/// Seconds between retention sweeps
const COMPACT_INTERVAL_SECS: u64 = 86_400;

/// Parameters for a new crawl job
///
/// Optional fields fall back to the configured defaults and are clamped to
/// sane ranges either way.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub keywords: Vec<String>,
    pub seeds: Vec<String>,
    pub max_depth: Option<u32>,
    pub max_pages: Option<u32>,
    pub min_relevance: Option<f64>,
}

struct JobSlot {
    job: Job,
    cancel: Arc<AtomicBool>,
}

/// The crawl job engine
pub struct CrawlEngine {
    pub(crate) config: CrawlerConfig,
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) buffer: Arc<ResultBuffer>,
    pub(crate) shards: Arc<ShardStore>,
    pub(crate) fetch_permits: Arc<Semaphore>,
    pub(crate) domains: Arc<DomainGuard>,
    jobs: Mutex<HashMap<String, JobSlot>>,
}

impl CrawlEngine {
    /// Builds an engine around the injected buffer and shard store
    pub fn new(
        config: CrawlerConfig,
        fetcher: Arc<dyn PageFetcher>,
        buffer: Arc<ResultBuffer>,
        shards: Arc<ShardStore>,
    ) -> Arc<Self> {
        let fetch_permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
        let domains = Arc::new(DomainGuard::new(config.max_per_domain));
        Arc::new(Self {
            config,
            fetcher,
            buffer,
            shards,
            fetch_permits,
            domains,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Creates and starts a crawl job
    ///
    /// Validation fails fast with `InvalidInput` (no job is registered) when
    /// the seed list is empty or any seed is not an absolute http(s) URL.
    /// The returned id refers to an asynchronous job: results appear in the
    /// buffer as workers make progress, never inline.
    pub fn create_job(self: &Arc<Self>, spec: JobSpec) -> Result<String> {
        if spec.seeds.is_empty() {
            return Err(HarvestError::InvalidInput(
                "at least one seed URL is required".to_string(),
            ));
        }

        let mut seeds: Vec<Url> = Vec::with_capacity(spec.seeds.len());
        for seed in &spec.seeds {
            let url = crate::url::canonical_url(seed).map_err(|e| {
                HarvestError::InvalidInput(format!("seed '{}' is not crawlable: {}", seed, e))
            })?;
            seeds.push(url);
        }

        let keywords: Vec<String> = spec
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let max_depth = spec
            .max_depth
            .unwrap_or(self.config.max_depth)
            .min(MAX_DEPTH_CEILING);
        let max_pages = spec
            .max_pages
            .unwrap_or(self.config.max_pages)
            .clamp(1, MAX_PAGES_CEILING);
        let min_relevance = spec
            .min_relevance
            .unwrap_or(self.config.min_relevance)
            .clamp(0.10, 0.95);

        self.prune_expired();

        let job_id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(
            job_id.clone(),
            keywords,
            seeds,
            max_depth,
            max_pages,
            min_relevance,
        );
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut jobs = self.jobs.lock().expect("job registry lock poisoned");
            jobs.insert(
                job_id.clone(),
                JobSlot {
                    job,
                    cancel: Arc::clone(&cancel),
                },
            );
        }

        tracing::info!("Job {} queued with {} seeds", job_id, spec.seeds.len());
        tokio::spawn(runner::run_job(
            Arc::clone(self),
            job_id.clone(),
            cancel,
        ));

        Ok(job_id)
    }

    /// Returns a snapshot of the job, or `NotFound` if unknown or pruned
    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        self.job_snapshot(job_id)
            .ok_or_else(|| HarvestError::NotFound(format!("job {}", job_id)))
    }

    /// Snapshots of all registered jobs, newest first
    pub fn list_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().expect("job registry lock poisoned");
        let mut list: Vec<Job> = jobs.values().map(|slot| slot.job.clone()).collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Requests cancellation of a running job
    ///
    /// Only the flag is set here; the owning worker observes it between
    /// frontier items and performs the status transition. In-flight fetches
    /// complete but their results are discarded. Terminal jobs are left
    /// untouched.
    pub fn cancel_job(&self, job_id: &str) -> Result<()> {
        let jobs = self.jobs.lock().expect("job registry lock poisoned");
        let slot = jobs
            .get(job_id)
            .ok_or_else(|| HarvestError::NotFound(format!("job {}", job_id)))?;
        if !slot.job.status.is_terminal() {
            slot.cancel.store(true, Ordering::Relaxed);
            tracing::info!("Cancellation requested for job {}", job_id);
        }
        Ok(())
    }

    /// Appends labels to a buffered result (feedback path)
    pub fn add_labels(&self, content_hash: &str, labels: &[String]) -> bool {
        self.buffer.add_labels(content_hash, labels)
    }

    /// Drops terminal jobs older than the registry retention window
    pub fn prune_expired(&self) {
        self.prune_expired_at(Utc::now());
    }

    fn prune_expired_at(&self, now: DateTime<Utc>) {
        let cutoff = now - ChronoDuration::hours(JOB_RETENTION_HOURS);
        let mut jobs = self.jobs.lock().expect("job registry lock poisoned");
        let before = jobs.len();
        jobs.retain(|_, slot| {
            !(slot.job.status.is_terminal() && slot.job.updated_at < cutoff)
        });
        let pruned = before - jobs.len();
        if pruned > 0 {
            tracing::info!("Pruned {} expired jobs from the registry", pruned);
        }
    }

    /// Polls until the job reaches a terminal status
    pub async fn wait_until_terminal(&self, job_id: &str) -> Result<Job> {
        loop {
            let job = self.get_job(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn buffer(&self) -> &Arc<ResultBuffer> {
        &self.buffer
    }

    pub fn shards(&self) -> &Arc<ShardStore> {
        &self.shards
    }

    pub(crate) fn job_snapshot(&self, job_id: &str) -> Option<Job> {
        let jobs = self.jobs.lock().expect("job registry lock poisoned");
        jobs.get(job_id).map(|slot| slot.job.clone())
    }

    pub(crate) fn update_job(&self, job_id: &str, mutate: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.lock().expect("job registry lock poisoned");
        if let Some(slot) = jobs.get_mut(job_id) {
            mutate(&mut slot.job);
        }
    }

    /// Starts the flush and compaction timers
    ///
    /// Both run until `shutdown` is called. The flush tick also prunes the
    /// job registry; flush errors are logged and retried on the next tick.
    pub fn spawn_maintenance(self: &Arc<Self>, flush_interval: Duration) -> MaintenanceHandles {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let flush_engine = Arc::clone(self);
        let mut flush_rx = shutdown_rx.clone();
        let flush_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(flush_interval) => {
                        flush_engine.prune_expired();
                        if let Err(e) = flush_engine.shards.flush_now() {
                            tracing::error!("Scheduled flush failed, will retry: {}", e);
                        }
                    }
                    _ = flush_rx.changed() => break,
                }
            }
        });

        let compact_engine = Arc::clone(self);
        let mut compact_rx = shutdown_rx;
        let compact_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(COMPACT_INTERVAL_SECS)) => {
                        match compact_engine.shards.compact() {
                            Ok(report) if !report.archived.is_empty() => {
                                tracing::info!("Retention sweep archived {} shards", report.archived.len());
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Retention sweep failed, will retry: {}", e),
                        }
                    }
                    _ = compact_rx.changed() => break,
                }
            }
        });

        MaintenanceHandles {
            shutdown_tx,
            flush_task,
            compact_task,
        }
    }

    /// Stops the timers and performs the final durability flush
    ///
    /// If that flush fails the error is logged and shutdown proceeds; the
    /// resulting data-loss window is the documented limitation of the
    /// durability contract.
    pub async fn shutdown(self: &Arc<Self>, handles: MaintenanceHandles) {
        let _ = handles.shutdown_tx.send(true);
        let _ = handles.flush_task.await;
        let _ = handles.compact_task.await;

        match self.shards.flush_now() {
            Ok(Some(name)) => tracing::info!("Final flush wrote {}", name),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Final flush failed, exiting with unflushed data: {}", e)
            }
        }
    }
}

/// Handles for the background timers
pub struct MaintenanceHandles {
    shutdown_tx: watch::Sender<bool>,
    flush_task: JoinHandle<()>,
    compact_task: JoinHandle<()>,
}
