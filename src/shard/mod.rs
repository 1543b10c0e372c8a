//! Durable training-data shards
//!
//! The shard store owns everything under the training directory: hourly
//! JSONL shard files, the `index.json` catalog describing them, and the
//! gzip archive produced by the retention sweep. A result is durable exactly
//! when its shard's catalog entry reflects it; the buffer's durable
//! watermark is only advanced after that point.

mod catalog;
mod compact;

pub use catalog::{ShardCatalog, ShardEntry};
pub use compact::CompactReport;

use crate::buffer::ResultBuffer;
use crate::model::CrawlResult;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Shard file name prefix and suffix
const SHARD_PREFIX: &str = "crawl-train-";
const SHARD_SUFFIX: &str = ".jsonl";

/// Catalog file name inside the training directory
const CATALOG_FILE: &str = "index.json";

/// Errors from shard and catalog I/O
///
/// Flush failures keep their records pending and are retried on the next
/// scheduled tick; they never take the process down.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Archive verification failed for {shard}")]
    ArchiveVerify { shard: String },
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Result type for shard operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Returns the shard file name for the UTC hour containing `ts`
pub fn shard_name_for(ts: DateTime<Utc>) -> String {
    format!("{}{}{}", SHARD_PREFIX, ts.format("%Y%m%d-%H"), SHARD_SUFFIX)
}

/// Parses the UTC hour-window start out of a shard file name
pub fn parse_shard_hour(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_prefix(SHARD_PREFIX)?.strip_suffix(SHARD_SUFFIX)?;
    let (date_part, rest) = stem.split_at(stem.len().checked_sub(3)?);
    let hour: u32 = rest.strip_prefix('-')?.parse().ok()?;
    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

struct StoreState {
    catalog: ShardCatalog,
    /// Records drained from the buffer but not yet durably written.
    /// Survives failed flushes and is written before any newer delta.
    pending: Vec<CrawlResult>,
    pending_through: u64,
}

/// Shard writer, catalog bookkeeping and retention sweep
pub struct ShardStore {
    train_dir: PathBuf,
    archive_dir: PathBuf,
    retention_days: i64,
    buffer: Arc<ResultBuffer>,
    state: Mutex<StoreState>,
}

impl ShardStore {
    /// Opens (or initializes) the training directory
    ///
    /// Loads `index.json` if present and reconciles it against the actual
    /// shard files, so a crash between a shard append and the catalog save
    /// corrects itself on the next start.
    pub fn open(
        train_dir: impl Into<PathBuf>,
        retention_days: i64,
        buffer: Arc<ResultBuffer>,
    ) -> PersistenceResult<Self> {
        let train_dir = train_dir.into();
        let archive_dir = train_dir.join("archive");
        std::fs::create_dir_all(&train_dir).map_err(|e| io_err(&train_dir, e))?;
        std::fs::create_dir_all(&archive_dir).map_err(|e| io_err(&archive_dir, e))?;

        let catalog_path = train_dir.join(CATALOG_FILE);
        let mut catalog = ShardCatalog::load(&catalog_path);
        if catalog.reconcile(&train_dir, &archive_dir)? {
            catalog.save(&catalog_path)?;
            tracing::info!("Shard catalog reconciled against {}", train_dir.display());
        }

        Ok(Self {
            train_dir,
            archive_dir,
            retention_days,
            buffer,
            state: Mutex::new(StoreState {
                catalog,
                pending: Vec::new(),
                pending_through: 0,
            }),
        })
    }

    fn catalog_path(&self) -> PathBuf {
        self.train_dir.join(CATALOG_FILE)
    }

    /// Drains the buffer delta and appends it to the current hour's shard
    ///
    /// Records from a previously failed flush are written first, oldest
    /// first. The same hour always maps to the same file, so repeated calls
    /// within an hour append rather than duplicate. An empty delta is a
    /// no-op: no file is created and the catalog is untouched.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(name))` - Records were written to the named shard
    /// * `Ok(None)` - Nothing to flush
    /// * `Err(PersistenceError)` - Write failed; records stay pending
    pub fn flush_now(&self) -> PersistenceResult<Option<String>> {
        let delta = self.buffer.drain_delta();

        let mut state = self.state.lock().expect("shard store lock poisoned");
        state.pending.extend(delta.records);
        state.pending_through = state.pending_through.max(delta.through_seq);

        if state.pending.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let name = shard_name_for(now);
        let path = self.train_dir.join(&name);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        let mut bytes_written: u64 = 0;
        for record in &state.pending {
            let line = serde_json::to_vec(record)?;
            file.write_all(&line).map_err(|e| io_err(&path, e))?;
            file.write_all(b"\n").map_err(|e| io_err(&path, e))?;
            bytes_written += line.len() as u64 + 1;
        }
        file.sync_all().map_err(|e| io_err(&path, e))?;

        let record_count = state.pending.len() as u64;
        state
            .catalog
            .record_flush(&name, record_count, bytes_written, now);
        state.catalog.save(&self.catalog_path())?;

        // The catalog reflects the records: they are durable now
        self.buffer.confirm_durable(state.pending_through);
        state.pending.clear();

        tracing::info!(
            "Flushed {} records ({} bytes) to {}",
            record_count,
            bytes_written,
            name
        );
        Ok(Some(name))
    }

    /// Loads shard records visible to search
    ///
    /// Reads every non-archived shard whose hour window ends after `cutoff`.
    /// Lines that fail to decode are skipped with a warning rather than
    /// failing the query.
    pub fn load_visible(&self, cutoff: DateTime<Utc>) -> PersistenceResult<Vec<CrawlResult>> {
        let names: Vec<String> = {
            let state = self.state.lock().expect("shard store lock poisoned");
            state
                .catalog
                .shards
                .iter()
                .filter(|(_, entry)| !entry.archived)
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut records = Vec::new();
        for name in names {
            let window_end = match parse_shard_hour(&name) {
                Some(start) => start + Duration::hours(1),
                None => {
                    tracing::warn!("Unparseable shard name in catalog: {}", name);
                    continue;
                }
            };
            if window_end <= cutoff {
                continue;
            }

            let path = self.train_dir.join(&name);
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Failed to read shard {}: {}", name, e);
                    continue;
                }
            };

            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CrawlResult>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!("Skipping bad record in {}: {}", name, e),
                }
            }
        }

        Ok(records)
    }

    /// Snapshot of the catalog entries (for stats and tests)
    pub fn catalog_entries(&self) -> Vec<(String, ShardEntry)> {
        let state = self.state.lock().expect("shard store lock poisoned");
        state
            .catalog
            .shards
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Total record count across all catalog entries
    pub fn total_records(&self) -> u64 {
        let state = self.state.lock().expect("shard store lock poisoned");
        state.catalog.shards.values().map(|e| e.record_count).sum()
    }

    pub fn train_dir(&self) -> &Path {
        &self.train_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}
