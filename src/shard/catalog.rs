//! Shard catalog (`index.json`)
//!
//! The catalog is the durability ledger: a record counts as durable once the
//! catalog entry for its shard reflects it. Entries must exist for every
//! shard file on disk and only those, so startup reconciles the catalog
//! against the directory listing and recounts files whose entries disagree.

use super::{io_err, parse_shard_hour, PersistenceResult, SHARD_PREFIX, SHARD_SUFFIX};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Metadata for one shard file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEntry {
    pub size_bytes: u64,
    pub record_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

/// Mapping from shard name to its metadata
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ShardCatalog {
    pub shards: BTreeMap<String, ShardEntry>,
}

impl ShardCatalog {
    /// Loads the catalog, falling back to empty on a missing or corrupt file
    ///
    /// A corrupt catalog is not fatal because reconcile rebuilds the counts
    /// from the shard files themselves.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(catalog) => catalog,
                Err(e) => {
                    tracing::warn!("Could not decode shard catalog, starting fresh: {}", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persists the catalog atomically (write to a temp file, then rename)
    pub fn save(&self, path: &Path) -> PersistenceResult<()> {
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, data).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    /// Accounts a flush of `records`/`bytes` into the named shard
    pub fn record_flush(&mut self, name: &str, records: u64, bytes: u64, now: DateTime<Utc>) {
        let entry = self.shards.entry(name.to_string()).or_insert(ShardEntry {
            size_bytes: 0,
            record_count: 0,
            created_at: now,
            archived: false,
        });
        entry.record_count += records;
        entry.size_bytes += bytes;
    }

    /// Marks a shard as archived, retaining its metadata
    pub fn mark_archived(&mut self, name: &str) {
        if let Some(entry) = self.shards.get_mut(name) {
            entry.archived = true;
        }
    }

    /// Brings the catalog in line with the directory contents
    ///
    /// * Shard files present on disk get entries with recounted lines/bytes.
    /// * Entries for missing files are dropped, except archived entries
    ///   whose `.gz` still exists in the archive directory.
    ///
    /// Returns true when anything changed.
    pub fn reconcile(&mut self, train_dir: &Path, archive_dir: &Path) -> PersistenceResult<bool> {
        let mut changed = false;
        let mut on_disk = BTreeMap::new();

        let listing = std::fs::read_dir(train_dir).map_err(|e| io_err(train_dir, e))?;
        for entry in listing {
            let entry = entry.map_err(|e| io_err(train_dir, e))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.starts_with(SHARD_PREFIX) || !file_name.ends_with(SHARD_SUFFIX) {
                continue;
            }
            if parse_shard_hour(&file_name).is_none() {
                tracing::warn!("Ignoring unparseable shard file: {}", file_name);
                continue;
            }

            let path = entry.path();
            let content = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let record_count = content.lines().filter(|l| !l.trim().is_empty()).count() as u64;
            let size_bytes = content.len() as u64;
            on_disk.insert(file_name, (size_bytes, record_count));
        }

        // Correct or create entries for files actually present
        for (name, (size_bytes, record_count)) in &on_disk {
            match self.shards.get_mut(name) {
                Some(entry) => {
                    if entry.size_bytes != *size_bytes || entry.record_count != *record_count {
                        tracing::warn!(
                            "Catalog entry for {} disagreed with the file ({} vs {} records), corrected",
                            name,
                            entry.record_count,
                            record_count
                        );
                        entry.size_bytes = *size_bytes;
                        entry.record_count = *record_count;
                        changed = true;
                    }
                    if entry.archived {
                        // The original is back on disk, so it is not archived
                        entry.archived = false;
                        changed = true;
                    }
                }
                None => {
                    self.shards.insert(
                        name.clone(),
                        ShardEntry {
                            size_bytes: *size_bytes,
                            record_count: *record_count,
                            created_at: Utc::now(),
                            archived: false,
                        },
                    );
                    changed = true;
                }
            }
        }

        // Drop entries whose files are gone, unless the archive still has them
        let stale: Vec<String> = self
            .shards
            .iter()
            .filter(|(name, entry)| {
                if on_disk.contains_key(*name) {
                    return false;
                }
                if entry.archived {
                    return !archive_dir.join(format!("{}.gz", name)).exists();
                }
                true
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in stale {
            tracing::warn!("Dropping catalog entry for missing shard {}", name);
            self.shards.remove(&name);
            changed = true;
        }

        Ok(changed)
    }
}
