//! Retention sweep: gzip and archive aged shards
//!
//! Archival is all-or-nothing per shard. The compressed file is written and
//! verified to round-trip (byte length and SHA-256 of the decompressed
//! stream must equal the original) before the original is deleted, so a
//! crash at any point leaves either the untouched original or a verified
//! archive, never neither.

use super::{io_err, parse_shard_hour, PersistenceError, PersistenceResult, ShardStore};
use chrono::{Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;

/// Outcome of one retention sweep
#[derive(Debug, Default)]
pub struct CompactReport {
    /// Shards archived during this sweep
    pub archived: Vec<String>,
}

impl ShardStore {
    /// Archives every shard whose hour window ended before the retention cutoff
    ///
    /// A `.gz` left behind by an interrupted earlier sweep is verified and
    /// adopted instead of being recompressed. Per-shard failures are logged
    /// and skipped; the failing shard is retried on the next daily tick.
    pub fn compact(&self) -> PersistenceResult<CompactReport> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let mut report = CompactReport::default();

        let mut state = self.state.lock().expect("shard store lock poisoned");

        let candidates: Vec<String> = state
            .catalog
            .shards
            .iter()
            .filter(|(_, entry)| !entry.archived)
            .map(|(name, _)| name.clone())
            .collect();

        for name in candidates {
            let window_end = match parse_shard_hour(&name) {
                Some(start) => start + Duration::hours(1),
                None => {
                    tracing::warn!("Skipping shard with unparseable name: {}", name);
                    continue;
                }
            };
            if window_end >= cutoff {
                continue;
            }

            let src = self.train_dir.join(&name);
            let dst = self.archive_dir.join(format!("{}.gz", name));

            match archive_shard(&name, &src, &dst) {
                Ok(()) => {
                    state.catalog.mark_archived(&name);
                    state.catalog.save(&self.catalog_path())?;
                    tracing::info!("Archived shard {}", name);
                    report.archived.push(name);
                }
                Err(e) => {
                    tracing::warn!("Failed to archive shard {}: {}", name, e);
                }
            }
        }

        Ok(report)
    }
}

/// Compresses `src` into `dst`, verifies the round trip, then removes `src`
fn archive_shard(name: &str, src: &Path, dst: &Path) -> PersistenceResult<()> {
    let original = std::fs::read(src).map_err(|e| io_err(src, e))?;

    if dst.exists() {
        // Leftover from an interrupted sweep: adopt it if it checks out
        if verify_archive(dst, &original)? {
            std::fs::remove_file(src).map_err(|e| io_err(src, e))?;
            return Ok(());
        }
        tracing::warn!("Discarding unverifiable stale archive for {}", name);
        std::fs::remove_file(dst).map_err(|e| io_err(dst, e))?;
    }

    let file = std::fs::File::create(dst).map_err(|e| io_err(dst, e))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&original).map_err(|e| io_err(dst, e))?;
    let file = encoder.finish().map_err(|e| io_err(dst, e))?;
    file.sync_all().map_err(|e| io_err(dst, e))?;

    if !verify_archive(dst, &original)? {
        // Keep the original; drop the bad archive
        let _ = std::fs::remove_file(dst);
        return Err(PersistenceError::ArchiveVerify {
            shard: name.to_string(),
        });
    }

    std::fs::remove_file(src).map_err(|e| io_err(src, e))?;
    Ok(())
}

/// Checks that decompressing `archive` reproduces `original` exactly
fn verify_archive(archive: &Path, original: &[u8]) -> PersistenceResult<bool> {
    let compressed = std::fs::read(archive).map_err(|e| io_err(archive, e))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut decompressed = Vec::new();
    if decoder.read_to_end(&mut decompressed).is_err() {
        return Ok(false);
    }

    if decompressed.len() != original.len() {
        return Ok(false);
    }
    Ok(Sha256::digest(&decompressed) == Sha256::digest(original))
}
