//! RAM-first result buffer
//!
//! Every accepted crawl result lands here before anything touches disk. The
//! buffer is the one piece of state shared by all crawl workers, the shard
//! writer and the search index, so everything lives behind a single mutex:
//! `append` and `drain_delta` are linearizable, and a racing append lands in
//! exactly one delta.
//!
//! Durability is two-phase. `drain_delta` hands records to the shard writer
//! without marking them durable; only after the catalog reflects the flush
//! does the writer call `confirm_durable`, which is what makes entries
//! eligible for eviction. An unflushed entry is never evicted.

use crate::model::CrawlResult;
use crate::{HarvestError, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Outcome of an `append`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// The result was stored
    Stored,
    /// A result with the same content hash is already buffered; skipped
    Duplicate,
}

/// Records returned by `drain_delta`, with the watermark to confirm later
#[derive(Debug)]
pub struct DrainedDelta {
    pub records: Vec<CrawlResult>,
    pub through_seq: u64,
}

struct Entry {
    seq: u64,
    size: usize,
    result: CrawlResult,
}

struct Inner {
    entries: VecDeque<Entry>,
    hashes: HashSet<String>,
    bytes: usize,
    next_seq: u64,
    /// Highest sequence handed out by `drain_delta`
    drained_seq: u64,
    /// Highest sequence confirmed durable by the shard writer
    durable_seq: u64,
}

/// Memory-bounded, ordered store of crawl results
pub struct ResultBuffer {
    max_memory_bytes: usize,
    inner: Mutex<Inner>,
}

impl ResultBuffer {
    /// Creates a buffer with the given byte budget
    pub fn new(max_memory_bytes: usize) -> Self {
        Self {
            max_memory_bytes,
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                hashes: HashSet::new(),
                bytes: 0,
                next_seq: 0,
                drained_seq: 0,
                durable_seq: 0,
            }),
        }
    }

    /// Appends a result, evicting durable entries to make room
    ///
    /// Results whose `content_hash` is already buffered are skipped
    /// (identical content fetched by another job). When the budget is
    /// exceeded, the oldest entries already confirmed durable are evicted
    /// first, FIFO; if that cannot reclaim enough space the append is
    /// rejected with `BufferFull` and the caller must back off until the
    /// next flush.
    pub fn append(&self, result: CrawlResult) -> Result<Appended> {
        let size = serde_json::to_vec(&result)
            .map_err(|e| HarvestError::Internal(format!("result serialization: {}", e)))?
            .len()
            + 1; // newline in the shard file

        let mut inner = self.inner.lock().expect("buffer lock poisoned");

        if inner.hashes.contains(&result.content_hash) {
            tracing::debug!("Skipping duplicate content hash {}", result.content_hash);
            return Ok(Appended::Duplicate);
        }

        // Evict oldest durable entries until the new record fits
        while inner.bytes + size > self.max_memory_bytes {
            let front_is_durable = inner
                .entries
                .front()
                .map(|front| front.seq <= inner.durable_seq)
                .unwrap_or(false);
            if !front_is_durable {
                break;
            }
            let evicted = inner.entries.pop_front().expect("front checked above");
            inner.bytes -= evicted.size;
            inner.hashes.remove(&evicted.result.content_hash);
            tracing::trace!(
                "Evicted flushed result {} ({} bytes)",
                evicted.result.url,
                evicted.size
            );
        }

        if inner.bytes + size > self.max_memory_bytes {
            return Err(HarvestError::BufferFull {
                needed: size,
                in_use: inner.bytes,
                capacity: self.max_memory_bytes,
            });
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.hashes.insert(result.content_hash.clone());
        inner.bytes += size;
        inner.entries.push_back(Entry { seq, size, result });

        Ok(Appended::Stored)
    }

    /// Current buffered size in bytes
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().expect("buffer lock poisoned").bytes
    }

    /// Number of buffered results
    pub fn len(&self) -> usize {
        self.inner.lock().expect("buffer lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns everything appended since the previous drain
    ///
    /// The returned records stay in the buffer (they remain visible to
    /// search); only the drained watermark advances. Call `confirm_durable`
    /// with the returned watermark once the records are safely on disk.
    pub fn drain_delta(&self) -> DrainedDelta {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        let drained_seq = inner.drained_seq;

        let records: Vec<CrawlResult> = inner
            .entries
            .iter()
            .filter(|e| e.seq > drained_seq)
            .map(|e| e.result.clone())
            .collect();

        let through_seq = inner.entries.back().map(|e| e.seq).unwrap_or(drained_seq);
        inner.drained_seq = through_seq;

        DrainedDelta {
            records,
            through_seq,
        }
    }

    /// Marks everything up to `through_seq` as durably flushed
    pub fn confirm_durable(&self, through_seq: u64) {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        inner.durable_seq = inner.durable_seq.max(through_seq);
    }

    /// Read-only view of all buffered results, oldest first
    pub fn snapshot(&self) -> Vec<CrawlResult> {
        let inner = self.inner.lock().expect("buffer lock poisoned");
        inner.entries.iter().map(|e| e.result.clone()).collect()
    }

    /// Appends labels to the buffered result with the given content hash
    ///
    /// Labels are append-only; values already present are ignored. Returns
    /// false when no buffered result matches (it may have been evicted).
    pub fn add_labels(&self, content_hash: &str, labels: &[String]) -> bool {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        for entry in inner.entries.iter_mut() {
            if entry.result.content_hash == content_hash {
                for label in labels {
                    if !entry.result.labels.contains(label) {
                        entry.result.labels.push(label.clone());
                    }
                }
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn result_with(text: &str) -> CrawlResult {
        let url = Url::parse("https://example.com/a").unwrap();
        CrawlResult::from_page("job-1", &url, "title", text, vec![], 0.5, None)
    }

    fn sized_result(tag: usize) -> CrawlResult {
        // Distinct bodies so content hashes differ
        result_with(&format!("body number {} {}", tag, "pad ".repeat(20)))
    }

    #[test]
    fn test_append_and_snapshot() {
        let buffer = ResultBuffer::new(1 << 20);
        buffer.append(result_with("one")).unwrap();
        buffer.append(result_with("two")).unwrap();

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(buffer.size_bytes() > 0);
    }

    #[test]
    fn test_duplicate_content_hash_skipped() {
        let buffer = ResultBuffer::new(1 << 20);
        assert_eq!(
            buffer.append(result_with("same body")).unwrap(),
            Appended::Stored
        );
        assert_eq!(
            buffer.append(result_with("same body")).unwrap(),
            Appended::Duplicate
        );
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_drain_delta_returns_only_new_records() {
        let buffer = ResultBuffer::new(1 << 20);
        buffer.append(sized_result(1)).unwrap();
        buffer.append(sized_result(2)).unwrap();

        let first = buffer.drain_delta();
        assert_eq!(first.records.len(), 2);

        buffer.append(sized_result(3)).unwrap();
        let second = buffer.drain_delta();
        assert_eq!(second.records.len(), 1);
        assert!(second.through_seq > first.through_seq);

        // Nothing new: empty delta, watermark unchanged
        let third = buffer.drain_delta();
        assert!(third.records.is_empty());
        assert_eq!(third.through_seq, second.through_seq);
    }

    #[test]
    fn test_drain_does_not_clear_snapshot() {
        let buffer = ResultBuffer::new(1 << 20);
        buffer.append(sized_result(1)).unwrap();
        buffer.drain_delta();
        assert_eq!(buffer.snapshot().len(), 1);
    }

    #[test]
    fn test_unflushed_entries_never_evicted() {
        let one = sized_result(1);
        let one_size = serde_json::to_vec(&one).unwrap().len() + 1;
        // Room for roughly two records, nothing more
        let buffer = ResultBuffer::new(one_size * 2 + 10);

        buffer.append(one).unwrap();
        buffer.append(sized_result(2)).unwrap();

        // No flush has happened: the third append must be rejected
        let err = buffer.append(sized_result(3)).unwrap_err();
        assert!(matches!(err, HarvestError::BufferFull { .. }));
        assert_eq!(err.error_code(), "buffer_full");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_eviction_after_confirm_durable() {
        let one = sized_result(1);
        let one_size = serde_json::to_vec(&one).unwrap().len() + 1;
        let buffer = ResultBuffer::new(one_size * 2 + 10);

        buffer.append(one).unwrap();
        buffer.append(sized_result(2)).unwrap();

        let delta = buffer.drain_delta();
        buffer.confirm_durable(delta.through_seq);

        // Flushed entries can now make room, FIFO from the front
        buffer.append(sized_result(3)).unwrap();
        assert!(buffer.size_bytes() <= one_size * 2 + 10);
        let urls: Vec<String> = buffer.snapshot().iter().map(|r| r.url.clone()).collect();
        assert!(!urls.is_empty());
    }

    #[test]
    fn test_append_after_drain_lands_in_next_delta() {
        let buffer = ResultBuffer::new(1 << 20);
        buffer.append(sized_result(1)).unwrap();
        let first = buffer.drain_delta();
        assert_eq!(first.records.len(), 1);

        buffer.append(sized_result(2)).unwrap();
        let second = buffer.drain_delta();
        assert_eq!(second.records.len(), 1);
        assert!(second.records[0].normalized_text.contains("number 2"));
    }

    #[test]
    fn test_add_labels_append_only() {
        let buffer = ResultBuffer::new(1 << 20);
        let result = result_with("labeled body");
        let hash = result.content_hash.clone();
        buffer.append(result).unwrap();

        assert!(buffer.add_labels(&hash, &["good".to_string()]));
        assert!(buffer.add_labels(&hash, &["good".to_string(), "tech".to_string()]));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot[0].labels, vec!["good".to_string(), "tech".to_string()]);
    }

    #[test]
    fn test_add_labels_unknown_hash() {
        let buffer = ResultBuffer::new(1 << 20);
        assert!(!buffer.add_labels("deadbeef", &["x".to_string()]));
    }

    #[test]
    fn test_concurrent_appends_keep_accounting_consistent() {
        use std::sync::Arc;
        let buffer = Arc::new(ResultBuffer::new(16 << 20));
        let mut handles = Vec::new();
        for t in 0..4 {
            let buffer = Arc::clone(&buffer);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    buffer.append(sized_result(t * 1000 + i)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.len(), 200);
        let delta = buffer.drain_delta();
        assert_eq!(delta.records.len(), 200);
    }
}
