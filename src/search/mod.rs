//! Query-time ranking over hot and cold results
//!
//! Search sees one corpus: the buffer snapshot merged with every record in
//! the non-archived shards whose hour window intersects the freshness
//! cutoff, deduplicated by content hash (the hot copy wins). Nothing here is
//! persisted; token lists, document frequencies and BM25 statistics are
//! derived per query from whichever documents are currently visible.

use crate::buffer::ResultBuffer;
use crate::model::CrawlResult;
use crate::score::tokenize;
use crate::shard::ShardStore;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// BM25 term-frequency saturation parameter
const BM25_K1: f64 = 1.2;

/// BM25 length-normalization parameter
const BM25_B: f64 = 0.75;

/// Recency factor at the far edge of the freshness window
const RECENCY_FLOOR: f64 = 0.25;

/// One ranked search result
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub score: f64,
    pub ts: DateTime<Utc>,
}

/// Knobs for one search call
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f64,
    pub freshness_days: i64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.35,
            freshness_days: 7,
        }
    }
}

/// BM25-style search over the visible corpus
pub struct SearchIndex {
    buffer: Arc<ResultBuffer>,
    shards: Arc<ShardStore>,
}

impl SearchIndex {
    pub fn new(buffer: Arc<ResultBuffer>, shards: Arc<ShardStore>) -> Self {
        Self { buffer, shards }
    }

    /// Runs a ranked query
    ///
    /// The BM25 score (normalized by the query's best document) is averaged
    /// with the stored relevance score, then multiplied by a recency factor
    /// that decays linearly from 1.0 to the floor across the freshness
    /// window. `min_score` applies to that final post-decay score. An empty
    /// query ranks purely by stored relevance times recency. Ties break by
    /// most recent `created_at`. No match is an empty vector, not an error.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let now = Utc::now();
        let window = Duration::days(opts.freshness_days);
        let cutoff = now - window;

        // Hot results first so the buffered copy wins deduplication
        let mut seen: HashSet<String> = HashSet::new();
        let mut docs: Vec<CrawlResult> = Vec::new();
        for record in self.buffer.snapshot() {
            if seen.insert(record.content_hash.clone()) {
                docs.push(record);
            }
        }
        for record in self.shards.load_visible(cutoff)? {
            if seen.insert(record.content_hash.clone()) {
                docs.push(record);
            }
        }

        // Anything at or past the freshness boundary is excluded outright
        docs.retain(|r| r.created_at > cutoff && r.created_at <= now);
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let query_tokens = tokenize(query);
        let bm25 = bm25_scores(&query_tokens, &docs);
        let max_bm25 = bm25.iter().cloned().fold(0.0_f64, f64::max);

        let mut hits: Vec<SearchHit> = Vec::new();
        for (i, doc) in docs.iter().enumerate() {
            let relevance = if query_tokens.is_empty() {
                doc.score
            } else {
                let normalized = if max_bm25 > 0.0 { bm25[i] / max_bm25 } else { 0.0 };
                (doc.score + normalized) / 2.0
            };

            let final_score = relevance * recency_factor(now - doc.created_at, window);
            if final_score >= opts.min_score {
                hits.push(SearchHit {
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                    excerpt: doc.excerpt.clone(),
                    score: final_score,
                    ts: doc.created_at,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.ts.cmp(&a.ts))
        });
        hits.truncate(opts.limit);

        Ok(hits)
    }
}

/// Linear decay from 1.0 at age zero to the floor at the window edge
fn recency_factor(age: Duration, window: Duration) -> f64 {
    let window_secs = window.num_seconds();
    if window_secs <= 0 {
        return 0.0;
    }
    let fraction = (age.num_seconds() as f64 / window_secs as f64).clamp(0.0, 1.0);
    1.0 - (1.0 - RECENCY_FLOOR) * fraction
}

/// Classic BM25 over tokenized `normalized_text` + `title`
///
/// IDF is computed over exactly the documents passed in, which is the
/// currently visible corpus.
fn bm25_scores(query_tokens: &[String], docs: &[CrawlResult]) -> Vec<f64> {
    if query_tokens.is_empty() || docs.is_empty() {
        return vec![0.0; docs.len()];
    }

    let term_counts: Vec<HashMap<String, usize>> = docs
        .iter()
        .map(|doc| {
            let mut counts = HashMap::new();
            for token in tokenize(&doc.normalized_text)
                .into_iter()
                .chain(tokenize(&doc.title))
            {
                *counts.entry(token).or_insert(0) += 1;
            }
            counts
        })
        .collect();

    let doc_lens: Vec<f64> = term_counts
        .iter()
        .map(|c| c.values().sum::<usize>() as f64)
        .collect();
    let n = docs.len() as f64;
    let avgdl = (doc_lens.iter().sum::<f64>() / n).max(1.0);

    let unique_terms: HashSet<&String> = query_tokens.iter().collect();
    let mut idf: HashMap<&String, f64> = HashMap::new();
    for term in unique_terms {
        let df = term_counts
            .iter()
            .filter(|counts| counts.contains_key(term.as_str()))
            .count() as f64;
        idf.insert(term, ((n - df + 0.5) / (df + 0.5) + 1.0).ln());
    }

    term_counts
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            let mut score = 0.0;
            for term in query_tokens {
                let tf = *counts.get(term.as_str()).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = 1.0 - BM25_B + BM25_B * doc_lens[i] / avgdl;
                score += idf[term] * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm);
            }
            score
        })
        .collect()
}
