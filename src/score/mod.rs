//! Keyword relevance scoring
//!
//! This module decides whether a fetched page is worth keeping for a job. It
//! is deliberately pure: no network, no shared state, just text in and a
//! score out, which keeps it trivially testable in isolation.

/// Occurrence count at which a keyword's term-frequency credit saturates
const TF_SATURATION: f64 = 3.0;

/// Share of a keyword's weight carried by body matches
const BODY_WEIGHT: f64 = 0.7;

/// Share of a keyword's weight carried by a title match
const TITLE_WEIGHT: f64 = 0.3;

/// Scores a page against a job's keyword list
///
/// For each keyword, body occurrences earn a saturating term-frequency credit
/// (full credit at three occurrences) and a title match earns a fixed bonus
/// weighted above body matches. The final score is the mean per-keyword
/// weight, so a page matching every keyword densely and in the title
/// approaches 1.0 and a page matching nothing scores 0.0.
///
/// Keywords are matched as case-insensitive substrings, which allows
/// multi-word phrases like "rust async runtime".
///
/// # Arguments
///
/// * `text` - Normalized page text
/// * `title` - Page title
/// * `keywords` - The job's keyword list
///
/// # Returns
///
/// The score in `[0.0, 1.0]` and the subset of keywords that matched
pub fn score_page(text: &str, title: &str, keywords: &[String]) -> (f64, Vec<String>) {
    if keywords.is_empty() {
        return (0.0, Vec::new());
    }

    let text_lower = text.to_lowercase();
    let title_lower = title.to_lowercase();

    let mut total = 0.0;
    let mut matched = Vec::new();

    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }

        let body_hits = count_occurrences(&text_lower, &needle);
        let title_hit = title_lower.contains(&needle);

        if body_hits > 0 || title_hit {
            matched.push(keyword.clone());
        }

        let tf_credit = (body_hits as f64 / TF_SATURATION).min(1.0);
        let title_credit = if title_hit { 1.0 } else { 0.0 };
        total += BODY_WEIGHT * tf_credit + TITLE_WEIGHT * title_credit;
    }

    (total / keywords.len() as f64, matched)
}

/// Counts non-overlapping occurrences of `needle` in `haystack`
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        start += pos + needle.len();
    }
    count
}

/// Splits text into lowercase alphanumeric tokens
///
/// Shared between the scorer and the search index so that query terms and
/// indexed documents agree on token boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_empty_keywords_score_zero() {
        let (score, matched) = score_page("some text", "title", &[]);
        assert_eq!(score, 0.0);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_no_match_scores_zero() {
        let (score, matched) = score_page("nothing relevant here", "plain title", &kw(&["rust"]));
        assert_eq!(score, 0.0);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_dense_full_match_approaches_one() {
        let text = "rust rust rust tokio tokio tokio";
        let title = "rust tokio deep dive";
        let (score, matched) = score_page(text, title, &kw(&["rust", "tokio"]));
        assert!((score - 1.0).abs() < 1e-9, "score was {}", score);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_body_credit_saturates() {
        let sparse = "rust ".repeat(3);
        let dense = "rust ".repeat(50);
        let (sparse_score, _) = score_page(&sparse, "", &kw(&["rust"]));
        let (dense_score, _) = score_page(&dense, "", &kw(&["rust"]));
        assert_eq!(sparse_score, dense_score);
    }

    #[test]
    fn test_title_match_weighted_above_single_body_hit() {
        let (body_only, _) = score_page("rust appears once", "other", &kw(&["rust"]));
        let (title_only, _) = score_page("no match in body", "all about rust", &kw(&["rust"]));
        assert!(title_only > body_only);
    }

    #[test]
    fn test_partial_keyword_set() {
        let (score, matched) = score_page(
            "rust rust rust discussed at length",
            "rust notes",
            &kw(&["rust", "kubernetes"]),
        );
        assert_eq!(matched, vec!["rust".to_string()]);
        assert!((score - 0.5).abs() < 1e-9, "score was {}", score);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let (score, matched) = score_page("All About RUST", "Rust Guide", &kw(&["rust"]));
        assert!(score > 0.0);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_phrase_keyword() {
        let (_, matched) = score_page(
            "the async runtime model of tokio",
            "",
            &kw(&["async runtime"]),
        );
        assert_eq!(matched, vec!["async runtime".to_string()]);
    }

    #[test]
    fn test_deterministic() {
        let text = "rust tokio rust";
        let keywords = kw(&["rust", "tokio"]);
        let first = score_page(text, "t", &keywords);
        let second = score_page(text, "t", &keywords);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(
            tokenize("Hello, World! foo-bar"),
            vec!["hello", "world", "foo", "bar"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("  ,,, ").is_empty());
    }

    #[test]
    fn test_count_occurrences_non_overlapping() {
        assert_eq!(count_occurrences("aaaa", "aa"), 2);
        assert_eq!(count_occurrences("abcabc", "abc"), 2);
        assert_eq!(count_occurrences("abc", "xyz"), 0);
    }
}
