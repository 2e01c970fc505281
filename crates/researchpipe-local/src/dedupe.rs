//! Multi-stage search-result deduplication.
//!
//! Three passes, each over the survivors of the previous one:
//! 1. exact identity (normalized URL / snippet content hash),
//! 2. discussion-platform thread collapse (data-driven rule table),
//! 3. pairwise similarity pruning against already-accepted results.
//!
//! The pruning threshold (0.75) and the diagnostic grouping threshold (0.70)
//! differ on purpose; both constants are load-bearing for dedup recall and
//! are pinned by tests.

use crate::{fingerprint, urlnorm};
use once_cell::sync::Lazy;
use regex::Regex;
use researchpipe_core::{DeduplicationResult, SearchResult};
use std::collections::BTreeSet;

/// Candidates at or above this similarity against an accepted result are
/// dropped by `comprehensive_deduplication`.
pub const SIMILARITY_PRUNE_THRESHOLD: f64 = 0.75;

/// Results at or above this similarity against a group's first member are
/// clustered together by `group_duplicates`.
pub const SIMILARITY_GROUP_THRESHOLD: f64 = 0.70;

/// Discussion platforms where many URLs point into the same thread.
/// (host suffix, thread-id pattern over the raw link).
static THREAD_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("reddit.com", Regex::new(r"/comments/([A-Za-z0-9]+)").expect("valid regex")),
        ("stackoverflow.com", Regex::new(r"/questions/(\d+)").expect("valid regex")),
        ("stackexchange.com", Regex::new(r"/questions/(\d+)").expect("valid regex")),
        ("twitter.com", Regex::new(r"/status/(\d+)").expect("valid regex")),
        ("x.com", Regex::new(r"/status/(\d+)").expect("valid regex")),
    ]
});

/// `Some("host:id")` when the link points into a known discussion thread.
fn thread_key(link: &str) -> Option<String> {
    let domain = urlnorm::domain_of(link);
    for (host, re) in THREAD_RULES.iter() {
        if domain != *host && !domain.ends_with(&format!(".{host}")) {
            continue;
        }
        if let Some(caps) = re.captures(link) {
            if let Some(id) = caps.get(1) {
                return Some(format!("{host}:{}", id.as_str()));
            }
        }
    }
    None
}

/// Run all three passes and report what was removed.
///
/// `unique_urls` is computed independently of `deduplicated.len()` as a
/// consistency check; by construction the two are equal, and tests assert it.
/// Never errors: a malformed URL degrades to string comparison inside the
/// normalizer.
pub fn comprehensive_deduplication(results: &[SearchResult]) -> DeduplicationResult {
    let original = results.len();

    // Pass 1: exact identity. Order-preserving single pass over two seen-sets.
    let mut seen_urls: BTreeSet<String> = BTreeSet::new();
    let mut seen_hashes: BTreeSet<String> = BTreeSet::new();
    let mut pass1: Vec<SearchResult> = Vec::new();
    for r in results {
        let key = urlnorm::normalize_url(&r.link);
        let hash = fingerprint::content_hash(&r.snippet);
        if seen_urls.contains(&key) || seen_hashes.contains(&hash) {
            continue;
        }
        seen_urls.insert(key);
        seen_hashes.insert(hash);
        pass1.push(r.clone());
    }

    // Pass 2: thread collapse. First occurrence of a thread id wins;
    // non-platform results pass through unchanged.
    let mut seen_threads: BTreeSet<String> = BTreeSet::new();
    let mut pass2: Vec<SearchResult> = Vec::new();
    for r in pass1 {
        match thread_key(&r.link) {
            Some(k) => {
                if seen_threads.insert(k) {
                    pass2.push(r);
                }
            }
            None => pass2.push(r),
        }
    }

    // Pass 3: similarity pruning. O(n^2) worst case; candidate sets are small
    // (bounded search pages), so the quadratic scan stays cheap.
    let mut accepted: Vec<SearchResult> = Vec::new();
    for r in pass2 {
        let key = urlnorm::normalize_url(&r.link);
        let is_dup = accepted.iter().any(|a| {
            urlnorm::normalize_url(&a.link) == key
                || fingerprint::similarity(&a.snippet, &r.snippet) >= SIMILARITY_PRUNE_THRESHOLD
        });
        if !is_dup {
            accepted.push(r);
        }
    }

    let unique_urls = accepted
        .iter()
        .map(|r| urlnorm::normalize_url(&r.link))
        .collect::<BTreeSet<_>>()
        .len();

    DeduplicationResult {
        duplicates_removed: original - accepted.len(),
        unique_urls,
        deduplicated: accepted,
    }
}

/// Cluster results into equivalence classes without discarding anything.
///
/// A result joins the first group whose *first* member matches it (normalized
/// URL equality or similarity >= 0.70). Diagnostics only; the main pipeline
/// uses `comprehensive_deduplication`.
pub fn group_duplicates(results: &[SearchResult]) -> Vec<Vec<SearchResult>> {
    let mut groups: Vec<Vec<SearchResult>> = Vec::new();
    for r in results {
        let key = urlnorm::normalize_url(&r.link);
        let mut placed = false;
        for group in groups.iter_mut() {
            let first = &group[0];
            if urlnorm::normalize_url(&first.link) == key
                || fingerprint::similarity(&first.snippet, &r.snippet)
                    >= SIMILARITY_GROUP_THRESHOLD
            {
                group.push(r.clone());
                placed = true;
                break;
            }
        }
        if !placed {
            groups.push(vec![r.clone()]);
        }
    }
    groups
}
