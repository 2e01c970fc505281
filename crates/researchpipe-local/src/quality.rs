//! Source quality assessment and ranking.
//!
//! Credibility is the fixed combination `0.6 * authority + 0.4 * recency`,
//! rounded to 2 decimals (the same precision as the aggregate metrics).
//! Author and publication-date extraction are best-effort scrapes over the
//! head of the content; misses are `None`, never errors.

use crate::{classify, recency, urlnorm};
use once_cell::sync::Lazy;
use regex::Regex;
use researchpipe_core::{QualityMetrics, SearchResult, SourceQuality};
use std::collections::{BTreeMap, BTreeSet};

const CREDIBILITY_AUTHORITY_WEIGHT: f64 = 0.6;
const CREDIBILITY_RECENCY_WEIGHT: f64 = 0.4;

/// How much of the content head the author/date scrapers look at.
const METADATA_SCAN_CHARS: usize = 2_000;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn head_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

/// Byline patterns, most specific first. The prefix is case-insensitive but
/// the captured name must look like a capitalized multi-word name.
static AUTHOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let name = r"([A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\.\-]+)+)";
    vec![
        Regex::new(&format!(r"(?i:written\s+by)\s+{name}")).expect("valid regex"),
        Regex::new(&format!(r"(?i:author)\s*:\s*{name}")).expect("valid regex"),
        Regex::new(&format!(r"\b(?i:by)\s+{name}")).expect("valid regex"),
    ]
});

fn extract_author(content: &str) -> Option<String> {
    let head = head_chars(content, METADATA_SCAN_CHARS);
    for pattern in AUTHOR_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(head) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().trim().to_string());
            }
        }
    }
    None
}

struct DatePattern {
    re: Regex,
    kind: DateKind,
}

enum DateKind {
    /// 2024-01-05
    Iso,
    /// January 5, 2024 (full or abbreviated month name)
    MonthFirst,
    /// 01/05/2024 (month/day/year)
    Slash,
}

static DATE_PATTERNS: Lazy<Vec<DatePattern>> = Lazy::new(|| {
    vec![
        DatePattern {
            re: Regex::new(r"\b(20\d{2})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"),
            kind: DateKind::Iso,
        },
        DatePattern {
            re: Regex::new(
                r"\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(20\d{2})\b",
            )
            .expect("valid regex"),
            kind: DateKind::MonthFirst,
        },
        DatePattern {
            re: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(20\d{2})\b").expect("valid regex"),
            kind: DateKind::Slash,
        },
    ]
});

fn month_number(name: &str) -> Option<u32> {
    let m = match name.to_ascii_lowercase().get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn iso_date(y: i32, m: u32, d: u32) -> Option<String> {
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|date| date.format("%Y-%m-%d").to_string())
}

/// First parseable date mention in the content head, normalized to ISO.
/// Matches that fail calendar validation (e.g. 2024-13-40) are skipped.
fn extract_publication_date(content: &str) -> Option<String> {
    let head = head_chars(content, METADATA_SCAN_CHARS);
    for pattern in DATE_PATTERNS.iter() {
        for caps in pattern.re.captures_iter(head) {
            let parsed = match pattern.kind {
                DateKind::Iso => {
                    let y = caps.get(1)?.as_str().parse().ok()?;
                    let m = caps.get(2)?.as_str().parse().ok()?;
                    let d = caps.get(3)?.as_str().parse().ok()?;
                    iso_date(y, m, d)
                }
                DateKind::MonthFirst => {
                    let m = month_number(caps.get(1)?.as_str())?;
                    let d = caps.get(2)?.as_str().parse().ok()?;
                    let y = caps.get(3)?.as_str().parse().ok()?;
                    iso_date(y, m, d)
                }
                DateKind::Slash => {
                    let m = caps.get(1)?.as_str().parse().ok()?;
                    let d = caps.get(2)?.as_str().parse().ok()?;
                    let y = caps.get(3)?.as_str().parse().ok()?;
                    iso_date(y, m, d)
                }
            };
            if parsed.is_some() {
                return parsed;
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    current_year: i32,
}

impl QualityScorer {
    pub fn new() -> Self {
        Self {
            current_year: recency::current_year(None),
        }
    }

    /// Deterministic construction for reproducible runs and tests.
    pub fn with_now_epoch_s(now_epoch_s: Option<u64>) -> Self {
        Self {
            current_year: recency::current_year(now_epoch_s),
        }
    }

    /// Assess one source. Content is optional: without it, recency is the
    /// neutral 0.5 and author/date stay unset.
    pub fn assess(&self, url: &str, content: Option<&str>) -> SourceQuality {
        let domain = urlnorm::domain_of(url);
        let source_type = classify::classify(url, &domain);
        let authority_score = classify::authority(&domain, source_type).clamp(0.0, 1.0);
        let recency_score = recency::recency_score(content, self.current_year).clamp(0.0, 1.0);
        let credibility_score = round2(
            CREDIBILITY_AUTHORITY_WEIGHT * authority_score
                + CREDIBILITY_RECENCY_WEIGHT * recency_score,
        );

        SourceQuality {
            url: url.to_string(),
            domain,
            source_type,
            authority_score,
            recency_score,
            credibility_score,
            author: content.and_then(extract_author),
            publication_date: content.and_then(extract_publication_date),
        }
    }

    /// Assess every source, attach its scores, and stable-sort descending by
    /// credibility. Ties keep their input order (reproducibility).
    pub fn rank(
        &self,
        sources: Vec<SearchResult>,
        content_by_url: Option<&BTreeMap<String, String>>,
    ) -> Vec<SearchResult> {
        let mut ranked: Vec<SearchResult> = sources
            .into_iter()
            .map(|mut r| {
                let content = content_by_url
                    .and_then(|m| m.get(&r.link))
                    .map(|s| s.as_str());
                let q = self.assess(&r.link, content);
                r.quality_score = Some(q.credibility_score);
                r.authority = Some(q.authority_score);
                r.source_type = Some(q.source_type);
                r
            })
            .collect();

        // Vec::sort_by is stable, which is what keeps ties in input order.
        ranked.sort_by(|a, b| {
            let qa = a.quality_score.unwrap_or(0.0);
            let qb = b.quality_score.unwrap_or(0.0);
            qb.total_cmp(&qa)
        });
        ranked
    }

    /// Aggregate per-source assessments into report-level metrics.
    /// Empty input yields all-zero fields (no division by zero).
    pub fn aggregate_metrics(qualities: &[SourceQuality]) -> QualityMetrics {
        if qualities.is_empty() {
            return QualityMetrics::default();
        }
        let total = qualities.len();
        let unique_domains = qualities
            .iter()
            .map(|q| q.domain.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let authority_sum: f64 = qualities.iter().map(|q| q.authority_score).sum();
        let recency_sum: f64 = qualities.iter().map(|q| q.recency_score).sum();

        QualityMetrics {
            source_diversity: round2(unique_domains as f64 / total as f64),
            average_authority: round2(authority_sum / total as f64),
            content_freshness: round2(recency_sum / total as f64),
            total_sources: total,
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchpipe_core::SourceType;

    fn scorer() -> QualityScorer {
        // 2026-01-01T00:00:00Z
        QualityScorer::with_now_epoch_s(Some(1_767_225_600))
    }

    #[test]
    fn assess_python_docs_without_content() {
        let q = scorer().assess("https://docs.python.org/3/", None);
        assert_eq!(q.domain, "docs.python.org");
        assert_eq!(q.source_type, SourceType::OfficialDocumentation);
        assert!(q.authority_score >= 0.9);
        assert_eq!(q.recency_score, 0.5);
        assert_eq!(
            q.credibility_score,
            round2(0.6 * q.authority_score + 0.4 * 0.5)
        );
        assert!(q.author.is_none());
        assert!(q.publication_date.is_none());
    }

    #[test]
    fn credibility_is_the_fixed_combination_and_bounded() {
        let urls = [
            "https://arxiv.org/abs/2401.00001",
            "https://blog.example.dev/post",
            "https://unknown.xyz/page",
            "not a url",
        ];
        let s = scorer();
        for url in urls {
            let q = s.assess(url, Some("updated in 2026 by the maintainers"));
            assert!((0.0..=1.0).contains(&q.credibility_score));
            assert_eq!(
                q.credibility_score,
                round2(0.6 * q.authority_score + 0.4 * q.recency_score)
            );
        }
    }

    #[test]
    fn extracts_author_from_common_bylines() {
        assert_eq!(
            extract_author("Posted by Jane Smith on the engineering blog"),
            Some("Jane Smith".to_string())
        );
        assert_eq!(
            extract_author("AUTHOR: Robert C. Martin\nrest of page"),
            Some("Robert C. Martin".to_string())
        );
        assert_eq!(
            extract_author("Written by Ada Lovelace-Byron in the winter"),
            Some("Ada Lovelace-Byron".to_string())
        );
    }

    #[test]
    fn author_requires_capitalized_multi_word_name() {
        assert!(extract_author("stand by me").is_none());
        assert!(extract_author("by john smith").is_none());
        assert!(extract_author("by Madonna").is_none());
    }

    #[test]
    fn extracts_first_parseable_date_as_iso() {
        assert_eq!(
            extract_publication_date("Published 2024-01-05 by staff"),
            Some("2024-01-05".to_string())
        );
        assert_eq!(
            extract_publication_date("Published January 5, 2024"),
            Some("2024-01-05".to_string())
        );
        assert_eq!(
            extract_publication_date("Updated Sep 3 2025, see notes"),
            Some("2025-09-03".to_string())
        );
        assert_eq!(
            extract_publication_date("posted 1/5/2024"),
            Some("2024-01-05".to_string())
        );
    }

    #[test]
    fn unparseable_date_matches_are_skipped_not_errors() {
        // 2024-13-40 matches the ISO shape but fails calendar validation;
        // the scan continues to the next candidate.
        assert_eq!(
            extract_publication_date("ids 2024-13-40 and 2024-02-29 appear"),
            Some("2024-02-29".to_string())
        );
        assert_eq!(extract_publication_date("no dates here"), None);
    }

    #[test]
    fn rank_is_stable_on_credibility_ties() {
        // Two same-scoring unknown-domain sources around a high scorer: the
        // high scorer moves first, the tie keeps input order.
        let sources = vec![
            SearchResult::new("first tie", "https://aaa.xyz/one", "s1"),
            SearchResult::new("second tie", "https://bbb.xyz/two", "s2"),
            SearchResult::new("docs", "https://docs.python.org/3/", "s3"),
        ];
        let ranked = scorer().rank(sources, None);
        assert_eq!(ranked[0].link, "https://docs.python.org/3/");
        assert_eq!(ranked[1].link, "https://aaa.xyz/one");
        assert_eq!(ranked[2].link, "https://bbb.xyz/two");
        assert_eq!(ranked[1].quality_score, ranked[2].quality_score);
        assert!(ranked[0].quality_score > ranked[1].quality_score);
    }

    #[test]
    fn rank_attaches_scores_and_uses_content_when_available() {
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://aaa.xyz/one".to_string(),
            "benchmarks updated 2026".to_string(),
        );
        let sources = vec![
            SearchResult::new("no content", "https://bbb.xyz/two", "s"),
            SearchResult::new("fresh content", "https://aaa.xyz/one", "s"),
        ];
        let ranked = scorer().rank(sources, Some(&contents));
        // Fresh content lifts recency from 0.5 to 1.0 and wins the ranking.
        assert_eq!(ranked[0].link, "https://aaa.xyz/one");
        assert_eq!(ranked[0].source_type, Some(SourceType::Unknown));
        assert!(ranked[0].quality_score.unwrap() > ranked[1].quality_score.unwrap());
        assert!(ranked.iter().all(|r| r.authority.is_some()));
    }

    #[test]
    fn aggregate_metrics_on_empty_input_is_all_zero() {
        let m = QualityScorer::aggregate_metrics(&[]);
        assert_eq!(m.source_diversity, 0.0);
        assert_eq!(m.average_authority, 0.0);
        assert_eq!(m.content_freshness, 0.0);
        assert_eq!(m.total_sources, 0);
    }

    #[test]
    fn aggregate_metrics_counts_unique_domains() {
        let s = scorer();
        let qualities = vec![
            s.assess("https://docs.python.org/3/", None),
            s.assess("https://docs.python.org/3/library/", None),
            s.assess("https://stackoverflow.com/questions/1", None),
        ];
        let m = QualityScorer::aggregate_metrics(&qualities);
        assert_eq!(m.total_sources, 3);
        assert_eq!(m.source_diversity, round2(2.0 / 3.0));
        assert!(m.average_authority > 0.0);
        assert_eq!(m.content_freshness, 0.5);
    }
}
