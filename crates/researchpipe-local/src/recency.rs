//! Content-freshness estimation.
//!
//! The signal is "the most recent four-digit 20xx year mentioned anywhere in
//! the text". That proxy misreads some content (a historical article saying
//! "in 2024 the war began" scores as fresh); this is documented, intentional
//! behavior; no correction criterion exists, so none is applied.

use chrono::{Datelike, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b20\d{2}\b").expect("valid regex"));

/// Resolve the scoring year, honoring a `now_epoch_s` override for
/// deterministic outputs.
pub fn current_year(now_epoch_s: Option<u64>) -> i32 {
    match now_epoch_s {
        Some(s) => Utc
            .timestamp_opt(s as i64, 0)
            .single()
            .map(|t| t.year())
            .unwrap_or_else(|| Utc::now().year()),
        None => Utc::now().year(),
    }
}

/// Recency score in [0, 1].
///
/// No content, or content without a 20xx year mention, scores a neutral 0.5
/// (unknown is deliberately not penalized). Otherwise the max year found maps
/// through a fixed step function of its age.
pub fn recency_score(content: Option<&str>, current_year: i32) -> f64 {
    let Some(content) = content else {
        return 0.5;
    };
    let mut max_year: Option<i32> = None;
    for m in YEAR_RE.find_iter(content) {
        if let Ok(y) = m.as_str().parse::<i32>() {
            max_year = Some(max_year.map_or(y, |prev| prev.max(y)));
        }
    }
    let Some(year) = max_year else {
        return 0.5;
    };
    let age = current_year - year;
    if age <= 0 {
        1.0
    } else if age == 1 {
        0.9
    } else if age <= 2 {
        0.7
    } else if age <= 3 {
        0.5
    } else if age <= 5 {
        0.3
    } else {
        0.1
    }
}
