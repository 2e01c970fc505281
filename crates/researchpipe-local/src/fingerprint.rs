//! Content fingerprinting for near-duplicate detection.
//!
//! Two primitives: a short content-identity hash over normalized text, and a
//! token-set Jaccard similarity. The hash is truncated to 16 hex characters;
//! the widened collision risk is an accepted cost/precision tradeoff.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Lowercase, drop non-word/non-space characters, collapse whitespace runs,
/// trim.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::new();
    let mut last_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        }
        // other punctuation/control is dropped
    }
    out.trim_end().to_string()
}

/// Content-identity hash of the normalized text, truncated to 16 hex chars.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    let mut h = Sha256::new();
    h.update(normalized.as_bytes());
    let digest = hex::encode(h.finalize());
    digest[..16].to_string()
}

fn token_set(text: &str) -> BTreeSet<String> {
    normalize_text(text)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Jaccard similarity over whitespace-token sets of the normalized texts.
///
/// Returns 0.0 when both token sets are empty (no division by zero).
pub fn similarity(a: &str, b: &str) -> f64 {
    let sa = token_set(a);
    let sb = token_set(b);
    if sa.is_empty() && sb.is_empty() {
        return 0.0;
    }
    let inter = sa.intersection(&sb).count() as f64;
    let uni = sa.union(&sb).count() as f64;
    if uni == 0.0 {
        0.0
    } else {
        inter / uni
    }
}
