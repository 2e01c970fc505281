//! Source-type classification and authority scoring.
//!
//! Classification is an ordered, data-driven rule table: the first category
//! whose pattern set matches the domain (or full URL) wins. Order matters
//! because pattern sets overlap: e.g. `github.com` appears in both the
//! documentation and forum rule sets, and documentation is checked first.

use once_cell::sync::Lazy;
use regex::Regex;
use researchpipe_core::SourceType;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Ordered (category, patterns) table. Patterns are matched against the
/// domain first, then the full URL.
static RULES: Lazy<Vec<(SourceType, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            SourceType::Academic,
            vec![
                re(r"\.edu$"),
                re(r"(^|\.)arxiv\.org$"),
                re(r"(^|\.)semanticscholar\.org$"),
                re(r"^scholar\.google\."),
                re(r"(^|\.)ncbi\.nlm\.nih\.gov$"),
                re(r"(^|\.)pubmed\."),
                re(r"(^|\.)nature\.com$"),
                re(r"(^|\.)sciencedirect\.com$"),
                re(r"(^|\.)springer\.com$"),
                re(r"(^|\.)ieee\.org$"),
                re(r"(^|\.)acm\.org$"),
                re(r"(^|\.)jstor\.org$"),
            ],
        ),
        (
            SourceType::OfficialDocumentation,
            vec![
                re(r"^docs\."),
                re(r"\.readthedocs\.io$"),
                re(r"^developer\."),
                re(r"^learn\.microsoft\.com$"),
                re(r"(^|\.)github\.com$"),
                re(r"\.github\.io$"),
                re(r"(^|\.)rust-lang\.org$"),
                re(r"(^|\.)python\.org$"),
                re(r"(^|\.)kubernetes\.io$"),
                re(r"(^|\.)golang\.org$"),
                re(r"(^|\.)mozilla\.org$"),
                re(r"://[^?#]*/(docs|documentation|reference|manual)(/|$)"),
            ],
        ),
        (
            SourceType::News,
            vec![
                re(r"(^|\.)reuters\.com$"),
                re(r"(^|\.)apnews\.com$"),
                re(r"(^|\.)bbc\.(com|co\.uk)$"),
                re(r"(^|\.)cnn\.com$"),
                re(r"(^|\.)nytimes\.com$"),
                re(r"(^|\.)theguardian\.com$"),
                re(r"(^|\.)washingtonpost\.com$"),
                re(r"(^|\.)bloomberg\.com$"),
                re(r"(^|\.)wsj\.com$"),
                re(r"(^|\.)techcrunch\.com$"),
                re(r"(^|\.)arstechnica\.com$"),
                re(r"(^|\.)theverge\.com$"),
                re(r"(^|\.)wired\.com$"),
                re(r"(^|\.)zdnet\.com$"),
            ],
        ),
        (
            SourceType::Forum,
            vec![
                re(r"(^|\.)stackoverflow\.com$"),
                re(r"(^|\.)stackexchange\.com$"),
                re(r"(^|\.)superuser\.com$"),
                re(r"(^|\.)serverfault\.com$"),
                re(r"(^|\.)reddit\.com$"),
                re(r"^news\.ycombinator\.com$"),
                re(r"(^|\.)quora\.com$"),
                re(r"^(forum|forums|community|discuss)\."),
            ],
        ),
        (
            SourceType::SocialMedia,
            vec![
                re(r"(^|\.)twitter\.com$"),
                re(r"(^|\.)x\.com$"),
                re(r"(^|\.)facebook\.com$"),
                re(r"(^|\.)instagram\.com$"),
                re(r"(^|\.)linkedin\.com$"),
                re(r"(^|\.)tiktok\.com$"),
                re(r"(^|\.)youtube\.com$"),
                re(r"^youtu\.be$"),
                re(r"(^|\.)threads\.net$"),
                re(r"(^|\.)mastodon\."),
            ],
        ),
        (
            SourceType::Blog,
            vec![
                re(r"(^|\.)medium\.com$"),
                re(r"\.substack\.com$"),
                re(r"(^|\.)dev\.to$"),
                re(r"\.hashnode\.(com|dev)$"),
                re(r"\.wordpress\.com$"),
                re(r"\.blogspot\.com$"),
                re(r"\.ghost\.io$"),
                re(r"^blog\."),
                re(r"://[^?#]*/blog(/|$)"),
            ],
        ),
    ]
});

/// Generic TLDs that fall back to `Commercial` when nothing else matched.
static GENERIC_TLD: Lazy<Regex> =
    Lazy::new(|| re(r"\.(com|io|co|net|biz|shop|store|app|dev)$"));

/// First matching category wins; unmatched generic-TLD domains are
/// `Commercial`; everything else is `Unknown`.
pub fn classify(url: &str, domain: &str) -> SourceType {
    for (source_type, patterns) in RULES.iter() {
        for pattern in patterns {
            if pattern.is_match(domain) || pattern.is_match(url) {
                return *source_type;
            }
        }
    }
    if GENERIC_TLD.is_match(domain) {
        return SourceType::Commercial;
    }
    SourceType::Unknown
}

fn base_authority(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::Academic => 0.95,
        SourceType::OfficialDocumentation => 0.90,
        SourceType::News => 0.70,
        SourceType::Blog => 0.50,
        SourceType::Forum => 0.45,
        SourceType::SocialMedia => 0.30,
        SourceType::Commercial => 0.40,
        SourceType::Unknown => 0.35,
    }
}

/// Curated high-authority domains (matched exactly or as a parent domain).
static HIGH_AUTHORITY_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "github.com",
    "stackoverflow.com",
    "mozilla.org",
    "python.org",
    "rust-lang.org",
    "kernel.org",
    "w3.org",
    "ietf.org",
    "postgresql.org",
    "arxiv.org",
    "nist.gov",
    "who.int",
];

fn on_allow_list(domain: &str) -> bool {
    HIGH_AUTHORITY_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

/// Per-type base score, plus a bounded allow-list boost (+0.1) and a bounded
/// TLD boost (.gov +0.15 / .edu +0.10 / .org +0.05), clamped to [0, 1].
pub fn authority(domain: &str, source_type: SourceType) -> f64 {
    let mut score = base_authority(source_type);
    if on_allow_list(domain) {
        score += 0.1;
    }
    if domain.ends_with(".gov") {
        score += 0.15;
    } else if domain.ends_with(".edu") {
        score += 0.10;
    } else if domain.ends_with(".org") {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}
