//! URL canonicalization for identity comparison.
//!
//! Two URLs that differ only in scheme/host casing, a `www.` prefix, a single
//! trailing slash, or query string / fragment are treated as the same source.
//! Dropping the query is a deliberate recall-over-precision choice: it
//! catches tracking-parameter duplicates at the cost of occasionally
//! conflating parameterized resources. Tests pin this behavior.

/// Canonical identity key for a URL. Never errors: unparseable input falls
/// back to the lowercased raw string.
pub fn normalize_url(raw: &str) -> String {
    let Ok(u) = url::Url::parse(raw) else {
        return raw.to_lowercase();
    };

    let host = u.host_str().unwrap_or("").to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut path = u.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    // url::Url normalizes an empty path to "/" for http(s); keep that stable
    // for inputs like "https://example.com" vs "https://example.com/".
    if path == "/" {
        path.clear();
    }

    format!("{}://{}{}", u.scheme().to_ascii_lowercase(), host, path)
}

/// Registrable-host extraction with the `www.` prefix stripped.
///
/// Used for domain-level classification and diversity metrics. Falls back to
/// a best-effort slice of the raw string when parsing fails.
pub fn domain_of(raw: &str) -> String {
    if let Ok(u) = url::Url::parse(raw) {
        let host = u.host_str().unwrap_or("").to_ascii_lowercase();
        return host.strip_prefix("www.").unwrap_or(&host).to_string();
    }
    // "example.com/path" without a scheme: take everything up to the first '/'.
    let s = raw.trim().to_ascii_lowercase();
    let s = s.strip_prefix("www.").unwrap_or(&s);
    s.split(['/', '?', '#']).next().unwrap_or("").to_string()
}
