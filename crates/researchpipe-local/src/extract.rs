//! Webpage fetch + readable-text extraction.
//!
//! Intentionally "good enough" and deterministic, not a full readability
//! engine: strip script/style/noscript, render with html2text, and pull
//! title/meta-description hints for the summary fields.

use futures_util::StreamExt;
use researchpipe_core::{ContentExtractor, Error, ExtractedContent, Result};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Convert HTML to readable plain text.
pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Minimal, best-effort stripper for <tag ...> ... </tag> blocks. Only
    // removes when it finds a close tag; ASCII-case-insensitive on tag names.
    let tag_lc = tag.to_ascii_lowercase();
    let open_pat = format!("<{}", tag_lc);
    let close_pat = format!("</{}>", tag_lc);

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

fn first_text(doc: &html_scraper::Html, selector: &str) -> Option<String> {
    let sel = html_scraper::Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let t = norm_ws(&el.text().collect::<Vec<_>>().join(" "));
    (!t.is_empty()).then_some(t)
}

fn first_attr(doc: &html_scraper::Html, selector: &str, attr: &str) -> Option<String> {
    let sel = html_scraper::Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let v = el.value().attr(attr)?.trim().to_string();
    (!v.is_empty()).then_some(v)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Extract title/description/content from an HTML body.
pub fn extract_from_html(html: &str, width: usize, max_chars: usize) -> ExtractedContent {
    let doc = html_scraper::Html::parse_document(html);
    let title = first_text(&doc, "title");
    let description = first_attr(&doc, "meta[name=\"description\"]", "content")
        .or_else(|| first_attr(&doc, "meta[property=\"og:description\"]", "content"));

    let stripped = strip_tag_blocks(
        &strip_tag_blocks(&strip_tag_blocks(html, "script"), "style"),
        "noscript",
    );
    let content = truncate_chars(html_to_text(&stripped, width).trim(), max_chars);

    let summary = description
        .clone()
        .or_else(|| Some(norm_ws(&truncate_chars(&content, 300))).filter(|s| !s.is_empty()));

    ExtractedContent {
        title,
        description,
        content,
        summary,
    }
}

/// Fetches pages over HTTP and extracts readable text.
///
/// Bounded on every axis: per-URL timeout, byte cap on the body, char cap on
/// the extracted text, and a small fixed fetch concurrency.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    timeout_ms: u64,
    max_bytes: u64,
    max_chars: usize,
    width: usize,
    concurrency: usize,
}

impl HttpExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout_ms: 15_000,
            max_bytes: 2_000_000,
            max_chars: 40_000,
            width: 100,
            concurrency: 4,
        }
    }

    pub fn with_limits(mut self, timeout_ms: u64, max_bytes: u64, max_chars: usize) -> Self {
        self.timeout_ms = timeout_ms.clamp(1_000, 60_000);
        self.max_bytes = max_bytes.min(10_000_000);
        self.max_chars = max_chars.min(200_000);
        self
    }

    async fn fetch_one(&self, url: &str) -> Result<ExtractedContent> {
        let resp = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status} for {url}")));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        // Bounded body read; a page past the cap is truncated, not failed.
        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            let remaining = (self.max_bytes as usize).saturating_sub(bytes.len());
            if remaining == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();
        let is_texty = content_type.starts_with("text/plain")
            || content_type == "text/markdown"
            || content_type == "application/json";
        if is_texty {
            let content = truncate_chars(body.trim(), self.max_chars);
            let summary = Some(norm_ws(&truncate_chars(&content, 300))).filter(|s| !s.is_empty());
            return Ok(ExtractedContent {
                title: None,
                description: None,
                content,
                summary,
            });
        }

        let extracted = extract_from_html(&body, self.width, self.max_chars);
        if extracted.content.trim().is_empty() {
            return Err(Error::Extract(format!("no text extracted from {url}")));
        }
        Ok(extracted)
    }
}

#[async_trait::async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract_many(&self, urls: &[String]) -> BTreeMap<String, Result<ExtractedContent>> {
        let fetches = futures_util::stream::iter(urls.iter().cloned().map(|url| async move {
            let r = self.fetch_one(&url).await;
            (url, r)
        }))
        .buffered(self.concurrency.max(1));

        fetches.collect::<Vec<_>>().await.into_iter().collect()
    }
}
