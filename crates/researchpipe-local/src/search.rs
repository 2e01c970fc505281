//! Search-provider adapters.
//!
//! Each adapter maps one provider's wire format onto `SearchResult` and reads
//! its key/endpoint from env. Failures come back as `Error::Search` /
//! `Error::NotConfigured`; the orchestrator decides how much of a request
//! survives a failed provider call.

use researchpipe_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    // Keep a conservative cap even if callers pass something huge.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn brave_api_key_from_env() -> Option<String> {
    env("RESEARCHPIPE_BRAVE_API_KEY").or_else(|| env("BRAVE_SEARCH_API_KEY"))
}

fn tavily_api_key_from_env() -> Option<String> {
    env("RESEARCHPIPE_TAVILY_API_KEY").or_else(|| env("TAVILY_API_KEY"))
}

fn brave_endpoint_from_env() -> Option<String> {
    env("RESEARCHPIPE_BRAVE_ENDPOINT")
}

fn tavily_endpoint_from_env() -> Option<String> {
    env("RESEARCHPIPE_TAVILY_ENDPOINT")
}

pub fn searxng_endpoint_from_env() -> Option<String> {
    env("RESEARCHPIPE_SEARXNG_ENDPOINT")
}

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl BraveSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = brave_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing RESEARCHPIPE_BRAVE_API_KEY (or BRAVE_SEARCH_API_KEY)".to_string(),
            )
        })?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        // Docs: https://api.search.brave.com/res/v1/web/search
        brave_endpoint_from_env()
            .unwrap_or_else(|| "https://api.search.brave.com/res/v1/web/search".to_string())
    }
}

impl TavilySearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = tavily_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing RESEARCHPIPE_TAVILY_API_KEY (or TAVILY_API_KEY)".to_string(),
            )
        })?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        tavily_endpoint_from_env().unwrap_or_else(|| "https://api.tavily.com/search".to_string())
    }
}

impl SearxngSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let endpoint = searxng_endpoint_from_env().ok_or_else(|| {
            Error::NotConfigured("missing RESEARCHPIPE_SEARXNG_ENDPOINT".to_string())
        })?;
        Ok(Self { client, endpoint })
    }

    fn endpoint_search(&self) -> String {
        // Accept either a base URL or a full /search endpoint.
        let mut base = self.endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(Self::endpoint())
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str())]);

        if let Some(n) = q.max_results {
            // Brave uses `count` for result count.
            req = req.query(&[("count", n.to_string())]);
        }
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("search_lang", lang)]);
        }
        if let Some(country) = q.country.as_deref() {
            req = req.query(&[("country", country)]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("brave search HTTP {status}")));
        }

        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let mut out = Vec::new();
        if let Some(results) = parsed.web.and_then(|w| w.results) {
            for r in results {
                out.push(SearchResult::new(
                    r.title.unwrap_or_default(),
                    r.url,
                    r.description.unwrap_or_default(),
                ));
            }
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results: out,
            provider: "brave".to_string(),
            timings_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for TavilySearchProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(5).min(20);
        let timeout_ms = timeout_ms_from_query(q);

        let body = serde_json::json!({
            "query": q.query,
            "max_results": max_results,
            "include_answer": false,
            "include_raw_content": false,
            "search_depth": "basic",
            "country": q.country,
        });

        let resp = self
            .client
            .post(Self::endpoint())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("tavily search HTTP {status}")));
        }

        let parsed: TavilySearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        for r in parsed.results {
            out.push(SearchResult::new(
                r.title.unwrap_or_default(),
                r.url,
                r.content.unwrap_or_default(),
            ));
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results: out,
            provider: "tavily".to_string(),
            timings_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10).min(20);
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(self.endpoint_search())
            .query(&[("q", q.query.as_str()), ("format", "json")]);
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("language", lang)]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        if let Some(rs) = parsed.results {
            for r in rs.into_iter().take(max_results) {
                let Some(url) = r.url else { continue };
                out.push(SearchResult::new(
                    r.title.unwrap_or_default(),
                    url,
                    r.content.unwrap_or_default(),
                ));
            }
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results: out,
            provider: "searxng".to_string(),
            timings_ms,
        })
    }
}

/// Fallback chain over whatever providers are configured, tried in a fixed
/// order (brave, tavily, searxng). The first non-empty response wins.
pub struct AutoSearchProvider {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl AutoSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Ok(p) = BraveSearchProvider::from_env(client.clone()) {
            providers.push(Arc::new(p));
        }
        if let Ok(p) = TavilySearchProvider::from_env(client.clone()) {
            providers.push(Arc::new(p));
        }
        if let Ok(p) = SearxngSearchProvider::from_env(client) {
            providers.push(Arc::new(p));
        }
        if providers.is_empty() {
            return Err(Error::NotConfigured(
                "no search provider configured (set a Brave/Tavily key or a SearXNG endpoint)"
                    .to_string(),
            ));
        }
        Ok(Self { providers })
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait::async_trait]
impl SearchProvider for AutoSearchProvider {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let mut last_err = Error::NotConfigured("no search provider configured".to_string());
        for provider in &self.providers {
            match provider.search(q).await {
                Ok(resp) if !resp.results.is_empty() => return Ok(resp),
                Ok(_) => {
                    tracing::debug!(provider = provider.name(), "empty response, trying next");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

/// Build the provider named by config ("auto", "brave", "tavily", "searxng").
pub fn provider_from_env(
    client: reqwest::Client,
    name: &str,
) -> Result<Arc<dyn SearchProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "auto" => Ok(Arc::new(AutoSearchProvider::from_env(client)?)),
        "brave" => Ok(Arc::new(BraveSearchProvider::from_env(client)?)),
        "tavily" => Ok(Arc::new(TavilySearchProvider::from_env(client)?)),
        "searxng" => Ok(Arc::new(SearxngSearchProvider::from_env(client)?)),
        other => Err(Error::NotConfigured(format!(
            "unknown search provider: {other}"
        ))),
    }
}
