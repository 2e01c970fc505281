//! Research orchestration: search fan-out -> dedup -> rank -> extract ->
//! synthesize -> assemble.
//!
//! Collaborators are constructor-injected trait objects; there is no global
//! provider registry. Stage failures are converted into a structured
//! `ResearchFailure` at this boundary; a single request's failure never
//! takes down the host. Degraded output (fewer sources, basic synthesis)
//! beats total failure whenever at least one source survived.

use crate::quality::QualityScorer;
use crate::{dedupe, synthesize};
use chrono::{SecondsFormat, TimeZone, Utc};
use futures_util::future::join_all;
use researchpipe_core::{
    ContentExtractor, ExtractedContent, ReportMetadata, ReportSource, ResearchFailure,
    ResearchFailureKind, ResearchReport, ResearchRequest, SearchProvider, SearchQuery,
    SearchResult, SourceQuality, Synthesis, SynthesisOutcome, SynthesisRequest, SynthesisSource,
    Synthesizer,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Content extraction is capped to this many top-ranked URLs per request.
const MAX_EXTRACT_URLS: usize = 5;

/// Extra results requested per query so the candidate pool survives dedup.
const SEARCH_OVERSHOOT: usize = 2;

pub struct ResearchOrchestrator {
    provider: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    synthesizer: Arc<dyn Synthesizer>,
}

/// A completed run: the report plus non-fatal warning codes.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub report: ResearchReport,
    pub warnings: Vec<&'static str>,
}

/// One query per (topic, focus-area) pair, topic first. Blank focus areas
/// are skipped; the order is the caller's declaration order, which also fixes
/// the merge order for deterministic dedup tie-breaks.
fn build_queries(topic: &str, focus_areas: &[String]) -> Vec<String> {
    let mut queries = vec![topic.to_string()];
    for area in focus_areas {
        let area = area.trim();
        if !area.is_empty() {
            queries.push(format!("{topic} {area}"));
        }
    }
    queries
}

fn per_query_count(target: usize, query_count: usize) -> usize {
    let query_count = query_count.max(1);
    target.div_ceil(query_count) + SEARCH_OVERSHOOT
}

/// Query rewrites offered alongside failures: halves of a long query and a
/// "+ overview" broadening variant.
fn alternative_queries(topic: &str) -> Vec<String> {
    let words: Vec<&str> = topic.split_whitespace().collect();
    let mut out = Vec::new();
    if words.len() >= 4 {
        let mid = words.len() / 2;
        out.push(words[..mid].join(" "));
        out.push(words[mid..].join(" "));
    }
    if !words.is_empty() {
        out.push(format!("{} overview", words.join(" ")));
    }
    out
}

fn no_results_failure(topic: &str, focus_area_count: usize, detail: Option<String>) -> ResearchFailure {
    let message = match detail {
        Some(d) => format!("no search results for \"{topic}\" ({d})"),
        None => format!("no search results for \"{topic}\""),
    };
    let mut suggestions = vec![
        "Try broader or more general search terms.".to_string(),
        "Check the search provider configuration (API keys, endpoints).".to_string(),
    ];
    if focus_area_count > 0 {
        suggestions.insert(1, "Reduce the number of focus areas.".to_string());
    }
    ResearchFailure {
        kind: ResearchFailureKind::NoResults,
        message,
        suggestions,
        alternative_queries: alternative_queries(topic),
    }
}

fn extraction_failed_failure(topic: &str, attempted: usize) -> ResearchFailure {
    ResearchFailure {
        kind: ResearchFailureKind::ExtractionFailed,
        message: format!(
            "content extraction failed for all {attempted} top-ranked sources for \"{topic}\""
        ),
        suggestions: vec![
            "Increase the source count so more candidates are available.".to_string(),
            "The top-ranked pages may block automated fetches; retry later or adjust the topic."
                .to_string(),
        ],
        alternative_queries: alternative_queries(topic),
    }
}

fn retrieved_at(now_epoch_s: Option<u64>) -> String {
    let t = match now_epoch_s {
        Some(s) => Utc.timestamp_opt(s as i64, 0).single().unwrap_or_else(Utc::now),
        None => Utc::now(),
    };
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ResearchOrchestrator {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            provider,
            extractor,
            synthesizer,
        }
    }

    /// Run the whole pipeline for one request.
    pub async fn run(&self, req: &ResearchRequest) -> Result<ResearchRun, ResearchFailure> {
        let topic = req.topic.trim();
        let mut warnings: Vec<&'static str> = Vec::new();

        // Searching. Fan out one call per query; join_all preserves the query
        // declaration order regardless of completion order, which keeps the
        // "first occurrence wins" dedup tie-break reproducible.
        let queries = build_queries(topic, &req.focus_areas);
        let target = req.target_source_count();
        let count = per_query_count(target, queries.len());

        let calls = queries.iter().map(|q| {
            let query = SearchQuery::new(q.clone(), count);
            let provider = Arc::clone(&self.provider);
            async move { provider.search(&query).await }
        });
        let responses = join_all(calls).await;

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut provider_error: Option<String> = None;
        for (query, resp) in queries.iter().zip(responses) {
            match resp {
                Ok(r) => merged.extend(r.results),
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search call failed");
                    if !warnings.contains(&"provider_failed") {
                        warnings.push("provider_failed");
                    }
                    provider_error.get_or_insert_with(|| e.to_string());
                }
            }
        }
        if topic.is_empty() || merged.is_empty() {
            return Err(no_results_failure(topic, req.focus_areas.len(), provider_error));
        }
        let sources_retrieved = merged.len();

        // Deduplicating.
        let dedup = dedupe::comprehensive_deduplication(&merged);
        tracing::debug!(
            retrieved = sources_retrieved,
            kept = dedup.deduplicated.len(),
            removed = dedup.duplicates_removed,
            "deduplication complete"
        );

        // Ranking (snippet-only at this point) and selection.
        let scorer = QualityScorer::with_now_epoch_s(req.now_epoch_s);
        let ranked = scorer.rank(dedup.deduplicated, None);
        let selected: Vec<SearchResult> = ranked.into_iter().take(target).collect();
        if selected.len() < target {
            warnings.push("fewer_sources_than_requested");
        }

        // Extracting (external collaborator). Per-URL failures are ordinary
        // partial-failure input; only a clean sweep of failures is terminal.
        let extract_urls: Vec<String> = selected
            .iter()
            .take(target.min(MAX_EXTRACT_URLS))
            .map(|r| r.link.clone())
            .collect();
        let extracted = self.extractor.extract_many(&extract_urls).await;
        let contents: BTreeMap<String, ExtractedContent> = extracted
            .into_iter()
            .filter_map(|(url, r)| match r {
                Ok(c) => Some((url, c)),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "extraction failed");
                    None
                }
            })
            .collect();
        if contents.is_empty() {
            return Err(extraction_failed_failure(topic, extract_urls.len()));
        }
        if contents.len() < extract_urls.len() && !warnings.contains(&"extraction_partial") {
            warnings.push("extraction_partial");
        }

        // Re-assess quality with full text where it exists: recency and
        // author/date extraction see more than a snippet now.
        let qualities: Vec<SourceQuality> = selected
            .iter()
            .map(|r| {
                let content = contents.get(&r.link).map(|c| c.content.as_str());
                scorer.assess(&r.link, content)
            })
            .collect();

        // Synthesizing.
        let synthesis_sources: Vec<SynthesisSource> = selected
            .iter()
            .zip(&qualities)
            .filter_map(|(r, q)| {
                contents.get(&r.link).map(|c| SynthesisSource {
                    url: r.link.clone(),
                    title: c.title.clone().unwrap_or_else(|| r.title.clone()),
                    content: c.content.clone(),
                    quality: q.clone(),
                })
            })
            .collect();
        let synthesis_request = SynthesisRequest {
            topic: topic.to_string(),
            depth: req.depth,
            focus_areas: req.focus_areas.clone(),
            sources: synthesis_sources,
        };

        let (synthesis, synthesis_method) =
            match self.synthesizer.synthesize(&synthesis_request).await {
                Ok(SynthesisOutcome::Done(s)) => (s, self.synthesizer.method().to_string()),
                Ok(SynthesisOutcome::Deferred { instructions }) => {
                    // Pass-through sentinel: the caller's agent finishes the
                    // job; nothing here rewrites the instructions.
                    let s = Synthesis {
                        summary: instructions,
                        ..Synthesis::default()
                    };
                    (s, self.synthesizer.method().to_string())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "synthesizer unavailable, using basic fallback");
                    warnings.push("synthesis_fell_back_to_basic");
                    (
                        synthesize::basic_synthesis(&synthesis_request),
                        "basic_fallback".to_string(),
                    )
                }
            };

        // Assembling. The report's source order is a fresh sort by quality,
        // not an assumption inherited from the ranking stage.
        let mut report_sources: Vec<ReportSource> = selected
            .iter()
            .zip(&qualities)
            .map(|(r, q)| {
                let summary = contents
                    .get(&r.link)
                    .and_then(|c| c.summary.clone().or_else(|| c.description.clone()))
                    .unwrap_or_else(|| r.snippet.clone());
                ReportSource {
                    title: r.title.clone(),
                    url: r.link.clone(),
                    summary,
                    quality_score: q.credibility_score,
                    authority: q.authority_score,
                    source_type: q.source_type,
                    publication_date: q.publication_date.clone(),
                }
            })
            .collect();
        report_sources.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));

        let report = ResearchReport {
            topic: topic.to_string(),
            sources_analyzed: report_sources.len(),
            sources_retrieved,
            duplicates_removed: dedup.duplicates_removed,
            research_summary: synthesis.summary,
            key_findings: synthesis.key_findings,
            themes: synthesis.themes,
            focus_area_analysis: synthesis.focus_analysis,
            quality_metrics: QualityScorer::aggregate_metrics(&qualities),
            sources: report_sources,
            metadata: ReportMetadata {
                depth_level: req.depth.as_str().to_string(),
                focus_areas: (!req.focus_areas.is_empty()).then(|| req.focus_areas.clone()),
                retrieved_at: retrieved_at(req.now_epoch_s),
                synthesis_method,
            },
        };

        Ok(ResearchRun { report, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchpipe_core::{Error, ResearchDepth, Result as CoreResult, SearchResponse};
    use std::sync::Mutex;

    struct StubProvider {
        // One canned response list per expected query, in call order.
        responses: Mutex<BTreeMap<String, Vec<SearchResult>>>,
        fail_queries: Vec<String>,
    }

    impl StubProvider {
        fn new(responses: BTreeMap<String, Vec<SearchResult>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                fail_queries: Vec::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn search(&self, q: &SearchQuery) -> CoreResult<SearchResponse> {
            if self.fail_queries.contains(&q.query) {
                return Err(Error::Search("stub provider down".to_string()));
            }
            let results = self
                .responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&q.query)
                .cloned()
                .unwrap_or_default();
            Ok(SearchResponse {
                results,
                provider: "stub".to_string(),
                timings_ms: BTreeMap::new(),
            })
        }
    }

    struct StubExtractor {
        contents: BTreeMap<String, String>,
    }

    #[async_trait::async_trait]
    impl ContentExtractor for StubExtractor {
        async fn extract_many(
            &self,
            urls: &[String],
        ) -> BTreeMap<String, CoreResult<ExtractedContent>> {
            urls.iter()
                .map(|u| {
                    let r = match self.contents.get(u) {
                        Some(c) => Ok(ExtractedContent {
                            title: Some(format!("Extracted {u}")),
                            description: None,
                            content: c.clone(),
                            summary: Some(c.chars().take(80).collect()),
                        }),
                        None => Err(Error::Fetch(format!("HTTP 503 for {u}"))),
                    };
                    (u.clone(), r)
                })
                .collect()
        }
    }

    struct FailingSynthesizer;

    #[async_trait::async_trait]
    impl Synthesizer for FailingSynthesizer {
        fn method(&self) -> &'static str {
            "direct"
        }
        async fn synthesize(&self, _req: &SynthesisRequest) -> CoreResult<SynthesisOutcome> {
            Err(Error::Llm("connection refused".to_string()))
        }
    }

    fn r(link: &str, snippet: &str) -> SearchResult {
        SearchResult::new(format!("Title for {link}"), link, snippet)
    }

    fn orchestrator_with(
        responses: BTreeMap<String, Vec<SearchResult>>,
        contents: BTreeMap<String, String>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> ResearchOrchestrator {
        ResearchOrchestrator::new(
            Arc::new(StubProvider::new(responses)),
            Arc::new(StubExtractor { contents }),
            synthesizer,
        )
    }

    fn request(topic: &str, focus_areas: &[&str]) -> ResearchRequest {
        ResearchRequest {
            topic: topic.to_string(),
            depth: ResearchDepth::Basic,
            focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(),
            source_count: None,
            now_epoch_s: Some(1_767_225_600), // 2026-01-01T00:00:00Z
        }
    }

    #[test]
    fn builds_one_query_per_focus_area_plus_topic() {
        let qs = build_queries("rust async", &["runtimes".to_string(), " ".to_string()]);
        assert_eq!(qs, vec!["rust async".to_string(), "rust async runtimes".to_string()]);
    }

    #[test]
    fn per_query_count_overshoots_to_survive_dedup() {
        assert_eq!(per_query_count(5, 2), 5); // ceil(5/2)=3, +2
        assert_eq!(per_query_count(3, 1), 5);
        assert_eq!(per_query_count(8, 3), 5); // ceil(8/3)=3, +2
    }

    #[test]
    fn alternative_queries_include_halves_and_overview() {
        let alts = alternative_queries("docker swarm networking internals");
        assert_eq!(
            alts,
            vec![
                "docker swarm".to_string(),
                "networking internals".to_string(),
                "docker swarm networking internals overview".to_string(),
            ]
        );
        assert_eq!(alternative_queries("rust"), vec!["rust overview".to_string()]);
    }

    #[tokio::test]
    async fn all_empty_searches_yield_no_results_failure() {
        let mut responses = BTreeMap::new();
        responses.insert("obscure topic".to_string(), Vec::new());
        responses.insert("obscure topic alpha".to_string(), Vec::new());
        responses.insert("obscure topic beta".to_string(), Vec::new());
        let orch = orchestrator_with(responses, BTreeMap::new(), Arc::new(synthesize::BasicSynthesizer));

        let err = orch
            .run(&request("obscure topic", &["alpha", "beta"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ResearchFailureKind::NoResults);
        assert!(!err.suggestions.is_empty());
        assert!(err
            .alternative_queries
            .contains(&"obscure topic overview".to_string()));
    }

    #[tokio::test]
    async fn happy_path_dedups_ranks_and_assembles_report() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "kubernetes security".to_string(),
            vec![
                r("https://docs.python.org/3/", "official documentation snippet words"),
                r("https://blog.acme.dev/k8s", "an opinionated post about cluster hardening"),
            ],
        );
        responses.insert(
            "kubernetes security rbac".to_string(),
            vec![
                // Exact URL duplicate of the first query's top hit.
                r("https://docs.python.org/3/?utm=x", "slightly different snippet text here"),
                r("https://stackoverflow.com/questions/99", "rbac role binding question thread"),
            ],
        );
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://docs.python.org/3/".to_string(),
            "Official reference, updated 2026. By Jane Smith. Published 2026-01-01.".to_string(),
        );
        contents.insert(
            "https://blog.acme.dev/k8s".to_string(),
            "Cluster hardening notes from 2024.".to_string(),
        );
        contents.insert(
            "https://stackoverflow.com/questions/99".to_string(),
            "Accepted answer from 2025 explaining role bindings.".to_string(),
        );

        let orch = orchestrator_with(responses, contents, Arc::new(synthesize::BasicSynthesizer));
        let run = orch
            .run(&request("kubernetes security", &["rbac"]))
            .await
            .unwrap();
        let report = run.report;

        assert_eq!(report.sources_retrieved, 4);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.sources_analyzed, 3);
        assert_eq!(report.metadata.synthesis_method, "basic");
        assert_eq!(report.metadata.depth_level, "basic");
        assert_eq!(report.metadata.retrieved_at, "2026-01-01T00:00:00Z");
        assert_eq!(
            report.metadata.focus_areas,
            Some(vec!["rbac".to_string()])
        );

        // Report sources are sorted by quality, best first.
        assert_eq!(report.sources[0].url, "https://docs.python.org/3/");
        for pair in report.sources.windows(2) {
            assert!(pair[0].quality_score >= pair[1].quality_score);
        }
        // Full-text reassessment picked up author/date for the docs source.
        assert_eq!(
            report.sources[0].publication_date.as_deref(),
            Some("2026-01-01")
        );
        assert_eq!(report.quality_metrics.total_sources, 3);
        assert!(report.quality_metrics.source_diversity > 0.9);
        assert!(!report.research_summary.is_empty());
        assert!(run.warnings.is_empty());
    }

    #[tokio::test]
    async fn all_extractions_failing_is_terminal() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "walled garden".to_string(),
            vec![
                r("https://a.example/1", "snippet one alpha beta"),
                r("https://b.example/2", "snippet two gamma delta"),
            ],
        );
        // No contents configured: every extraction fails.
        let orch = orchestrator_with(responses, BTreeMap::new(), Arc::new(synthesize::BasicSynthesizer));
        let err = orch.run(&request("walled garden", &[])).await.unwrap_err();
        assert_eq!(err.kind, ResearchFailureKind::ExtractionFailed);
        assert!(!err.suggestions.is_empty());
    }

    #[tokio::test]
    async fn partial_extraction_degrades_with_warning() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "partial topic".to_string(),
            vec![
                r("https://a.example/1", "snippet one alpha beta"),
                r("https://b.example/2", "snippet two gamma delta"),
            ],
        );
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://a.example/1".to_string(),
            "Only this page extracted, in 2025.".to_string(),
        );
        let orch = orchestrator_with(responses, contents, Arc::new(synthesize::BasicSynthesizer));
        let run = orch.run(&request("partial topic", &[])).await.unwrap();
        assert!(run.warnings.contains(&"extraction_partial"));
        // Both sources still appear in the report; the unextracted one keeps
        // its snippet as the summary.
        assert_eq!(run.report.sources_analyzed, 2);
        let b = run
            .report
            .sources
            .iter()
            .find(|s| s.url == "https://b.example/2")
            .unwrap();
        assert_eq!(b.summary, "snippet two gamma delta");
    }

    #[tokio::test]
    async fn synthesizer_failure_falls_back_to_basic() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "fallback topic".to_string(),
            vec![r("https://a.example/1", "snippet one alpha beta")],
        );
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://a.example/1".to_string(),
            "Some extracted content from 2025.".to_string(),
        );
        let orch = orchestrator_with(responses, contents, Arc::new(FailingSynthesizer));
        let run = orch.run(&request("fallback topic", &[])).await.unwrap();
        assert!(run.warnings.contains(&"synthesis_fell_back_to_basic"));
        assert_eq!(run.report.metadata.synthesis_method, "basic_fallback");
        assert!(run.report.research_summary.contains("fallback topic"));
    }

    #[tokio::test]
    async fn deferred_synthesis_passes_through_unmodified() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "deferred topic".to_string(),
            vec![r("https://a.example/1", "snippet one alpha beta")],
        );
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://a.example/1".to_string(),
            "Evidence content body.".to_string(),
        );
        let orch = orchestrator_with(responses, contents, Arc::new(synthesize::AgentSynthesizer));
        let run = orch.run(&request("deferred topic", &[])).await.unwrap();
        assert_eq!(run.report.metadata.synthesis_method, "agent");
        assert!(run.report.research_summary.contains("deferred topic"));
        assert!(run.report.research_summary.contains("https://a.example/1"));
        assert!(run.report.key_findings.is_empty());
    }

    #[tokio::test]
    async fn failed_focus_query_degrades_to_warning() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "mixed topic".to_string(),
            vec![r("https://a.example/1", "snippet one alpha beta")],
        );
        let mut provider = StubProvider::new(responses);
        provider.fail_queries = vec!["mixed topic flaky".to_string()];
        let mut contents = BTreeMap::new();
        contents.insert(
            "https://a.example/1".to_string(),
            "Still got one source, 2025.".to_string(),
        );
        let orch = ResearchOrchestrator::new(
            Arc::new(provider),
            Arc::new(StubExtractor { contents }),
            Arc::new(synthesize::BasicSynthesizer),
        );
        let run = orch.run(&request("mixed topic", &["flaky"])).await.unwrap();
        assert!(run.warnings.contains(&"provider_failed"));
        assert_eq!(run.report.sources_analyzed, 1);
    }

    #[tokio::test]
    async fn sole_query_provider_failure_propagates_as_no_results() {
        let mut provider = StubProvider::new(BTreeMap::new());
        provider.fail_queries = vec!["down topic".to_string()];
        let orch = ResearchOrchestrator::new(
            Arc::new(provider),
            Arc::new(StubExtractor {
                contents: BTreeMap::new(),
            }),
            Arc::new(synthesize::BasicSynthesizer),
        );
        let err = orch.run(&request("down topic", &[])).await.unwrap_err();
        assert_eq!(err.kind, ResearchFailureKind::NoResults);
        assert!(err.message.contains("stub provider down"));
    }
}
