use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results: Some(max_results),
            language: None,
            country: None,
            timeout_ms: None,
        }
    }
}

/// Closed set of source-type categories a discovered page can fall into.
///
/// Classification is heuristic (domain/URL pattern matching); anything that
/// doesn't match a known pattern ends up as `Unknown`, never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Academic,
    OfficialDocumentation,
    News,
    Blog,
    Forum,
    SocialMedia,
    Commercial,
    Unknown,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::OfficialDocumentation => "official_documentation",
            Self::News => "news",
            Self::Blog => "blog",
            Self::Forum => "forum",
            Self::SocialMedia => "social_media",
            Self::Commercial => "commercial",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for SourceType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One discovered page. `link` is the identity key for deduplication; the
/// optional score fields are attached during ranking and absent before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
            category: None,
            quality_score: None,
            authority: None,
            source_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// Readable content pulled out of a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub summary: Option<String>,
}

/// Fetch + extract a batch of URLs. Per-URL failures are values in the map,
/// not errors of the call: partial extraction is an ordinary outcome.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract_many(&self, urls: &[String]) -> BTreeMap<String, Result<ExtractedContent>>;
}

/// Per-source quality assessment.
///
/// `credibility_score` is always the fixed combination
/// `0.6 * authority + 0.4 * recency` (never set independently), and the
/// component scores are clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQuality {
    pub url: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub authority_score: f64,
    pub recency_score: f64,
    pub credibility_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationResult {
    pub deduplicated: Vec<SearchResult>,
    pub duplicates_removed: usize,
    pub unique_urls: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub source_diversity: f64,
    pub average_authority: f64,
    pub content_freshness: f64,
    pub total_sources: usize,
}

/// Caller-specified research thoroughness tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Basic,
    Intermediate,
    Advanced,
}

impl ResearchDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Default source count when the caller doesn't override it.
    pub fn default_source_count(self) -> usize {
        match self {
            Self::Basic => 3,
            Self::Intermediate => 5,
            Self::Advanced => 8,
        }
    }

    /// Lenient parse; unknown strings fall back to `Intermediate`.
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Self::Basic,
            "advanced" => Self::Advanced,
            _ => Self::Intermediate,
        }
    }
}

impl Default for ResearchDepth {
    fn default() -> Self {
        Self::Intermediate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub depth: ResearchDepth,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Overrides the depth-implied source count when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
    /// Override "now" for deterministic outputs (recency scoring, timestamps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_epoch_s: Option<u64>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            depth: ResearchDepth::default(),
            focus_areas: Vec::new(),
            source_count: None,
            now_epoch_s: None,
        }
    }

    pub fn target_source_count(&self) -> usize {
        self.source_count
            .unwrap_or_else(|| self.depth.default_source_count())
            .clamp(1, 20)
    }
}

/// One source handed to a synthesizer: extracted content plus its assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSource {
    pub url: String,
    pub title: String,
    pub content: String,
    pub quality: SourceQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub topic: String,
    pub depth: ResearchDepth,
    pub focus_areas: Vec<String>,
    pub sources: Vec<SynthesisSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synthesis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_analysis: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
}

/// A synthesizer either produces a synthesis inline or defers to an external
/// agent. `Deferred` is a pass-through sentinel, not a failure: the
/// orchestrator hands `instructions` to the caller unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SynthesisOutcome {
    Done(Synthesis),
    Deferred { instructions: String },
}

#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// Stable method label recorded in report metadata ("direct", "agent", "basic").
    fn method(&self) -> &'static str;
    async fn synthesize(&self, req: &SynthesisRequest) -> Result<SynthesisOutcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSource {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub quality_score: f64,
    pub authority: f64,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub depth_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_areas: Option<Vec<String>>,
    pub retrieved_at: String,
    pub synthesis_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub topic: String,
    pub sources_analyzed: usize,
    pub sources_retrieved: usize,
    pub duplicates_removed: usize,
    pub research_summary: String,
    pub key_findings: Vec<String>,
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_area_analysis: Option<BTreeMap<String, String>>,
    pub quality_metrics: QualityMetrics,
    pub sources: Vec<ReportSource>,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchFailureKind {
    NoResults,
    ExtractionFailed,
    SynthesisUnavailable,
}

impl ResearchFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoResults => "no_results",
            Self::ExtractionFailed => "extraction_failed",
            Self::SynthesisUnavailable => "synthesis_unavailable",
        }
    }
}

/// Structured, caller-facing failure for a whole research request.
///
/// Stage errors are converted into this shape at the orchestrator boundary;
/// a single request's failure never takes down the host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchFailure {
    pub kind: ResearchFailureKind,
    pub message: String,
    pub suggestions: Vec<String>,
    pub alternative_queries: Vec<String>,
}

impl std::fmt::Display for ResearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ResearchFailure {}
