//! Synthesis strategies.
//!
//! Selected once at startup (constructor-injected into the orchestrator),
//! not discovered at call time:
//! - `DirectSynthesizer`: OpenAI-compatible chat completions endpoint.
//! - `AgentSynthesizer`: defers to an external agent via the `Deferred`
//!   sentinel, carrying a bounded evidence pack.
//! - `BasicSynthesizer`: deterministic, non-AI synthesis from titles and
//!   content heads; also the fallback when the direct backend is unreachable.

use researchpipe_core::{
    Error, Result, Synthesis, SynthesisOutcome, SynthesisRequest, Synthesizer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn first_sentence(s: &str) -> String {
    let trimmed = s.trim();
    for (i, ch) in trimmed.char_indices() {
        if matches!(ch, '.' | '!' | '?') && i >= 40 {
            return trimmed[..=i].to_string();
        }
    }
    truncate_chars(trimmed, 200)
}

// Small, stable list: enough to keep junk tokens out of theme extraction.
const STOPWORDS: [&str; 47] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "i",
    "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "s", "she", "that", "the",
    "their", "them", "there", "they", "this", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "you", "your",
];

/// Deterministic synthesis from titles and content heads. No model involved;
/// used directly as a strategy and as the SYNTHESIS_UNAVAILABLE fallback.
pub fn basic_synthesis(req: &SynthesisRequest) -> Synthesis {
    let titles: Vec<&str> = req
        .sources
        .iter()
        .map(|s| s.title.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect();

    let mut summary = format!(
        "Research on \"{}\" drew on {} source{}",
        req.topic,
        req.sources.len(),
        if req.sources.len() == 1 { "" } else { "s" },
    );
    if titles.is_empty() {
        summary.push('.');
    } else {
        summary.push_str(", including: ");
        summary.push_str(&titles.join("; "));
        summary.push('.');
    }

    let key_findings: Vec<String> = req
        .sources
        .iter()
        .filter(|s| !s.content.trim().is_empty())
        .map(|s| {
            let lead = first_sentence(&s.content);
            if s.title.trim().is_empty() {
                format!("{} - {}", s.quality.domain, lead)
            } else {
                format!("{} ({}) - {}", s.title.trim(), s.quality.domain, lead)
            }
        })
        .collect();

    // Theme extraction: most frequent non-stopword tokens across titles and
    // content heads, ties broken alphabetically for stable output.
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for s in &req.sources {
        let text = format!("{} {}", s.title, truncate_chars(&s.content, 2_000));
        for raw in text.split(|c: char| !c.is_alphanumeric()) {
            let t = raw.trim().to_lowercase();
            if t.len() < 4 || STOPWORDS.contains(&t.as_str()) {
                continue;
            }
            *counts.entry(t).or_insert(0) += 1;
        }
    }
    let mut by_count: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    by_count.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let themes: Vec<String> = by_count.into_iter().take(6).map(|(t, _)| t).collect();

    let focus_analysis = if req.focus_areas.is_empty() {
        None
    } else {
        let mut out = BTreeMap::new();
        for area in &req.focus_areas {
            let needle = area.to_lowercase();
            let hits: Vec<&str> = req
                .sources
                .iter()
                .filter(|s| {
                    s.title.to_lowercase().contains(&needle)
                        || s.content.to_lowercase().contains(&needle)
                })
                .map(|s| s.quality.domain.as_str())
                .collect();
            let line = if hits.is_empty() {
                format!("No retrieved source addresses \"{area}\" directly.")
            } else {
                format!("Covered by {} source(s): {}.", hits.len(), hits.join(", "))
            };
            out.insert(area.clone(), line);
        }
        Some(out)
    };

    Synthesis {
        summary,
        key_findings,
        themes,
        focus_analysis,
        contradictions: None,
        recommendations: None,
    }
}

pub struct BasicSynthesizer;

#[async_trait::async_trait]
impl Synthesizer for BasicSynthesizer {
    fn method(&self) -> &'static str {
        "basic"
    }

    async fn synthesize(&self, req: &SynthesisRequest) -> Result<SynthesisOutcome> {
        Ok(SynthesisOutcome::Done(basic_synthesis(req)))
    }
}

/// Bounded evidence pack shared by the direct and agent strategies.
fn evidence_pack(req: &SynthesisRequest, max_chars_per_source: usize) -> String {
    let mut out = String::new();
    for (i, s) in req.sources.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} - {}\ncredibility={:.2} type={}\n{}\n\n",
            i + 1,
            s.title.trim(),
            s.url,
            s.quality.credibility_score,
            s.quality.source_type.as_str(),
            truncate_chars(s.content.trim(), max_chars_per_source),
        ));
    }
    out
}

/// Defers synthesis to an external agent: the outcome carries instructions
/// plus the evidence pack, passed through to the caller unmodified.
pub struct AgentSynthesizer;

#[async_trait::async_trait]
impl Synthesizer for AgentSynthesizer {
    fn method(&self) -> &'static str {
        "agent"
    }

    async fn synthesize(&self, req: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let mut instructions = format!(
            "Synthesize a {} research report on \"{}\" from the numbered sources below. \
             Cite sources by URL. Cover key findings and recurring themes",
            req.depth.as_str(),
            req.topic,
        );
        if req.focus_areas.is_empty() {
            instructions.push('.');
        } else {
            instructions.push_str(&format!(
                ", with a dedicated section per focus area: {}.",
                req.focus_areas.join(", ")
            ));
        }
        instructions.push_str("\n\n");
        instructions.push_str(&evidence_pack(req, 2_000));
        Ok(SynthesisOutcome::Deferred { instructions })
    }
}

fn llm_base_url_from_env() -> Option<String> {
    env("RESEARCHPIPE_LLM_BASE_URL")
}

fn llm_api_key_from_env() -> Option<String> {
    env("RESEARCHPIPE_LLM_API_KEY")
}

fn llm_model_from_env() -> Option<String> {
    env("RESEARCHPIPE_LLM_MODEL")
}

/// Chat-completions synthesis against an OpenAI-compatible endpoint.
pub struct DirectSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: u64,
    max_tokens: Option<u64>,
}

impl DirectSynthesizer {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = llm_base_url_from_env()
            .ok_or_else(|| Error::NotConfigured("missing RESEARCHPIPE_LLM_BASE_URL".to_string()))?;
        let model = llm_model_from_env()
            .ok_or_else(|| Error::NotConfigured("missing RESEARCHPIPE_LLM_MODEL".to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key: llm_api_key_from_env(),
            model,
            timeout_ms: 60_000,
            max_tokens: Some(2_000),
        })
    }

    fn endpoint_chat_completions(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: Some(0.2),
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("chat.completions HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        Ok(parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Synthesizer for DirectSynthesizer {
    fn method(&self) -> &'static str {
        "direct"
    }

    async fn synthesize(&self, req: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let system = "You are a careful research assistant. Use only the provided evidence pack. \
                      Reply with a single JSON object: {\"summary\": string, \"key_findings\": \
                      [string], \"themes\": [string], \"focus_analysis\": {area: string}?, \
                      \"contradictions\": [string]?, \"recommendations\": [string]?}.";
        let mut user = format!(
            "Topic: {}\nDepth: {}\n",
            req.topic,
            req.depth.as_str()
        );
        if !req.focus_areas.is_empty() {
            user.push_str(&format!("Focus areas: {}\n", req.focus_areas.join(", ")));
        }
        user.push_str("\nEvidence:\n\n");
        user.push_str(&evidence_pack(req, 2_000));

        let text = self.chat(system, &user).await?;
        Ok(SynthesisOutcome::Done(parse_synthesis_text(&text)))
    }
}

/// Lenient parse of a model reply: a bare JSON object, a JSON object embedded
/// in prose/fences, or, failing both, the whole text as the summary.
fn parse_synthesis_text(text: &str) -> Synthesis {
    if let Ok(s) = serde_json::from_str::<Synthesis>(text.trim()) {
        return s;
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(s) = serde_json::from_str::<Synthesis>(&text[start..=end]) {
                return s;
            }
        }
    }
    Synthesis {
        summary: text.trim().to_string(),
        ..Synthesis::default()
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Which synthesis strategy to run, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisBackend {
    /// Direct if the LLM endpoint is configured, basic otherwise.
    Auto,
    Direct,
    Agent,
    Basic,
}

impl SynthesisBackend {
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Self::Direct,
            "agent" => Self::Agent,
            "basic" => Self::Basic,
            _ => Self::Auto,
        }
    }
}

/// Build the configured strategy. `Auto` degrades to `Basic` when the LLM
/// endpoint isn't configured; `Direct` reports the configuration error.
pub fn synthesizer_from_env(
    client: reqwest::Client,
    backend: SynthesisBackend,
) -> Result<Arc<dyn Synthesizer>> {
    match backend {
        SynthesisBackend::Basic => Ok(Arc::new(BasicSynthesizer)),
        SynthesisBackend::Agent => Ok(Arc::new(AgentSynthesizer)),
        SynthesisBackend::Direct => Ok(Arc::new(DirectSynthesizer::from_env(client)?)),
        SynthesisBackend::Auto => match DirectSynthesizer::from_env(client) {
            Ok(s) => Ok(Arc::new(s)),
            Err(_) => Ok(Arc::new(BasicSynthesizer)),
        },
    }
}
