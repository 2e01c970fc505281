#![recursion_limit = "256"]

use anyhow::Result;
use clap::{Parser, Subcommand};
use researchpipe_core::{ResearchDepth, ResearchFailureKind, ResearchRequest, SearchQuery};
use researchpipe_local::{
    provider_from_env, synthesizer_from_env, HttpExtractor, ResearchOrchestrator, SynthesisBackend,
};
use std::sync::Arc;

#[path = "mcp/envelope.rs"]
mod envelope;
use envelope::{add_envelope_fields, error_obj, warning_hints_from, ErrorCode};

const SCHEMA_VERSION: u64 = 1;

#[derive(Parser, Debug)]
#[command(name = "researchpipe")]
#[command(about = "Research-assistant plumbing (MCP stdio server + CLI)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Run one research request and print (or write) the report JSON.
    Research(ResearchCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ResearchCmd {
    /// Research topic.
    topic: String,
    /// Focus area (repeatable); each adds a dedicated search query.
    #[arg(long)]
    focus_area: Vec<String>,
    /// Research depth. Allowed: basic, intermediate, advanced
    #[arg(long, default_value = "intermediate")]
    depth: String,
    /// Explicit source count (overrides the depth default).
    #[arg(long)]
    source_count: Option<usize>,
    /// Search provider. Allowed: auto, brave, tavily, searxng
    #[arg(long, default_value = "auto")]
    provider: String,
    /// Synthesis strategy. Allowed: auto, direct, agent, basic
    #[arg(long, default_value = "auto")]
    synthesis: String,
    /// Output JSON path (default: stdout).
    #[arg(long)]
    out: Option<std::path::PathBuf>,
    /// Override "now" for deterministic outputs.
    #[arg(long)]
    now_epoch_s: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Also spawn a child `mcp-stdio` process and verify the MCP handshake.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    check_stdio: bool,
    /// Timeout for the stdio handshake check (ms).
    #[arg(long, default_value_t = 8_000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {}

fn http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent(concat!("researchpipe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.to_string())
}

/// Everything `deep_research` needs, shared by the CLI and the MCP tool.
#[derive(Debug, Clone)]
struct ResearchSpec {
    topic: String,
    focus_areas: Vec<String>,
    depth: String,
    source_count: Option<usize>,
    provider: String,
    synthesis: String,
    now_epoch_s: Option<u64>,
}

fn failure_code(kind: ResearchFailureKind) -> ErrorCode {
    match kind {
        ResearchFailureKind::NoResults => ErrorCode::NoResults,
        ResearchFailureKind::ExtractionFailed => ErrorCode::ExtractionFailed,
        ResearchFailureKind::SynthesisUnavailable => ErrorCode::SynthesisUnavailable,
    }
}

/// Run the full pipeline and fold the outcome into an envelope payload.
/// Never errors: every failure becomes a structured `error` object.
async fn run_research(spec: &ResearchSpec) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let topic = spec.topic.trim().to_string();

    let request_obj = serde_json::json!({
        "topic": topic,
        "focus_areas": spec.focus_areas,
        "depth": spec.depth,
        "source_count": spec.source_count,
        "provider": spec.provider,
        "synthesis": spec.synthesis,
        "now_epoch_s": spec.now_epoch_s,
    });

    let finish = |mut payload: serde_json::Value| {
        payload["request"] = request_obj.clone();
        add_envelope_fields(&mut payload, "deep_research", t0.elapsed().as_millis());
        payload
    };

    if topic.is_empty() {
        return finish(serde_json::json!({
            "ok": false,
            "error": error_obj(ErrorCode::InvalidParams, "topic must be non-empty", "Provide a topic string."),
        }));
    }

    let client = match http_client() {
        Ok(c) => c,
        Err(e) => {
            return finish(serde_json::json!({
                "ok": false,
                "error": error_obj(ErrorCode::UnexpectedError, e, "HTTP client construction failed."),
            }));
        }
    };

    let provider = match provider_from_env(client.clone(), &spec.provider) {
        Ok(p) => p,
        Err(e) => {
            return finish(serde_json::json!({
                "ok": false,
                "error": error_obj(
                    ErrorCode::NotConfigured,
                    e.to_string(),
                    "Set RESEARCHPIPE_BRAVE_API_KEY / RESEARCHPIPE_TAVILY_API_KEY / RESEARCHPIPE_SEARXNG_ENDPOINT, or pass a specific provider.",
                ),
            }));
        }
    };
    let synthesizer =
        match synthesizer_from_env(client.clone(), SynthesisBackend::parse_loose(&spec.synthesis)) {
            Ok(s) => s,
            Err(e) => {
                return finish(serde_json::json!({
                    "ok": false,
                    "error": error_obj(
                        ErrorCode::NotConfigured,
                        e.to_string(),
                        "Set RESEARCHPIPE_LLM_BASE_URL and RESEARCHPIPE_LLM_MODEL, or use synthesis=basic.",
                    ),
                }));
            }
        };
    let extractor = Arc::new(HttpExtractor::new(client));
    let orchestrator = ResearchOrchestrator::new(provider, extractor, synthesizer);

    let request = ResearchRequest {
        topic,
        depth: ResearchDepth::parse_loose(&spec.depth),
        focus_areas: spec
            .focus_areas
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        source_count: spec.source_count,
        now_epoch_s: spec.now_epoch_s,
    };

    match orchestrator.run(&request).await {
        Ok(run) => {
            let report = match serde_json::to_value(&run.report) {
                Ok(v) => v,
                Err(e) => {
                    return finish(serde_json::json!({
                        "ok": false,
                        "error": error_obj(ErrorCode::UnexpectedError, e.to_string(), "Report serialization failed."),
                    }));
                }
            };
            finish(serde_json::json!({
                "ok": true,
                "report": report,
                "warnings": run.warnings,
                "warning_hints": warning_hints_from(&run.warnings),
            }))
        }
        Err(f) => finish(serde_json::json!({
            "ok": false,
            "error": error_obj(
                failure_code(f.kind),
                &f.message,
                f.suggestions.first().cloned().unwrap_or_default(),
            ),
            "suggestions": f.suggestions,
            "alternative_queries": f.alternative_queries,
        })),
    }
}

#[derive(Debug, Clone)]
struct WebSearchSpec {
    query: String,
    provider: String,
    max_results: usize,
    language: Option<String>,
    country: Option<String>,
    timeout_ms: Option<u64>,
}

async fn run_web_search(spec: &WebSearchSpec) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let query = spec.query.trim().to_string();

    let finish = |mut payload: serde_json::Value| {
        payload["request"] = serde_json::json!({
            "provider": spec.provider,
            "max_results": spec.max_results,
            "language": spec.language,
            "country": spec.country,
        });
        add_envelope_fields(&mut payload, "web_search", t0.elapsed().as_millis());
        payload
    };

    if query.is_empty() {
        return finish(serde_json::json!({
            "ok": false,
            "query": "",
            "error": error_obj(ErrorCode::InvalidParams, "query must be non-empty", "Provide a query string."),
        }));
    }

    let client = match http_client() {
        Ok(c) => c,
        Err(e) => {
            return finish(serde_json::json!({
                "ok": false,
                "query": query,
                "error": error_obj(ErrorCode::UnexpectedError, e, "HTTP client construction failed."),
            }));
        }
    };
    let provider = match provider_from_env(client, &spec.provider) {
        Ok(p) => p,
        Err(e) => {
            return finish(serde_json::json!({
                "ok": false,
                "query": query,
                "provider": spec.provider,
                "error": error_obj(
                    ErrorCode::NotConfigured,
                    e.to_string(),
                    "Set a provider key/endpoint (RESEARCHPIPE_BRAVE_API_KEY, RESEARCHPIPE_TAVILY_API_KEY, RESEARCHPIPE_SEARXNG_ENDPOINT).",
                ),
            }));
        }
    };

    let q = SearchQuery {
        query: query.clone(),
        max_results: Some(spec.max_results.clamp(1, 20)),
        language: spec.language.clone(),
        country: spec.country.clone(),
        timeout_ms: spec.timeout_ms,
    };
    match provider.search(&q).await {
        Ok(resp) => finish(serde_json::json!({
            "ok": true,
            "query": query,
            "provider": resp.provider,
            "count": resp.results.len(),
            "results": resp.results,
            "timings_ms": resp.timings_ms,
        })),
        Err(e) => finish(serde_json::json!({
            "ok": false,
            "query": query,
            "provider": provider.name(),
            "error": error_obj(ErrorCode::SearchFailed, e.to_string(), "The provider call failed; retry later or switch providers."),
        })),
    }
}

fn has_env(k: &str) -> bool {
    std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
}

fn version_payload() -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "name": "researchpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "features": {
            "stdio": cfg!(feature = "stdio"),
        },
    })
}

fn config_report() -> serde_json::Value {
    // Booleans only; never print values.
    serde_json::json!({
        "search_providers": {
            "brave": has_env("RESEARCHPIPE_BRAVE_API_KEY") || has_env("BRAVE_SEARCH_API_KEY"),
            "tavily": has_env("RESEARCHPIPE_TAVILY_API_KEY") || has_env("TAVILY_API_KEY"),
            "searxng": has_env("RESEARCHPIPE_SEARXNG_ENDPOINT"),
        },
        "synthesis": {
            "llm_base_url": has_env("RESEARCHPIPE_LLM_BASE_URL"),
            "llm_model": has_env("RESEARCHPIPE_LLM_MODEL"),
        },
    })
}

async fn doctor_payload(args: &DoctorCmd) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let config = config_report();

    let any_provider = config["search_providers"]
        .as_object()
        .map(|m| m.values().any(|v| v.as_bool().unwrap_or(false)))
        .unwrap_or(false);

    let mut checks: Vec<serde_json::Value> = Vec::new();
    checks.push(serde_json::json!({
        "name": "search_provider_configured",
        "ok": any_provider,
        "message": if any_provider { "at least one search provider is configured" } else { "no search provider configured" },
        "hint": if any_provider { "" } else { "Set RESEARCHPIPE_BRAVE_API_KEY, RESEARCHPIPE_TAVILY_API_KEY, or RESEARCHPIPE_SEARXNG_ENDPOINT." },
    }));

    let llm_ok = has_env("RESEARCHPIPE_LLM_BASE_URL") && has_env("RESEARCHPIPE_LLM_MODEL");
    checks.push(serde_json::json!({
        "name": "direct_synthesis_configured",
        "ok": llm_ok,
        "message": if llm_ok { "direct synthesis endpoint is configured" } else { "direct synthesis not configured (basic fallback will be used)" },
        "hint": if llm_ok { "" } else { "Optional: set RESEARCHPIPE_LLM_BASE_URL and RESEARCHPIPE_LLM_MODEL for model-written syntheses." },
    }));

    #[cfg(feature = "stdio")]
    let stdio_check = if args.check_stdio {
        mcp::stdio_handshake_check(args.timeout_ms).await
    } else {
        serde_json::Value::Null
    };
    #[cfg(not(feature = "stdio"))]
    let stdio_check = {
        let _ = args;
        serde_json::Value::Null
    };

    serde_json::json!({
        "ok": true,
        "schema_version": SCHEMA_VERSION,
        "kind": "doctor",
        "elapsed_ms": t0.elapsed().as_millis(),
        "config": config,
        "checks": checks,
        "stdio": stdio_check,
    })
}

#[cfg(feature = "stdio")]
mod mcp {
    use super::*;
    use rmcp::{
        handler::server::router::tool::ToolRouter as RmcpToolRouter,
        handler::server::wrapper::Parameters,
        model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
        tool, tool_handler, tool_router,
        transport::stdio,
        ErrorData as McpError, ServiceExt,
    };
    use schemars::JsonSchema;
    use serde::Deserialize;

    fn tool_result(payload: serde_json::Value) -> CallToolResult {
        // Structured content for machine consumers, plus a text fallback for
        // clients that only read `content[0].text`.
        let mut r = CallToolResult::structured(payload.clone());
        r.content = vec![Content::text(payload.to_string())];
        r
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    struct MetaArgs {}

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    struct WebSearchArgs {
        /// Search query.
        query: Option<String>,
        /// Provider to use. Allowed: auto, brave, tavily, searxng
        provider: Option<String>,
        /// Max results to request (1..=20).
        max_results: Option<usize>,
        language: Option<String>,
        country: Option<String>,
        timeout_ms: Option<u64>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    struct DeepResearchArgs {
        /// Research topic.
        topic: Option<String>,
        /// Focus areas; each adds a dedicated search query and synthesis section.
        focus_areas: Option<Vec<String>>,
        /// Research depth. Allowed: basic, intermediate, advanced
        depth: Option<String>,
        /// Explicit source count (overrides the depth default).
        source_count: Option<usize>,
        /// Search provider. Allowed: auto, brave, tavily, searxng
        provider: Option<String>,
        /// Synthesis strategy. Allowed: auto, direct, agent, basic
        synthesis: Option<String>,
        /// Override "now" for deterministic outputs.
        now_epoch_s: Option<u64>,
    }

    #[derive(Clone)]
    pub(crate) struct ResearchpipeMcp {
        tool_router: RmcpToolRouter<Self>,
    }

    #[tool_router]
    impl ResearchpipeMcp {
        pub(crate) fn new() -> Self {
            Self {
                tool_router: Self::tool_router(),
            }
        }

        #[tool(description = "Report researchpipe configuration + version (no secrets)")]
        async fn researchpipe_meta(
            &self,
            params: Parameters<Option<MetaArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let _args = params.0.unwrap_or_default();
            let mut payload = serde_json::json!({
                "ok": true,
                "version": env!("CARGO_PKG_VERSION"),
                "config": config_report(),
            });
            add_envelope_fields(&mut payload, "researchpipe_meta", t0.elapsed().as_millis());
            Ok(tool_result(payload))
        }

        #[tool(description = "Run one web search through the configured provider")]
        async fn web_search(
            &self,
            params: Parameters<Option<WebSearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let spec = WebSearchSpec {
                query: args.query.unwrap_or_default(),
                provider: args.provider.unwrap_or_else(|| "auto".to_string()),
                max_results: args.max_results.unwrap_or(10),
                language: args.language,
                country: args.country,
                timeout_ms: args.timeout_ms,
            };
            Ok(tool_result(run_web_search(&spec).await))
        }

        #[tool(
            description = "Agentic research: search -> dedup -> rank -> extract -> synthesize (bounded)"
        )]
        async fn deep_research(
            &self,
            params: Parameters<Option<DeepResearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let spec = ResearchSpec {
                topic: args.topic.unwrap_or_default(),
                focus_areas: args.focus_areas.unwrap_or_default(),
                depth: args.depth.unwrap_or_else(|| "intermediate".to_string()),
                source_count: args.source_count,
                provider: args.provider.unwrap_or_else(|| "auto".to_string()),
                synthesis: args.synthesis.unwrap_or_else(|| "auto".to_string()),
                now_epoch_s: args.now_epoch_s,
            };
            Ok(tool_result(run_research(&spec).await))
        }
    }

    #[tool_handler]
    impl rmcp::ServerHandler for ResearchpipeMcp {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                instructions: Some(
                    "Research-assistant plumbing: pluggable web search, deduplicated + credibility-ranked sources, bounded extraction and synthesis. Outputs are JSON and schema-versioned."
                        .to_string(),
                ),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }
    }

    pub(crate) async fn serve_stdio() -> Result<(), McpError> {
        let svc = ResearchpipeMcp::new();
        let running = svc
            .serve(stdio())
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        // Keep the stdio server alive until the client closes.
        running
            .waiting()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(())
    }

    /// Spawn a child `mcp-stdio` process and verify it answers `list_tools`.
    pub(crate) async fn stdio_handshake_check(timeout_ms: u64) -> serde_json::Value {
        use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
        use tokio::process::Command;

        let exe = std::env::current_exe()
            .unwrap_or_else(|_| std::path::PathBuf::from("researchpipe"));
        let child = match TokioChildProcess::new(Command::new(exe).configure(|cmd| {
            cmd.args(["mcp-stdio"]);
            // Keep stderr quiet-ish for this probe unless explicitly enabled.
            cmd.env("RUST_LOG", "error");
        })) {
            Ok(c) => c,
            Err(e) => {
                return serde_json::json!({
                    "ok": false,
                    "error": { "code": "spawn_failed", "message": e.to_string() },
                });
            }
        };

        let service = match ().serve(child).await {
            Ok(s) => s,
            Err(e) => {
                return serde_json::json!({
                    "ok": false,
                    "error": {
                        "code": "handshake_failed",
                        "message": e.to_string(),
                        "hint": "The child closed the stdio transport early. Check that nothing prints to stdout in mcp-stdio mode.",
                    },
                });
            }
        };

        let t0 = std::time::Instant::now();
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            service.list_tools(Default::default()),
        )
        .await;
        match res {
            Ok(Ok(tools)) => serde_json::json!({
                "ok": true,
                "tool_count": tools.tools.len(),
                "elapsed_ms": t0.elapsed().as_millis(),
            }),
            Ok(Err(e)) => serde_json::json!({
                "ok": false,
                "error": { "code": "list_tools_failed", "message": e.to_string() },
            }),
            Err(_) => serde_json::json!({
                "ok": false,
                "error": {
                    "code": "timeout",
                    "message": format!("stdio handshake timed out after {timeout_ms}ms"),
                },
            }),
        }
    }

}

fn init_tracing() {
    // Logs go to stderr: in mcp-stdio mode stdout is the MCP transport and
    // must stay contamination-free.
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_env_file() {
    // Optional env-file loader (opt-in).
    //
    // MCP server environments often aren't interactive shells, so users want
    // a single place to keep keys without exporting them manually.
    //
    // Safety:
    // - opt-in only (RESEARCHPIPE_ENV_FILE)
    // - sets vars only if not already set in the process environment
    // - does not log values
    if let Ok(p) = std::env::var("RESEARCHPIPE_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            if let Ok(txt) = std::fs::read_to_string(p) {
                for raw in txt.lines() {
                    let s = raw.trim();
                    if s.is_empty() || s.starts_with('#') {
                        continue;
                    }
                    let Some((k, v)) = s.split_once('=') else {
                        continue;
                    };
                    let k = k.trim();
                    let v = v.trim();
                    if k.is_empty() {
                        continue;
                    }
                    // Don't override explicit process env.
                    if std::env::var_os(k).is_none() {
                        std::env::set_var(k, v);
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "mcp stdio server starting");
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Research(args) => {
            let spec = ResearchSpec {
                topic: args.topic,
                focus_areas: args.focus_area,
                depth: args.depth,
                source_count: args.source_count,
                provider: args.provider,
                synthesis: args.synthesis,
                now_epoch_s: args.now_epoch_s,
            };
            let payload = run_research(&spec).await;
            let text = serde_json::to_string_pretty(&payload)?;
            match args.out {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent)?;
                        }
                    }
                    std::fs::write(&path, text)?;
                    println!("{}", path.display());
                }
                None => println!("{text}"),
            }
            if payload["ok"].as_bool() != Some(true) {
                std::process::exit(2);
            }
        }
        Commands::Doctor(args) => {
            let payload = doctor_payload(&args).await;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Version(_args) => {
            println!("{}", serde_json::to_string_pretty(&version_payload())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn version_payload_has_name_and_version() {
        let v = version_payload();
        assert_eq!(v["ok"].as_bool(), Some(true));
        assert_eq!(v["name"].as_str(), Some("researchpipe"));
        assert!(!v["version"].as_str().unwrap_or_default().is_empty());
    }

    #[test]
    fn failure_codes_map_one_to_one() {
        assert_eq!(
            failure_code(ResearchFailureKind::NoResults).as_str(),
            "no_results"
        );
        assert_eq!(
            failure_code(ResearchFailureKind::ExtractionFailed).as_str(),
            "extraction_failed"
        );
        assert_eq!(
            failure_code(ResearchFailureKind::SynthesisUnavailable).as_str(),
            "synthesis_unavailable"
        );
    }
}
