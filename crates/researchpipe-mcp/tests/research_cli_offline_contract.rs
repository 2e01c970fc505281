//! End-to-end CLI contract against a local fixture server: search (SearXNG
//! JSON shape) -> dedup -> rank -> extract -> basic synthesis -> artifact.
//! Fully offline; the only network is the loopback fixture.

use std::net::SocketAddr;

async fn spawn_fixture() -> String {
    use axum::{routing::get, Json, Router};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let search_base = base.clone();
    let app = Router::new()
        .route(
            "/search",
            get(move || {
                let base = search_base.clone();
                async move {
                    Json(serde_json::json!({
                        "results": [
                            {"url": format!("{base}/ref"), "title": "Reference",
                             "content": "canonical reference text for the sample topic"},
                            {"url": format!("{base}/ref?utm_campaign=x"), "title": "Reference (tracked)",
                             "content": "same destination, tracking parameter variant"},
                            {"url": format!("{base}/notes"), "title": "Field Notes",
                             "content": "practitioner observations collected over several releases"}
                        ]
                    }))
                }
            }),
        )
        .route(
            "/ref",
            get(|| async {
                (
                    [("content-type", "text/html")],
                    "<html><head><title>Reference</title></head><body>\
                     <p>Canonical material, last updated 2026-02-01. By Ada Example.</p></body></html>",
                )
            }),
        )
        .route(
            "/notes",
            get(|| async {
                (
                    [("content-type", "text/html")],
                    "<html><head><title>Field Notes</title></head><body>\
                     <p>Observations from 2023 deployments.</p></body></html>",
                )
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("axum serve");
    });
    base
}

#[test]
fn research_subcommand_writes_report_artifact() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let base = rt.block_on(spawn_fixture());

    let tmp = tempfile::tempdir().expect("tempdir");
    let out_path = tmp.path().join("report.json");

    let bin = assert_cmd::cargo::cargo_bin!("researchpipe");
    let out = std::process::Command::new(bin)
        .args([
            "research",
            "sample topic",
            "--depth",
            "basic",
            "--provider",
            "searxng",
            "--synthesis",
            "basic",
            "--now-epoch-s",
            "1767225600",
            "--out",
        ])
        .arg(&out_path)
        .env("RESEARCHPIPE_SEARXNG_ENDPOINT", &base)
        .env_remove("RESEARCHPIPE_BRAVE_API_KEY")
        .env_remove("BRAVE_SEARCH_API_KEY")
        .env_remove("RESEARCHPIPE_TAVILY_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .env_remove("RESEARCHPIPE_LLM_BASE_URL")
        .env_remove("RESEARCHPIPE_LLM_MODEL")
        .output()
        .expect("run researchpipe research");

    assert!(
        out.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    // The CLI prints the artifact path it wrote.
    let printed = String::from_utf8_lossy(&out.stdout);
    assert!(printed.contains("report.json"));

    let artifact = std::fs::read_to_string(&out_path).expect("read artifact");
    let v: serde_json::Value = serde_json::from_str(&artifact).expect("parse artifact json");

    assert_eq!(v["ok"].as_bool(), Some(true), "payload: {v}");
    assert_eq!(v["kind"].as_str(), Some("deep_research"));
    assert_eq!(v["schema_version"].as_u64(), Some(1));

    let report = &v["report"];
    assert_eq!(report["topic"].as_str(), Some("sample topic"));
    // Three raw rows, one exact URL duplicate (tracking parameter).
    assert_eq!(report["sources_retrieved"].as_u64(), Some(3));
    assert_eq!(report["duplicates_removed"].as_u64(), Some(1));
    assert_eq!(report["sources_analyzed"].as_u64(), Some(2));
    assert_eq!(report["metadata"]["depth_level"].as_str(), Some("basic"));
    assert_eq!(report["metadata"]["synthesis_method"].as_str(), Some("basic"));
    assert_eq!(
        report["metadata"]["retrieved_at"].as_str(),
        Some("2026-01-01T00:00:00Z")
    );

    let sources = report["sources"].as_array().expect("sources");
    assert_eq!(sources.len(), 2);
    // The fresher reference page outranks the 2023 notes, and the full-text
    // pass recovered its publication date and the byline.
    assert!(sources[0]["url"].as_str().unwrap().ends_with("/ref"));
    assert_eq!(
        sources[0]["publication_date"].as_str(),
        Some("2026-02-01")
    );
    assert!(
        sources[0]["quality_score"].as_f64().unwrap()
            > sources[1]["quality_score"].as_f64().unwrap()
    );
}

#[test]
fn research_subcommand_fails_closed_without_provider() {
    let bin = assert_cmd::cargo::cargo_bin!("researchpipe");
    let out = std::process::Command::new(bin)
        .args(["research", "sample topic", "--provider", "searxng"])
        .env_remove("RESEARCHPIPE_SEARXNG_ENDPOINT")
        .output()
        .expect("run researchpipe research");

    // Structured failure: nonzero exit, but still a parseable JSON envelope.
    assert!(!out.status.success());
    let v: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&out.stdout)).expect("parse json");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["error"]["code"].as_str(), Some("not_configured"));
    assert!(!v["error"]["hint"].as_str().unwrap_or("").is_empty());
}
