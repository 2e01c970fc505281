#[test]
fn researchpipe_doctor_contract_json_and_bool_flags() {
    let bin = assert_cmd::cargo::cargo_bin!("researchpipe");

    // Critical contract: allow explicit `--check-stdio=false` (clap
    // ArgAction::Set) and still emit well-formed JSON with stable keys.
    let out = std::process::Command::new(bin)
        .args(["doctor", "--check-stdio=false", "--timeout-ms", "1"])
        // Ensure we don't accidentally inherit keys from the environment.
        .env_remove("RESEARCHPIPE_BRAVE_API_KEY")
        .env_remove("BRAVE_SEARCH_API_KEY")
        .env_remove("RESEARCHPIPE_TAVILY_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .env_remove("RESEARCHPIPE_SEARXNG_ENDPOINT")
        .env_remove("RESEARCHPIPE_LLM_BASE_URL")
        .env_remove("RESEARCHPIPE_LLM_MODEL")
        .env_remove("RESEARCHPIPE_ENV_FILE")
        .output()
        .expect("run researchpipe doctor");

    assert!(out.status.success(), "researchpipe doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("doctor"));
    assert!(v.get("elapsed_ms").is_some());

    // Config surface is booleans-only for secrets.
    let providers = &v["config"]["search_providers"];
    assert_eq!(providers["brave"].as_bool(), Some(false));
    assert_eq!(providers["tavily"].as_bool(), Some(false));
    assert_eq!(providers["searxng"].as_bool(), Some(false));
    assert_eq!(v["config"]["synthesis"]["llm_base_url"].as_bool(), Some(false));

    // The provider check fails cleanly with an actionable hint.
    let checks = v["checks"].as_array().expect("checks array");
    let provider_check = checks
        .iter()
        .find(|c| c["name"].as_str() == Some("search_provider_configured"))
        .expect("search_provider_configured check");
    assert_eq!(provider_check["ok"].as_bool(), Some(false));
    assert!(!provider_check["hint"].as_str().unwrap_or("").is_empty());

    // Stdio check not requested: stays null.
    assert!(v["stdio"].is_null());
}

#[test]
fn researchpipe_doctor_reports_configured_searxng() {
    let bin = assert_cmd::cargo::cargo_bin!("researchpipe");
    let out = std::process::Command::new(bin)
        .args(["doctor"])
        .env("RESEARCHPIPE_SEARXNG_ENDPOINT", "http://127.0.0.1:1/search")
        .env_remove("RESEARCHPIPE_BRAVE_API_KEY")
        .env_remove("BRAVE_SEARCH_API_KEY")
        .output()
        .expect("run researchpipe doctor");

    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&out.stdout)).expect("parse doctor json");
    assert_eq!(v["config"]["search_providers"]["searxng"].as_bool(), Some(true));
    // Never echo the endpoint/keys themselves.
    assert!(!v.to_string().contains("127.0.0.1:1"));
}
