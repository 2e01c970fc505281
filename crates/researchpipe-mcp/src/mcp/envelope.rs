use serde::Serialize;

pub(crate) fn warning_hint(code: &'static str) -> Option<&'static str> {
    match code {
        "provider_failed" => Some(
            "One or more search calls failed; the report was built from the queries that succeeded. Check provider keys/endpoints if this persists.",
        ),
        "extraction_partial" => Some(
            "Content extraction failed for some top-ranked URLs. Those sources keep their search snippet as the summary and score recency from it alone.",
        ),
        "fewer_sources_than_requested" => Some(
            "Fewer unique sources survived deduplication than requested. Broaden the topic, add focus areas, or lower source_count.",
        ),
        "synthesis_fell_back_to_basic" => Some(
            "The synthesis backend was unreachable; a deterministic non-AI synthesis was used instead. Configure RESEARCHPIPE_LLM_BASE_URL / RESEARCHPIPE_LLM_MODEL to enable direct synthesis.",
        ),
        _ => None,
    }
}

pub(crate) fn warning_hints_from(codes: &[&'static str]) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    for c in codes {
        if let Some(h) = warning_hint(c) {
            m.insert((*c).to_string(), serde_json::json!(h));
        }
    }
    serde_json::Value::Object(m)
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum ErrorCode {
    InvalidParams,
    NotConfigured,
    NoResults,
    ExtractionFailed,
    SynthesisUnavailable,
    SearchFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::NotConfigured => "not_configured",
            Self::NoResults => "no_results",
            Self::ExtractionFailed => "extraction_failed",
            Self::SynthesisUnavailable => "synthesis_unavailable",
            Self::SearchFailed => "search_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            // Transient by nature: another run can succeed without changes.
            Self::NoResults | Self::ExtractionFailed | Self::SearchFailed => true,
            Self::SynthesisUnavailable => true,
            // Configuration + invalid input are not retryable without changing something.
            Self::InvalidParams | Self::NotConfigured | Self::UnexpectedError => false,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    // Keep a small set of ubiquitous envelope keys stable for clients.
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}
