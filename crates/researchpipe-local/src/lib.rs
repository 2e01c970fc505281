//! Local implementations for researchpipe: the source-ranking/deduplication
//! pipeline, search-provider adapters, HTTP content extraction, and the
//! synthesis strategies, wired together by `ResearchOrchestrator`.

pub mod classify;
pub mod dedupe;
pub mod extract;
pub mod fingerprint;
pub mod quality;
pub mod recency;
pub mod research;
pub mod search;
pub mod synthesize;
pub mod urlnorm;

pub use extract::HttpExtractor;
pub use quality::QualityScorer;
pub use research::{ResearchOrchestrator, ResearchRun};
pub use search::{provider_from_env, AutoSearchProvider};
pub use synthesize::{synthesizer_from_env, SynthesisBackend};
