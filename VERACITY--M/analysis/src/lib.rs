#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Misinformation analysis pipeline: claim extraction, context retrieval and
//! credibility synthesis, each with a deterministic fallback.

/// Telemetry builder/hook for pipeline components.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Environment and file configuration.
#[path = "../config.rs"]
pub mod config;

/// Claims, context entries, verdicts and results.
#[path = "../model.rs"]
pub mod model;

/// JSON payload extraction from model output.
#[path = "../payload.rs"]
pub mod payload;

/// Generative model clients.
#[path = "../generative.rs"]
pub mod generative;

/// Primary/fallback stage strategy.
#[path = "../fallback.rs"]
pub mod fallback;

/// Claim extraction.
#[path = "../claims.rs"]
pub mod claims;

/// Context retrieval.
#[path = "../retrieval.rs"]
pub mod retrieval;

/// Credibility scoring and verdict classification.
#[path = "../scoring.rs"]
pub mod scoring;

/// Explanation text and source references.
#[path = "../explanation.rs"]
pub mod explanation;

/// Verdict synthesis.
#[path = "../synthesis.rs"]
pub mod synthesis;

/// Analysis runtime entry point.
#[path = "../main.rs"]
pub mod runtime;

pub use claims::ClaimExtractor;
pub use config::{AnalysisConfig, ConfigError, RetrievalSettings};
pub use fallback::{FallbackReason, ResolutionPath, StageOutcome};
pub use generative::{GeminiClient, GenerationError, GenerativeModel, ScriptedModel};
pub use model::{AnalysisResult, Claim, ContextEntry, CredibilityRating, SourceReference, Verdict};
pub use retrieval::{ContextRetriever, RetrievalError, SimulatedRetriever};
pub use runtime::{
    run_analysis, AnalysisError, AnalysisReport, AnalysisRuntime, AnalysisRuntimeBuilder,
};
pub use scoring::{classify, CredibilityScorer, FixedNoise, NoiseSource, UniformNoise};
pub use synthesis::{FallbackSynthesizer, SynthesisError, SynthesisOrchestrator};
pub use telemetry::{AnalysisTelemetry, AnalysisTelemetryBuilder};
