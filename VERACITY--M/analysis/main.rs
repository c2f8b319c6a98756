use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    claims::ClaimExtractor,
    config::{AnalysisConfig, ConfigError},
    fallback::ResolutionPath,
    generative::{GeminiClient, GenerationError, GenerativeModel},
    model::{AnalysisResult, Claim, ContextEntry},
    retrieval::{ContextRetriever, SimulatedRetriever},
    scoring::{CredibilityScorer, NoiseSource, UniformNoise},
    synthesis::{FallbackSynthesizer, SynthesisOrchestrator},
    telemetry::AnalysisTelemetry,
};

const CONTENT_PREVIEW_CHARS: usize = 100;

/// Errors surfaced to callers of the analysis entry points.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Content was empty or whitespace only.
    #[error("content cannot be empty")]
    EmptyContent,
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The generative client could not be constructed.
    #[error("failed to initialise generative client: {0}")]
    Client(#[from] GenerationError),
}

/// Full trace of one analysis: the result plus the intermediate artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Terminal result.
    pub result: AnalysisResult,
    /// Extracted claims.
    pub claims: Vec<Claim>,
    /// Retrieved context.
    pub context: Vec<ContextEntry>,
    /// How the claims were produced.
    pub claim_path: ResolutionPath,
    /// How the verdict was produced.
    pub synthesis_path: ResolutionPath,
    /// Completion time.
    pub analyzed_at: DateTime<Utc>,
}

enum ModelChoice {
    FromConfig,
    Explicit(Arc<dyn GenerativeModel>),
    Disabled,
}

/// Builder wiring the pipeline components.
pub struct AnalysisRuntimeBuilder {
    config: AnalysisConfig,
    model: ModelChoice,
    retriever: Option<Arc<dyn ContextRetriever>>,
    noise: Option<Arc<dyn NoiseSource>>,
    telemetry: Option<AnalysisTelemetry>,
}

impl AnalysisRuntimeBuilder {
    /// Starts from `config`; the model defaults to Gemini when an API key is set.
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            model: ModelChoice::FromConfig,
            retriever: None,
            noise: None,
            telemetry: None,
        }
    }

    /// Uses `model` instead of the configured provider.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.model = ModelChoice::Explicit(model);
        self
    }

    /// Runs fallback-only, even when an API key is configured.
    #[must_use]
    pub fn without_model(mut self) -> Self {
        self.model = ModelChoice::Disabled;
        self
    }

    /// Replaces the simulated retriever.
    #[must_use]
    pub fn retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Replaces the entropy-seeded scoring noise.
    #[must_use]
    pub fn noise(mut self, noise: Arc<dyn NoiseSource>) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: AnalysisTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Result<AnalysisRuntime, AnalysisError> {
        let model: Option<Arc<dyn GenerativeModel>> = match self.model {
            ModelChoice::FromConfig => GeminiClient::from_config(&self.config)?
                .map(|client| Arc::new(client) as Arc<dyn GenerativeModel>),
            ModelChoice::Explicit(model) => Some(model),
            ModelChoice::Disabled => None,
        };
        let settings = self.config.retrieval;
        let retriever = self.retriever.unwrap_or_else(|| {
            Arc::new(SimulatedRetriever::new(settings)) as Arc<dyn ContextRetriever>
        });
        let noise = self
            .noise
            .unwrap_or_else(|| Arc::new(UniformNoise::from_entropy()) as Arc<dyn NoiseSource>);
        let deadline = self.config.timeout;
        let extractor = ClaimExtractor::new(model.clone(), self.config.max_claims, deadline)
            .with_telemetry(self.telemetry.clone());
        let synthesizer = SynthesisOrchestrator::new(
            model.clone(),
            deadline,
            FallbackSynthesizer::new(CredibilityScorer::new(noise)),
        )
        .with_telemetry(self.telemetry.clone());
        Ok(AnalysisRuntime {
            config: self.config,
            model,
            extractor,
            retriever,
            synthesizer,
            telemetry: self.telemetry,
        })
    }
}

/// Runs claim extraction, context retrieval and synthesis for one text.
///
/// The runtime holds no per-request state and can be shared across tasks.
pub struct AnalysisRuntime {
    config: AnalysisConfig,
    model: Option<Arc<dyn GenerativeModel>>,
    extractor: ClaimExtractor,
    retriever: Arc<dyn ContextRetriever>,
    synthesizer: SynthesisOrchestrator,
    telemetry: Option<AnalysisTelemetry>,
}

impl fmt::Debug for AnalysisRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRuntime")
            .field("config", &self.config)
            .field("model", &self.model_name())
            .finish_non_exhaustive()
    }
}

impl AnalysisRuntime {
    /// Runtime with default components for `config`.
    pub fn bootstrap(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::builder(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder(config: AnalysisConfig) -> AnalysisRuntimeBuilder {
        AnalysisRuntimeBuilder::new(config)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Name of the generative model, `None` in fallback-only mode.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|model| model.name())
    }

    /// Analyzes `content`. Only empty content is an error; every downstream
    /// failure is folded into the returned result.
    pub async fn run_analysis(&self, content: &str) -> Result<AnalysisResult, AnalysisError> {
        Ok(self.analyze_detailed(content).await?.result)
    }

    /// Analyzes `content` and keeps the intermediate artifacts.
    pub async fn analyze_detailed(&self, content: &str) -> Result<AnalysisReport, AnalysisError> {
        if content.trim().is_empty() {
            return Err(AnalysisError::EmptyContent);
        }
        let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
        self.log(
            LogLevel::Info,
            "analysis.started",
            json!({ "preview": preview, "model": self.model_name() }),
        );

        let claims = self.extractor.extract(content).await;

        let context = match self.retriever.retrieve(&claims.value).await {
            Ok(context) => context,
            Err(err) => {
                self.log(
                    LogLevel::Warn,
                    "analysis.retrieval.failed",
                    json!({ "error": err.to_string() }),
                );
                Vec::new()
            }
        };
        self.log(
            LogLevel::Info,
            "analysis.retrieval.complete",
            json!({ "entries": context.len() }),
        );

        let synthesis = self
            .synthesizer
            .synthesize(&claims.value, &context, content)
            .await;
        let result = match synthesis.value {
            Ok(result) => result,
            Err(err) => AnalysisResult::failed(err, claims.value.len(), context.len()),
        };
        self.log(
            LogLevel::Info,
            "analysis.complete",
            json!({
                "verdict": result.verdict,
                "score": result.credibility_score,
                "claims": result.claims_analyzed,
                "sources": result.sources_consulted,
            }),
        );

        Ok(AnalysisReport {
            result,
            claims: claims.value,
            context,
            claim_path: claims.path,
            synthesis_path: synthesis.path,
            analyzed_at: Utc::now(),
        })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

/// Analyzes `content` with configuration from the environment.
///
/// Empty content is rejected before any configuration is read.
pub async fn run_analysis(content: &str) -> Result<AnalysisResult, AnalysisError> {
    if content.trim().is_empty() {
        return Err(AnalysisError::EmptyContent);
    }
    let runtime = AnalysisRuntime::bootstrap(AnalysisConfig::from_env()?)?;
    runtime.run_analysis(content).await
}
