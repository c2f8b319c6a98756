use std::{fmt, future::Future, time::Duration};

use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use tokio::time::timeout;

use crate::{
    generative::{GenerationError, GenerativeModel},
    payload::PayloadError,
    telemetry::AnalysisTelemetry,
};

/// Why a stage abandoned its model-driven path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No generative model was configured.
    Unconfigured,
    /// The model missed its deadline.
    Timeout,
    /// The model call failed.
    Generation(String),
    /// The model answered with unusable output.
    Invalid(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("generative model not configured"),
            Self::Timeout => f.write_str("generative model timed out"),
            Self::Generation(detail) => write!(f, "generative call failed: {detail}"),
            Self::Invalid(detail) => write!(f, "unusable model output: {detail}"),
        }
    }
}

/// Which path produced a stage's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// The model answered with usable output.
    Primary,
    /// The deterministic path ran instead.
    Fallback(FallbackReason),
}

/// Value produced by a stage plus the path that produced it.
#[derive(Debug, Clone)]
pub struct StageOutcome<T> {
    /// Stage output.
    pub value: T,
    /// Path taken.
    pub path: ResolutionPath,
}

impl<T> StageOutcome<T> {
    /// True when the deterministic path produced the value.
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        matches!(self.path, ResolutionPath::Fallback(_))
    }
}

/// Primary (generative) / secondary (deterministic) strategy shared by the
/// claim extractor and the synthesis orchestrator.
///
/// The primary path is skipped when no model is configured; otherwise the
/// model is called under a deadline and its text handed to a validator. A
/// missed deadline, a failed call, or a rejected response all run the
/// fallback instead. Nothing from a failed primary attempt is kept.
pub struct FallbackStage<'a> {
    stage: &'static str,
    model: Option<&'a dyn GenerativeModel>,
    deadline: Duration,
    telemetry: Option<&'a AnalysisTelemetry>,
}

impl<'a> FallbackStage<'a> {
    /// Creates a stage named `stage` (used as the log prefix).
    #[must_use]
    pub fn new(
        stage: &'static str,
        model: Option<&'a dyn GenerativeModel>,
        deadline: Duration,
    ) -> Self {
        Self {
            stage,
            model,
            deadline,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub const fn telemetry(mut self, telemetry: Option<&'a AnalysisTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Runs the stage. `prompt` is only built when a model is present.
    pub async fn run<T, P, V, F, Fut>(&self, prompt: P, validate: V, fallback: F) -> StageOutcome<T>
    where
        P: FnOnce() -> String,
        V: FnOnce(&str) -> Result<T, PayloadError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let reason = match self.model {
            None => FallbackReason::Unconfigured,
            Some(model) => match self.call(model, prompt()).await {
                Ok(raw) => match validate(&raw) {
                    Ok(value) => {
                        self.log(
                            LogLevel::Info,
                            "primary",
                            json!({ "model": model.name(), "response_chars": raw.chars().count() }),
                        );
                        return StageOutcome {
                            value,
                            path: ResolutionPath::Primary,
                        };
                    }
                    Err(err) => FallbackReason::Invalid(err.to_string()),
                },
                Err(reason) => reason,
            },
        };
        let level = if reason == FallbackReason::Unconfigured {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        self.log(level, "fallback", json!({ "reason": reason.to_string() }));
        StageOutcome {
            value: fallback().await,
            path: ResolutionPath::Fallback(reason),
        }
    }

    async fn call(
        &self,
        model: &dyn GenerativeModel,
        prompt: String,
    ) -> Result<String, FallbackReason> {
        // Dropping the timed-out future aborts the in-flight request.
        match timeout(self.deadline, model.generate(&prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(GenerationError::Timeout(_))) | Err(_) => Err(FallbackReason::Timeout),
            Ok(Err(err)) => Err(FallbackReason::Generation(err.to_string())),
        }
    }

    fn log(&self, level: LogLevel, suffix: &str, metadata: serde_json::Value) {
        if let Some(tel) = self.telemetry {
            let _ = tel.log(level, &format!("analysis.{}.{suffix}", self.stage), metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::ScriptedModel;

    fn parse_number(raw: &str) -> Result<u32, PayloadError> {
        raw.trim()
            .parse()
            .map_err(|_| PayloadError::Malformed(raw.to_string()))
    }

    #[tokio::test]
    async fn unconfigured_stage_goes_straight_to_fallback() {
        let stage = FallbackStage::new("test", None, Duration::from_secs(1));
        let outcome = stage
            .run(
                || unreachable!("prompt built without a model"),
                parse_number,
                || async { 7 },
            )
            .await;
        assert_eq!(outcome.value, 7);
        assert_eq!(
            outcome.path,
            ResolutionPath::Fallback(FallbackReason::Unconfigured)
        );
    }

    #[tokio::test]
    async fn valid_primary_output_wins() {
        let model = ScriptedModel::new().reply(" 42 ");
        let stage = FallbackStage::new("test", Some(&model), Duration::from_secs(1));
        let outcome = stage
            .run(|| "prompt".into(), parse_number, || async { 0 })
            .await;
        assert_eq!(outcome.value, 42);
        assert!(!outcome.used_fallback());
        assert_eq!(model.prompts(), vec!["prompt"]);
    }

    #[tokio::test]
    async fn rejected_output_falls_back() {
        let model = ScriptedModel::new().reply("forty-two");
        let stage = FallbackStage::new("test", Some(&model), Duration::from_secs(1));
        let outcome = stage
            .run(|| "prompt".into(), parse_number, || async { 1 })
            .await;
        assert_eq!(outcome.value, 1);
        assert!(matches!(
            outcome.path,
            ResolutionPath::Fallback(FallbackReason::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn failed_call_falls_back() {
        let model = ScriptedModel::new().failure("connection reset");
        let stage = FallbackStage::new("test", Some(&model), Duration::from_secs(1));
        let outcome = stage
            .run(|| "prompt".into(), parse_number, || async { 2 })
            .await;
        assert_eq!(outcome.value, 2);
        match outcome.path {
            ResolutionPath::Fallback(FallbackReason::Generation(detail)) => {
                assert!(detail.contains("connection reset"));
            }
            other => panic!("unexpected path {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = ScriptedModel::new()
            .reply("5")
            .with_latency(Duration::from_secs(5));
        let stage = FallbackStage::new("test", Some(&model), Duration::from_millis(20));
        let outcome = stage
            .run(|| "prompt".into(), parse_number, || async { 3 })
            .await;
        assert_eq!(outcome.value, 3);
        assert_eq!(outcome.path, ResolutionPath::Fallback(FallbackReason::Timeout));
        assert_eq!(model.remaining(), 1);
    }
}
