use std::{fmt, sync::Arc, time::Duration};

use serde_json::{json, Map, Value};
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    explanation::{format_sources, generate_explanation},
    fallback::{FallbackStage, StageOutcome},
    generative::GenerativeModel,
    model::{AnalysisResult, Claim, ContextEntry, Verdict},
    payload::{parse_json_payload, PayloadError, PayloadShape},
    scoring::{classify, CredibilityScorer, ScoringError, NEUTRAL_SCORE},
    telemetry::AnalysisTelemetry,
};

/// Explanation used when the model omits one.
pub const DEFAULT_MODEL_EXPLANATION: &str = "Analysis completed using AI assessment.";

const EMPTY_CONTEXT_SUMMARY: &str = "No additional context sources available.";

/// Failure of the deterministic synthesis path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// Scoring rejected the context.
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Validated model assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAssessment {
    /// Verdict, `MIXED_ACCURACY` when absent or unrecognized.
    pub verdict: Verdict,
    /// Explanation text without key findings.
    pub explanation: String,
    /// Score clamped into `[0, 1]`.
    pub credibility_score: f64,
    /// Key findings in model order.
    pub key_findings: Vec<String>,
    /// Verdict label the model sent that is outside the enumeration.
    pub unrecognized_verdict: Option<String>,
}

impl ModelAssessment {
    /// Explanation with key findings appended as one sentence.
    #[must_use]
    pub fn full_explanation(&self) -> String {
        if self.key_findings.is_empty() {
            self.explanation.clone()
        } else {
            format!(
                "{} Key findings: {}.",
                self.explanation,
                self.key_findings.join("; ")
            )
        }
    }

    /// Assembles the final result. Sources always come from `context`.
    #[must_use]
    pub fn into_result(self, claims: &[Claim], context: &[ContextEntry]) -> AnalysisResult {
        AnalysisResult {
            verdict: self.verdict,
            explanation: self.full_explanation(),
            sources: format_sources(context),
            credibility_score: self.credibility_score,
            claims_analyzed: claims.len(),
            sources_consulted: context.len(),
        }
    }
}

/// Parses and validates the model's JSON assessment.
///
/// Absent fields take defaults; a `verdict` or `explanation` of the wrong JSON
/// type rejects the whole response.
pub fn parse_model_assessment(raw: &str) -> Result<ModelAssessment, PayloadError> {
    let value = parse_json_payload(raw, PayloadShape::Object)?;
    let Value::Object(fields) = value else {
        return Err(PayloadError::Missing(PayloadShape::Object.label()));
    };

    let (verdict, unrecognized_verdict) = match present(&fields, "verdict") {
        None => (Verdict::MixedAccuracy, None),
        Some(Value::String(label)) => match Verdict::parse_assessment(label) {
            Some(verdict) => (verdict, None),
            None => (Verdict::MixedAccuracy, Some(label.clone())),
        },
        Some(_) => {
            return Err(PayloadError::FieldType {
                field: "verdict",
                expected: "a string",
            })
        }
    };

    let explanation = match present(&fields, "explanation") {
        None => DEFAULT_MODEL_EXPLANATION.to_string(),
        Some(Value::String(text)) if text.trim().is_empty() => {
            DEFAULT_MODEL_EXPLANATION.to_string()
        }
        Some(Value::String(text)) => text.trim().to_string(),
        Some(_) => {
            return Err(PayloadError::FieldType {
                field: "explanation",
                expected: "a string",
            })
        }
    };

    Ok(ModelAssessment {
        verdict,
        explanation,
        credibility_score: coerce_score(present(&fields, "credibility_score")),
        key_findings: key_findings(present(&fields, "key_findings")),
        unrecognized_verdict,
    })
}

fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !value.is_null())
}

fn coerce_score(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(Value::Bool(flag)) => Some(f64::from(u8::from(*flag))),
        _ => None,
    };
    parsed
        .filter(|score| score.is_finite())
        .unwrap_or(NEUTRAL_SCORE)
        .clamp(0.0, 1.0)
}

fn key_findings(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|text| !text.is_empty())
        .collect()
}

/// One line per entry with title, credibility and relevance, followed by an
/// indented snippet line.
#[must_use]
pub fn summarize_context(context: &[ContextEntry]) -> String {
    if context.is_empty() {
        return EMPTY_CONTEXT_SUMMARY.to_string();
    }
    context
        .iter()
        .enumerate()
        .flat_map(|(index, entry)| {
            [
                format!(
                    "Source {}: {} (Credibility: {}, Relevance: {:.2})",
                    index + 1,
                    entry.source_title,
                    entry.credibility,
                    entry.similarity
                ),
                format!("  Content: {}", entry.snippet),
            ]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn synthesis_prompt(original: &str, claims: &[Claim], context: &[ContextEntry]) -> String {
    let claims_json = serde_json::to_string_pretty(claims).unwrap_or_else(|_| "[]".to_string());
    let context_summary = summarize_context(context);
    format!(
        r#"You are an expert fact-checker analyzing content for misinformation.

Original Content:
"{original}"

Identified Claims:
{claims_json}

Available Context:
{context_summary}

Please analyze this content and provide a comprehensive fact-check assessment.

Respond with a JSON object containing:
{{
    "verdict": "LIKELY_ACCURATE|MOSTLY_ACCURATE|MIXED_ACCURACY|LIKELY_INACCURATE|HIGHLY_QUESTIONABLE",
    "explanation": "Detailed explanation of your analysis and reasoning",
    "credibility_score": 0.0-1.0,
    "key_findings": ["Finding 1", "Finding 2", "Finding 3"]
}}

Verdict Guidelines:
- LIKELY_ACCURATE: Content is well-supported by reliable sources
- MOSTLY_ACCURATE: Content is generally accurate with minor issues
- MIXED_ACCURACY: Content contains both accurate and questionable elements
- LIKELY_INACCURATE: Content contains significant inaccuracies
- HIGHLY_QUESTIONABLE: Content is highly questionable or misleading

Consider:
- Source credibility and reliability
- Evidence quality and consistency
- Potential bias or misleading framing
- Scientific consensus where applicable
- Logical consistency of claims"#
    )
}

/// Deterministic path: scorer, classifier, explanation generator and source
/// formatter.
#[derive(Debug, Clone, Default)]
pub struct FallbackSynthesizer {
    scorer: CredibilityScorer,
}

impl FallbackSynthesizer {
    /// Creates a synthesizer around `scorer`.
    #[must_use]
    pub const fn new(scorer: CredibilityScorer) -> Self {
        Self { scorer }
    }

    /// Produces a result from evidence alone.
    pub fn synthesize(
        &self,
        claims: &[Claim],
        context: &[ContextEntry],
    ) -> Result<AnalysisResult, SynthesisError> {
        let score = self.scorer.score(context)?;
        let verdict = classify(score);
        Ok(AnalysisResult {
            verdict,
            explanation: generate_explanation(claims, context, score, verdict),
            sources: format_sources(context),
            credibility_score: score,
            claims_analyzed: claims.len(),
            sources_consulted: context.len(),
        })
    }
}

/// Asks the model for a verdict and falls back to [`FallbackSynthesizer`]
/// whenever the model is absent, slow, failing, or unparsable.
#[derive(Clone)]
pub struct SynthesisOrchestrator {
    model: Option<Arc<dyn GenerativeModel>>,
    deadline: Duration,
    fallback: FallbackSynthesizer,
    telemetry: Option<AnalysisTelemetry>,
}

impl fmt::Debug for SynthesisOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisOrchestrator")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl SynthesisOrchestrator {
    /// Creates an orchestrator; `model = None` means deterministic only.
    #[must_use]
    pub fn new(
        model: Option<Arc<dyn GenerativeModel>>,
        deadline: Duration,
        fallback: FallbackSynthesizer,
    ) -> Self {
        Self {
            model,
            deadline,
            fallback,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<AnalysisTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Synthesizes a verdict. The inner `Err` is only produced by the
    /// deterministic path.
    pub async fn synthesize(
        &self,
        claims: &[Claim],
        context: &[ContextEntry],
        original: &str,
    ) -> StageOutcome<Result<AnalysisResult, SynthesisError>> {
        let telemetry = self.telemetry.as_ref();
        let outcome = FallbackStage::new("synthesis", self.model.as_deref(), self.deadline)
            .telemetry(telemetry)
            .run(
                || synthesis_prompt(original, claims, context),
                |raw| {
                    let assessment = parse_model_assessment(raw)?;
                    if let (Some(label), Some(tel)) =
                        (&assessment.unrecognized_verdict, telemetry)
                    {
                        let _ = tel.log(
                            LogLevel::Warn,
                            "analysis.synthesis.unknown_verdict",
                            json!({ "verdict": label, "coerced_to": Verdict::MixedAccuracy }),
                        );
                    }
                    Ok(Ok(assessment.into_result(claims, context)))
                },
                || async { self.fallback.synthesize(claims, context) },
            )
            .await;
        if let Some(tel) = telemetry {
            let _ = match &outcome.value {
                Ok(result) => tel.log(
                    LogLevel::Info,
                    "analysis.synthesis.complete",
                    json!({
                        "verdict": result.verdict,
                        "score": result.credibility_score,
                        "fallback": outcome.used_fallback(),
                    }),
                ),
                Err(err) => tel.log(
                    LogLevel::Error,
                    "analysis.synthesis.failed",
                    json!({ "error": err.to_string() }),
                ),
            };
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fallback::{FallbackReason, ResolutionPath},
        generative::ScriptedModel,
        model::CredibilityRating,
        scoring::{FixedNoise, UniformNoise},
    };

    fn claims() -> Vec<Claim> {
        vec![
            Claim::parse("The Great Wall is visible from space").unwrap(),
            Claim::parse("It was built over many centuries").unwrap(),
        ]
    }

    fn context() -> Vec<ContextEntry> {
        vec![
            ContextEntry {
                claim_index: 0,
                similarity: 0.85,
                source_title: "Fact Check Source 1".into(),
                source_url: "https://factcheck.example.com/article-1".into(),
                snippet: "Relevant information about: The Great Wall...".into(),
                credibility: CredibilityRating::High,
            },
            ContextEntry {
                claim_index: 1,
                similarity: 0.75,
                source_title: "Fact Check Source 2".into(),
                source_url: "https://factcheck.example.com/article-2".into(),
                snippet: "Relevant information about: It was built...".into(),
                credibility: CredibilityRating::High,
            },
        ]
    }

    fn quiet() -> FallbackSynthesizer {
        FallbackSynthesizer::new(CredibilityScorer::new(Arc::new(FixedNoise(0.0))))
    }

    fn orchestrator(model: Option<Arc<dyn GenerativeModel>>) -> SynthesisOrchestrator {
        SynthesisOrchestrator::new(model, Duration::from_secs(1), quiet())
    }

    #[test]
    fn assessment_defaults_for_missing_fields() {
        let assessment = parse_model_assessment("{}").unwrap();
        assert_eq!(assessment.verdict, Verdict::MixedAccuracy);
        assert_eq!(assessment.explanation, DEFAULT_MODEL_EXPLANATION);
        assert!((assessment.credibility_score - 0.5).abs() < f64::EPSILON);
        assert!(assessment.key_findings.is_empty());
    }

    #[test]
    fn assessment_score_is_coerced_and_clamped() {
        let high = parse_model_assessment(r#"{"credibility_score": 1.7}"#).unwrap();
        assert!((high.credibility_score - 1.0).abs() < f64::EPSILON);
        let text = parse_model_assessment(r#"{"credibility_score": " 0.35 "}"#).unwrap();
        assert!((text.credibility_score - 0.35).abs() < f64::EPSILON);
        let junk = parse_model_assessment(r#"{"credibility_score": "very high"}"#).unwrap();
        assert!((junk.credibility_score - 0.5).abs() < f64::EPSILON);
        let negative = parse_model_assessment(r#"{"credibility_score": -3}"#).unwrap();
        assert!(negative.credibility_score.abs() < f64::EPSILON);
    }

    #[test]
    fn boolean_score_maps_to_bounds() {
        let yes = parse_model_assessment(r#"{"credibility_score": true}"#).unwrap();
        assert!((yes.credibility_score - 1.0).abs() < f64::EPSILON);
        let no = parse_model_assessment(r#"{"credibility_score": false}"#).unwrap();
        assert!(no.credibility_score.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_verdict_is_coerced() {
        let assessment = parse_model_assessment(r#"{"verdict": "TRUE"}"#).unwrap();
        assert_eq!(assessment.verdict, Verdict::MixedAccuracy);
        assert_eq!(assessment.unrecognized_verdict.as_deref(), Some("TRUE"));
        let lower = parse_model_assessment(r#"{"verdict": "likely_inaccurate"}"#).unwrap();
        assert_eq!(lower.verdict, Verdict::LikelyInaccurate);
    }

    #[test]
    fn wrongly_typed_fields_are_rejected() {
        assert_eq!(
            parse_model_assessment(r#"{"verdict": 4}"#),
            Err(PayloadError::FieldType {
                field: "verdict",
                expected: "a string"
            })
        );
        assert!(parse_model_assessment(r#"{"explanation": ["a"]}"#).is_err());
    }

    #[test]
    fn key_findings_are_appended() {
        let assessment = parse_model_assessment(
            r#"{"explanation": "Mostly fine.", "key_findings": ["First point", 2, null, ""]}"#,
        )
        .unwrap();
        assert_eq!(
            assessment.full_explanation(),
            "Mostly fine. Key findings: First point; 2."
        );
    }

    #[test]
    fn context_summary_lists_every_entry() {
        let summary = summarize_context(&context());
        let lines: Vec<_> = summary.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Source 1: Fact Check Source 1 (Credibility: high, Relevance: 0.85)"
        );
        assert!(lines[1].starts_with("  Content: "));
        assert_eq!(summarize_context(&[]), EMPTY_CONTEXT_SUMMARY);
    }

    #[test]
    fn fallback_is_idempotent_with_fixed_seed() {
        let first =
            FallbackSynthesizer::new(CredibilityScorer::new(Arc::new(UniformNoise::seeded(42))));
        let second =
            FallbackSynthesizer::new(CredibilityScorer::new(Arc::new(UniformNoise::seeded(42))));
        assert_eq!(
            first.synthesize(&claims(), &context()).unwrap(),
            second.synthesize(&claims(), &context()).unwrap()
        );
    }

    #[test]
    fn fallback_rejects_non_finite_similarity() {
        let mut context = context();
        context[1].similarity = f64::INFINITY;
        assert!(matches!(
            quiet().synthesize(&claims(), &context),
            Err(SynthesisError::Scoring(_))
        ));
    }

    #[tokio::test]
    async fn model_assessment_is_used_with_context_sources() {
        let model = Arc::new(ScriptedModel::new().reply(
            "```json\n{\"verdict\": \"HIGHLY_QUESTIONABLE\", \"explanation\": \"Myth.\", \
             \"credibility_score\": 0.1, \
             \"key_findings\": [\"Not visible to the naked eye\"]}\n```",
        ));
        let outcome = orchestrator(Some(model.clone()))
            .synthesize(&claims(), &context(), "The Great Wall is visible from space.")
            .await;
        assert_eq!(outcome.path, ResolutionPath::Primary);
        let result = outcome.value.unwrap();
        assert_eq!(result.verdict, Verdict::HighlyQuestionable);
        assert_eq!(
            result.explanation,
            "Myth. Key findings: Not visible to the naked eye."
        );
        assert_eq!(result.sources, format_sources(&context()));
        assert_eq!(result.claims_analyzed, 2);
        assert_eq!(result.sources_consulted, 2);
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("\"The Great Wall is visible from space\""));
        assert!(prompt.contains("Source 2: Fact Check Source 2"));
    }

    #[tokio::test]
    async fn unparsable_response_matches_unconfigured_run() {
        let model = Arc::new(ScriptedModel::new().reply("not valid json"));
        let degraded = orchestrator(Some(model))
            .synthesize(&claims(), &context(), "content")
            .await;
        assert!(matches!(
            degraded.path,
            ResolutionPath::Fallback(FallbackReason::Invalid(_))
        ));
        let unconfigured = orchestrator(None)
            .synthesize(&claims(), &context(), "content")
            .await;
        assert_eq!(
            unconfigured.path,
            ResolutionPath::Fallback(FallbackReason::Unconfigured)
        );
        assert_eq!(degraded.value.unwrap(), unconfigured.value.unwrap());
    }

    #[tokio::test]
    async fn model_failure_degrades_to_fallback() {
        let model = Arc::new(ScriptedModel::new().failure("quota exceeded"));
        let outcome = orchestrator(Some(model))
            .synthesize(&claims(), &[], "content")
            .await;
        assert!(outcome.used_fallback());
        let result = outcome.value.unwrap();
        assert_eq!(result.verdict, Verdict::MixedAccuracy);
        assert!((result.credibility_score - 0.5).abs() < f64::EPSILON);
        assert!(result.sources.is_empty());
    }
}
