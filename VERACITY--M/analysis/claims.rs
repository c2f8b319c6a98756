use std::{fmt, sync::Arc, time::Duration};

use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    fallback::{FallbackStage, StageOutcome},
    generative::GenerativeModel,
    model::Claim,
    payload::{parse_json_payload, PayloadError, PayloadShape},
    telemetry::AnalysisTelemetry,
};

/// Words that mark a sentence as a factual assertion.
pub const CLAIM_INDICATORS: [&str; 11] = [
    "is", "are", "was", "were", "will", "can", "cannot", "shows", "proves", "causes", "leads to",
];

/// Sentences at or below this many characters are never claims.
pub const MIN_SENTENCE_CHARS: usize = 20;

/// True when `sentence` contains a claim indicator anywhere, ignoring case.
/// Matches inside longer words too, so "history" counts through "is".
#[must_use]
pub fn has_claim_indicator(sentence: &str) -> bool {
    let lowered = sentence.to_lowercase();
    CLAIM_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
}

/// Rule-based extraction: period-separated sentences longer than
/// [`MIN_SENTENCE_CHARS`] that contain a claim indicator.
#[must_use]
pub fn extract_fallback_claims(content: &str, max_claims: usize) -> Vec<Claim> {
    content
        .split('.')
        .map(str::trim)
        .filter(|sentence| sentence.chars().count() > MIN_SENTENCE_CHARS)
        .filter(|sentence| has_claim_indicator(sentence))
        .filter_map(Claim::parse)
        .take(max_claims)
        .collect()
}

/// Parses a model response holding a JSON array of claim strings. Non-string
/// elements and fragments are dropped.
pub fn parse_claim_list(raw: &str, max_claims: usize) -> Result<Vec<Claim>, PayloadError> {
    let value = parse_json_payload(raw, PayloadShape::Array)?;
    let Value::Array(items) = value else {
        return Err(PayloadError::Missing(PayloadShape::Array.label()));
    };
    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(Claim::parse)
        .take(max_claims)
        .collect())
}

fn claim_prompt(content: &str, max_claims: usize) -> String {
    format!(
        r#"Analyze the following text and extract the main factual claims that can be fact-checked.
Focus on specific, verifiable statements rather than opinions or subjective statements.

Text to analyze:
"{content}"

Respond with a JSON array containing up to {max_claims} of the most important factual claims.
Each claim must be a clear, standalone statement.

Example format:
["Claim 1", "Claim 2", "Claim 3"]

If no factual claims are found, return an empty array: []"#
    )
}

/// Turns source text into an ordered, capped list of claims. Never fails:
/// every model problem degrades to [`extract_fallback_claims`].
#[derive(Clone)]
pub struct ClaimExtractor {
    model: Option<Arc<dyn GenerativeModel>>,
    max_claims: usize,
    deadline: Duration,
    telemetry: Option<AnalysisTelemetry>,
}

impl fmt::Debug for ClaimExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimExtractor")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("max_claims", &self.max_claims)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl ClaimExtractor {
    /// Creates an extractor; `model = None` means rule-based only.
    #[must_use]
    pub fn new(
        model: Option<Arc<dyn GenerativeModel>>,
        max_claims: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            model,
            max_claims: max_claims.max(1),
            deadline,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<AnalysisTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Extracts claims from `content`.
    pub async fn extract(&self, content: &str) -> StageOutcome<Vec<Claim>> {
        let max_claims = self.max_claims;
        let outcome = FallbackStage::new("claims", self.model.as_deref(), self.deadline)
            .telemetry(self.telemetry.as_ref())
            .run(
                || claim_prompt(content, max_claims),
                |raw| parse_claim_list(raw, max_claims),
                || async move { extract_fallback_claims(content, max_claims) },
            )
            .await;
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "analysis.claims.extracted",
                json!({ "count": outcome.value.len(), "fallback": outcome.used_fallback() }),
            );
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
    };

    fn texts(claims: &[Claim]) -> Vec<&str> {
        claims.iter().map(Claim::as_str).collect()
    }

    #[test]
    fn fallback_keeps_long_sentences_with_indicators() {
        let content = "Water is boiling at 100 degrees Celsius. The sky is pretty. \
                       Smoking causes lung cancer in many patients. Nice weather today, honestly";
        let claims = extract_fallback_claims(content, 5);
        assert_eq!(
            texts(&claims),
            vec![
                "Water is boiling at 100 degrees Celsius",
                "Smoking causes lung cancer in many patients"
            ]
        );
    }

    #[test]
    fn fallback_requires_a_documented_indicator_word() {
        // "boils" is not an indicator and "The sky is pretty" is only 17 characters.
        let claims = extract_fallback_claims("Water boils at 100 degrees. The sky is pretty.", 5);
        assert!(claims.is_empty());
    }

    #[test]
    fn indicators_match_inside_words_ignoring_case() {
        assert!(has_claim_indicator("This history of Paris"));
        assert!(has_claim_indicator("Poverty LEADS TO crime"));
        assert!(!has_claim_indicator("Poverty leads  to crime"));
        assert!(!has_claim_indicator("Water boils at 100 degrees"));
    }

    #[test]
    fn fallback_keeps_sentences_whose_words_embed_an_indicator() {
        let content = "This research suggests a cure for cancer exists. \
                       Experts discovered history books today.";
        let claims = extract_fallback_claims(content, 5);
        assert_eq!(
            texts(&claims),
            vec![
                "This research suggests a cure for cancer exists",
                "Experts discovered history books today"
            ]
        );
    }

    #[test]
    fn fallback_respects_claim_cap() {
        let content = "The first statement is quite long enough. \
                       The second statement is quite long enough. \
                       The third statement is quite long enough.";
        assert_eq!(extract_fallback_claims(content, 2).len(), 2);
    }

    #[test]
    fn claim_list_filters_fragments_and_non_strings() {
        let raw = "```json\n[\"Short one\", 42, \
                   \"  Vaccines cause autism in children.  \", null]\n```";
        let claims = parse_claim_list(raw, 5).unwrap();
        assert_eq!(texts(&claims), vec!["Vaccines cause autism in children."]);
    }

    #[test]
    fn claim_list_rejects_objects() {
        assert!(parse_claim_list("{\"claims\": [\"x\"]}", 5).is_err());
    }

    #[tokio::test]
    async fn extractor_uses_model_claims() {
        let model = Arc::new(ScriptedModel::new().reply(
            "[\"The Earth is flat.\", \"NASA is hiding the truth.\", \"Scientists proved it.\"]",
        ));
        let extractor = ClaimExtractor::new(Some(model.clone()), 2, Duration::from_secs(1));
        let outcome = extractor.extract("The Earth is flat and NASA is hiding it.").await;
        assert_eq!(outcome.path, ResolutionPath::Primary);
        assert_eq!(
            texts(&outcome.value),
            vec!["The Earth is flat.", "NASA is hiding the truth."]
        );
        let prompts = model.prompts();
        assert!(prompts[0].contains("up to 2"));
        assert!(prompts[0].contains("The Earth is flat and NASA is hiding it."));
    }

    #[tokio::test]
    async fn extractor_falls_back_on_unusable_output() {
        let model = Arc::new(ScriptedModel::new().reply("I could not find any claims, sorry."));
        let extractor = ClaimExtractor::new(Some(model), 5, Duration::from_secs(1));
        let outcome = extractor
            .extract("Climate change is primarily caused by human activities.")
            .await;
        assert!(outcome.used_fallback());
        assert_eq!(
            texts(&outcome.value),
            vec!["Climate change is primarily caused by human activities"]
        );
    }

    #[tokio::test]
    async fn extractor_without_model_is_rule_based() {
        let extractor = ClaimExtractor::new(None, 5, Duration::from_secs(1));
        let outcome = extractor
            .extract("Drinking bleach can cure COVID-19 and other viral infections.")
            .await;
        assert_eq!(
            outcome.path,
            ResolutionPath::Fallback(FallbackReason::Unconfigured)
        );
        assert_eq!(outcome.value.len(), 1);
    }
}
