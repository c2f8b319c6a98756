use std::fmt;

use serde::{Deserialize, Serialize};

/// Claims at or below this many characters (after trimming) are fragments.
pub const MIN_CLAIM_CHARS: usize = 10;

/// A verifiable factual assertion extracted from the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Claim(String);

impl Claim {
    /// Trims the candidate and accepts it only when it is longer than
    /// [`MIN_CLAIM_CHARS`] characters.
    #[must_use]
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim();
        (trimmed.chars().count() > MIN_CLAIM_CHARS).then(|| Self(trimmed.to_string()))
    }

    /// Claim text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `max_chars` characters of the claim.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        self.0.chars().take(max_chars).collect()
    }
}

impl AsRef<str> for Claim {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credibility tier attached to a retrieved source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityRating {
    /// Established, reliable outlet.
    High,
    /// Generally reliable outlet.
    Medium,
    /// Weak or partisan outlet.
    Low,
    /// Rating was not provided.
    Unknown,
}

impl CredibilityRating {
    /// Weight multiplier used by the credibility scorer.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.7,
            Self::Low => 0.3,
            Self::Unknown => 0.5,
        }
    }

    /// Lower-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CredibilityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Evidence retrieved for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Position of the source claim in the extracted claim list.
    pub claim_index: usize,
    /// Similarity between claim and evidence, in `[0, 1]`.
    pub similarity: f64,
    /// Title of the source.
    pub source_title: String,
    /// URL of the source.
    pub source_url: String,
    /// Short excerpt.
    pub snippet: String,
    /// Credibility tier of the source.
    pub credibility: CredibilityRating,
}

/// Overall credibility outcome of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Well supported by reliable sources.
    LikelyAccurate,
    /// Generally accurate with minor issues.
    MostlyAccurate,
    /// Both accurate and questionable elements.
    MixedAccuracy,
    /// Significant inaccuracies.
    LikelyInaccurate,
    /// Highly questionable or misleading.
    HighlyQuestionable,
    /// The pipeline itself failed.
    Error,
}

impl Verdict {
    /// The five assessment verdicts, most to least credible.
    pub const ASSESSMENTS: [Self; 5] = [
        Self::LikelyAccurate,
        Self::MostlyAccurate,
        Self::MixedAccuracy,
        Self::LikelyInaccurate,
        Self::HighlyQuestionable,
    ];

    /// Wire label, e.g. `MIXED_ACCURACY`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LikelyAccurate => "LIKELY_ACCURATE",
            Self::MostlyAccurate => "MOSTLY_ACCURATE",
            Self::MixedAccuracy => "MIXED_ACCURACY",
            Self::LikelyInaccurate => "LIKELY_INACCURATE",
            Self::HighlyQuestionable => "HIGHLY_QUESTIONABLE",
            Self::Error => "ERROR",
        }
    }

    /// Parses one of the five assessment labels. Case, surrounding
    /// whitespace, and space/hyphen separators are tolerated; `ERROR` is not
    /// accepted since a model cannot report a pipeline failure.
    #[must_use]
    pub fn parse_assessment(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ASSESSMENTS
            .into_iter()
            .find(|verdict| verdict.as_str() == normalized)
    }

    /// Canned sentence opening a deterministic explanation.
    #[must_use]
    pub const fn summary_sentence(self) -> &'static str {
        match self {
            Self::LikelyAccurate => {
                "The content appears to be largely accurate based on available sources."
            }
            Self::MostlyAccurate => "The content is generally accurate with some minor concerns.",
            Self::MixedAccuracy => "The content contains both accurate and questionable elements.",
            Self::LikelyInaccurate => "The content appears to contain significant inaccuracies.",
            Self::HighlyQuestionable => {
                "The content is highly questionable and likely contains misinformation."
            }
            Self::Error => "Unable to determine accuracy.",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display projection of a context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// Source title.
    pub title: String,
    /// Source URL.
    pub url: String,
    /// Credibility tier.
    pub credibility: CredibilityRating,
    /// Similarity formatted to two decimals.
    pub relevance: String,
}

/// Terminal output of one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Overall verdict.
    pub verdict: Verdict,
    /// Human-readable explanation.
    pub explanation: String,
    /// Sources sorted by relevance, most relevant first.
    pub sources: Vec<SourceReference>,
    /// Credibility score in `[0, 1]`.
    pub credibility_score: f64,
    /// Number of claims examined.
    pub claims_analyzed: usize,
    /// Number of context entries consulted.
    pub sources_consulted: usize,
}

impl AnalysisResult {
    /// Terminal `ERROR` result used when even the deterministic pipeline fails.
    #[must_use]
    pub fn failed(
        reason: impl fmt::Display,
        claims_analyzed: usize,
        sources_consulted: usize,
    ) -> Self {
        Self {
            verdict: Verdict::Error,
            explanation: format!("Analysis failed due to processing error: {reason}"),
            sources: Vec::new(),
            credibility_score: 0.0,
            claims_analyzed,
            sources_consulted,
        }
    }
}
