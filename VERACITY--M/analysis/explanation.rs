use indexmap::IndexMap;

use crate::model::{Claim, ContextEntry, CredibilityRating, SourceReference, Verdict};

const UNKNOWN_SOURCE_TITLE: &str = "Unknown Source";

/// Confidence label for a score: extreme scores are stated with high
/// confidence, scores near the middle with moderate confidence.
#[must_use]
pub fn confidence_label(score: f64) -> &'static str {
    if score > 0.7 || score < 0.3 {
        "high"
    } else {
        "moderate"
    }
}

/// Deterministic explanation for a fallback verdict.
#[must_use]
pub fn generate_explanation(
    claims: &[Claim],
    context: &[ContextEntry],
    score: f64,
    verdict: Verdict,
) -> String {
    let mut parts = vec![verdict.summary_sentence().to_string()];
    if !claims.is_empty() {
        parts.push(format!(
            "Analysis examined {} key claims from the content.",
            claims.len()
        ));
    }
    if !context.is_empty() {
        let high = context
            .iter()
            .filter(|entry| entry.credibility == CredibilityRating::High)
            .count();
        parts.push(format!(
            "Consulted {} sources, {high} of which are high-credibility.",
            context.len()
        ));
    }
    parts.push(format!(
        "Confidence level: {} (score: {score:.2}).",
        confidence_label(score)
    ));
    parts.join(" ")
}

/// Projects context into display references: one per distinct URL (the most
/// similar entry wins), sorted by similarity, most relevant first. Ties keep
/// their retrieval order.
#[must_use]
pub fn format_sources(context: &[ContextEntry]) -> Vec<SourceReference> {
    let mut distinct: IndexMap<&str, &ContextEntry> = IndexMap::with_capacity(context.len());
    for entry in context {
        let key = if entry.source_url.is_empty() {
            entry.source_title.as_str()
        } else {
            entry.source_url.as_str()
        };
        distinct
            .entry(key)
            .and_modify(|existing| {
                if entry.similarity > existing.similarity {
                    *existing = entry;
                }
            })
            .or_insert(entry);
    }
    let mut ranked: Vec<&ContextEntry> = distinct.into_values().collect();
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.into_iter().map(source_reference).collect()
}

fn source_reference(entry: &ContextEntry) -> SourceReference {
    let title = if entry.source_title.trim().is_empty() {
        UNKNOWN_SOURCE_TITLE.to_string()
    } else {
        entry.source_title.clone()
    };
    SourceReference {
        title,
        url: entry.source_url.clone(),
        credibility: entry.credibility,
        relevance: format!("{:.2}", entry.similarity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, similarity: f64, credibility: CredibilityRating) -> ContextEntry {
        ContextEntry {
            claim_index: 0,
            similarity,
            source_title: format!("Title for {url}"),
            source_url: url.to_string(),
            snippet: String::new(),
            credibility,
        }
    }

    fn claims(count: usize) -> Vec<Claim> {
        (0..count)
            .map(|i| Claim::parse(&format!("Statement {i} is a checkable claim")).unwrap())
            .collect()
    }

    #[test]
    fn explanation_sentences_follow_fixed_order() {
        let context = [
            entry("https://a.test", 0.85, CredibilityRating::High),
            entry("https://b.test", 0.75, CredibilityRating::High),
            entry("https://c.test", 0.65, CredibilityRating::Medium),
        ];
        let text = generate_explanation(&claims(3), &context, 0.74, Verdict::MostlyAccurate);
        assert_eq!(
            text,
            "The content is generally accurate with some minor concerns. \
             Analysis examined 3 key claims from the content. \
             Consulted 3 sources, 2 of which are high-credibility. \
             Confidence level: high (score: 0.74)."
        );
    }

    #[test]
    fn explanation_without_evidence_only_states_confidence() {
        let text = generate_explanation(&[], &[], 0.5, Verdict::MixedAccuracy);
        assert_eq!(
            text,
            "The content contains both accurate and questionable elements. \
             Confidence level: moderate (score: 0.50)."
        );
    }

    #[test]
    fn confidence_thresholds_are_exclusive() {
        assert_eq!(confidence_label(0.7), "moderate");
        assert_eq!(confidence_label(0.3), "moderate");
        assert_eq!(confidence_label(0.71), "high");
        assert_eq!(confidence_label(0.29), "high");
    }

    #[test]
    fn sources_sorted_by_relevance() {
        let context = [
            entry("https://low.test", 0.3, CredibilityRating::Medium),
            entry("https://high.test", 0.9, CredibilityRating::High),
            entry("https://mid.test", 0.7, CredibilityRating::High),
        ];
        let relevance: Vec<_> = format_sources(&context)
            .into_iter()
            .map(|source| source.relevance)
            .collect();
        assert_eq!(relevance, vec!["0.90", "0.70", "0.30"]);
    }

    #[test]
    fn duplicate_urls_keep_most_relevant_entry() {
        let context = [
            entry("https://same.test", 0.4, CredibilityRating::Low),
            entry("https://other.test", 0.5, CredibilityRating::Medium),
            entry("https://same.test", 0.8, CredibilityRating::High),
        ];
        let sources = format_sources(&context);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url, "https://same.test");
        assert_eq!(sources[0].credibility, CredibilityRating::High);
        assert_eq!(sources[1].url, "https://other.test");
    }

    #[test]
    fn blank_title_is_labelled_unknown() {
        let mut nameless = entry("https://nameless.test", 0.6, CredibilityRating::Unknown);
        nameless.source_title.clear();
        assert_eq!(format_sources(&[nameless])[0].title, UNKNOWN_SOURCE_TITLE);
    }
}
