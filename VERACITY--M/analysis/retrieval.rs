use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;

use crate::{
    config::RetrievalSettings,
    model::{Claim, ContextEntry, CredibilityRating},
};

const BASE_SIMILARITY: f64 = 0.85;
const SIMILARITY_STEP: f64 = 0.1;
const HIGH_CREDIBILITY_SLOTS: usize = 2;
const SNIPPET_CLAIM_CHARS: usize = 50;

/// Errors emitted by retrieval backends.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Backend could not be reached or answered badly.
    #[error("retrieval backend failed: {0}")]
    Backend(String),
}

/// Evidence lookup for extracted claims.
///
/// Implementations return one entry per claim, in claim order, each pointing
/// back at its claim through `claim_index`.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieves context for `claims`.
    async fn retrieve(&self, claims: &[Claim]) -> Result<Vec<ContextEntry>, RetrievalError>;
}

/// Similarity assigned to the entry at `index`: `0.85 - 0.1 * index`,
/// clamped into `[0, 1]`.
#[must_use]
pub fn simulated_similarity(index: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let step = SIMILARITY_STEP * index as f64;
    (BASE_SIMILARITY - step).clamp(0.0, 1.0)
}

/// Stand-in for a vector search backend: fabricates decreasing similarity
/// scores and pays an artificial latency per call and per entry.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRetriever {
    settings: RetrievalSettings,
}

impl SimulatedRetriever {
    /// Creates a retriever with the given latency model.
    #[must_use]
    pub const fn new(settings: RetrievalSettings) -> Self {
        Self { settings }
    }

    fn entry(index: usize, claim: &Claim) -> ContextEntry {
        let ordinal = index + 1;
        ContextEntry {
            claim_index: index,
            similarity: simulated_similarity(index),
            source_title: format!("Fact Check Source {ordinal}"),
            source_url: format!("https://factcheck.example.com/article-{ordinal}"),
            snippet: format!(
                "Relevant information about: {}...",
                claim.preview(SNIPPET_CLAIM_CHARS)
            ),
            credibility: if index < HIGH_CREDIBILITY_SLOTS {
                CredibilityRating::High
            } else {
                CredibilityRating::Medium
            },
        }
    }
}

#[async_trait]
impl ContextRetriever for SimulatedRetriever {
    async fn retrieve(&self, claims: &[Claim]) -> Result<Vec<ContextEntry>, RetrievalError> {
        let request_latency = self.settings.request_latency();
        if !request_latency.is_zero() {
            sleep(request_latency).await;
        }
        let per_entry = self.settings.per_entry_latency();
        let mut entries = Vec::with_capacity(claims.len());
        for (index, claim) in claims.iter().enumerate() {
            entries.push(Self::entry(index, claim));
            if !per_entry.is_zero() {
                sleep(per_entry).await;
            }
        }
        Ok(entries)
    }
}
