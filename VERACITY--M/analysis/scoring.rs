use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;

use crate::model::{ContextEntry, Verdict};

/// Largest perturbation applied to a computed score.
pub const NOISE_AMPLITUDE: f64 = 0.1;
/// Score reported when there is no usable evidence.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Source of the symmetric perturbation applied by [`CredibilityScorer`].
pub trait NoiseSource: Send + Sync {
    /// Next perturbation, expected in `[-NOISE_AMPLITUDE, NOISE_AMPLITUDE]`.
    fn perturbation(&self) -> f64;
}

/// Uniform noise in `[-NOISE_AMPLITUDE, NOISE_AMPLITUDE]`.
pub struct UniformNoise {
    rng: Mutex<SmallRng>,
}

impl fmt::Debug for UniformNoise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformNoise")
            .field("amplitude", &NOISE_AMPLITUDE)
            .finish_non_exhaustive()
    }
}

impl UniformNoise {
    /// Entropy-seeded noise.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Reproducible noise.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for UniformNoise {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl NoiseSource for UniformNoise {
    fn perturbation(&self) -> f64 {
        self.rng.lock().gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE)
    }
}

/// Constant perturbation, for tests and reproducible runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FixedNoise(
    /// Perturbation returned on every draw.
    pub f64,
);

impl NoiseSource for FixedNoise {
    fn perturbation(&self) -> f64 {
        self.0
    }
}

/// Errors raised by the deterministic scoring path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// A context entry carried NaN or an infinite similarity.
    #[error("context entry {index} has non-finite similarity {value}")]
    NonFiniteSimilarity {
        /// Offending entry position.
        index: usize,
        /// Offending value.
        value: f64,
    },
}

/// Similarity-weighted credibility score over retrieved context.
#[derive(Clone)]
pub struct CredibilityScorer {
    noise: Arc<dyn NoiseSource>,
}

impl fmt::Debug for CredibilityScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredibilityScorer").finish_non_exhaustive()
    }
}

impl Default for CredibilityScorer {
    fn default() -> Self {
        Self::new(Arc::new(UniformNoise::from_entropy()))
    }
}

impl CredibilityScorer {
    /// Creates a scorer drawing noise from `noise`.
    #[must_use]
    pub fn new(noise: Arc<dyn NoiseSource>) -> Self {
        Self { noise }
    }

    /// Noise-free score, `None` when the context carries no weight.
    ///
    /// Weight per entry is `similarity * credibility multiplier`; the score is
    /// `Σ(weight * similarity) / Σ(weight)`.
    pub fn base_score(context: &[ContextEntry]) -> Result<Option<f64>, ScoringError> {
        let mut total_weight = 0.0;
        let mut weighted_sum = 0.0;
        for (index, entry) in context.iter().enumerate() {
            if !entry.similarity.is_finite() {
                return Err(ScoringError::NonFiniteSimilarity {
                    index,
                    value: entry.similarity,
                });
            }
            let similarity = entry.similarity.clamp(0.0, 1.0);
            let weight = similarity * entry.credibility.multiplier();
            total_weight += weight;
            weighted_sum += weight * similarity;
        }
        if total_weight > 0.0 {
            Ok(Some(weighted_sum / total_weight))
        } else {
            Ok(None)
        }
    }

    /// Final score in `[0, 1]`. Noise is only applied to evidence-backed
    /// scores; the neutral score is returned as is.
    pub fn score(&self, context: &[ContextEntry]) -> Result<f64, ScoringError> {
        let Some(base) = Self::base_score(context)? else {
            return Ok(NEUTRAL_SCORE);
        };
        let noise = self.noise.perturbation();
        let noise = if noise.is_finite() { noise } else { 0.0 };
        Ok((base + noise).clamp(0.0, 1.0))
    }
}

/// Maps a score to a verdict. Lower bounds are inclusive; callers clamp
/// beforehand.
#[must_use]
pub fn classify(score: f64) -> Verdict {
    if score >= 0.8 {
        Verdict::LikelyAccurate
    } else if score >= 0.6 {
        Verdict::MostlyAccurate
    } else if score >= 0.4 {
        Verdict::MixedAccuracy
    } else if score >= 0.2 {
        Verdict::LikelyInaccurate
    } else {
        Verdict::HighlyQuestionable
    }
}
