//! Similarity scoring for semantic duplicate detection.
//!
//! The engine consumes similarity purely as a scoring function: any
//! implementation of `SimilarityScorer` can back the semantic matcher. The
//! built-in `LexicalSimilarity` is deterministic and offline (feature
//! hashing over tokens, not a neural model), sufficient for catching
//! paraphrases with heavy token overlap and for reproducible tests.

use blake3::Hasher;

/// A scoring function over two statements, returning a value in [0, 1].
pub trait SimilarityScorer: Send + Sync {
    /// Score the similarity of two statements. 1.0 means identical meaning
    /// as far as the scorer can tell.
    fn score(&self, a: &str, b: &str) -> f32;
}

/// Deterministic lexical scorer: feature-hashed token vectors compared by
/// cosine similarity.
#[derive(Debug, Clone)]
pub struct LexicalSimilarity {
    dim: usize,
}

/// Dimensionality of the hashed token vectors. Modest on purpose: the
/// vectors are transient and per-comparison.
const LEXICAL_DIM: usize = 64;

impl LexicalSimilarity {
    /// Create a scorer with the default dimensionality.
    #[must_use]
    pub fn new() -> Self {
        Self { dim: LEXICAL_DIM }
    }

    /// Create a scorer with a custom dimensionality.
    #[must_use]
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        let lowered = text.to_ascii_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let mut hasher = Hasher::new();
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();
            let bytes = digest.as_bytes();

            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            let idx = (bucket as usize) % self.dim;
            let sign = if (bytes[8] & 1) == 0 { 1.0f32 } else { -1.0f32 };
            vec[idx] += sign;
        }

        vec
    }
}

impl Default for LexicalSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityScorer for LexicalSimilarity {
    fn score(&self, a: &str, b: &str) -> f32 {
        cosine(&self.embed(a), &self.embed(b)).clamp(0.0, 1.0)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let xf = f64::from(x);
        let yf = f64::from(y);
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        #[allow(clippy::cast_possible_truncation)]
        {
            sim as f32
        }
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_statements_score_one() {
        let scorer = LexicalSimilarity::new();
        let s = scorer.score("the user prefers dark mode", "the user prefers dark mode");
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = LexicalSimilarity::new();
        let a = scorer.score("favorite color is blue", "favourite colour is blue");
        let b = scorer.score("favorite color is blue", "favourite colour is blue");
        assert_eq!(a, b);
    }

    #[test]
    fn disjoint_statements_score_low() {
        let scorer = LexicalSimilarity::new();
        let s = scorer.score("quarterly revenue grew", "penguins live in antarctica");
        assert!(s < 0.5, "expected low score, got {s}");
    }

    #[test]
    fn overlapping_statements_score_high() {
        let scorer = LexicalSimilarity::new();
        let s = scorer.score(
            "user prefers dark mode in the editor",
            "user prefers dark mode in the terminal",
        );
        assert!(s > 0.6, "expected high score, got {s}");
    }

    #[test]
    fn empty_text_scores_zero() {
        let scorer = LexicalSimilarity::new();
        assert_eq!(scorer.score("", "anything"), 0.0);
    }
}
