//! Optional embedder contract and the similarity functions the
//! core consumes. No production embedder ships here; the Jaccard-overlap
//! fallback used when no embedder is configured is fully implemented.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;

/// Turns text into a vector for similarity search. Dimensionality is
/// implementation-defined; the core only ever compares vectors of equal
/// length via [`cosine_similarity`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for
/// mismatched lengths or a zero-magnitude vector rather than panicking or
/// producing `NaN`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Token-overlap similarity used as the fallback when no embedder is
/// configured.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let tokens = |s: &str| -> HashSet<String> {
        s.to_lowercase().split_whitespace().map(str::to_string).collect()
    };
    let set_a = tokens(a);
    let set_b = tokens(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_return_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn jaccard_overlap_counts_shared_tokens() {
        let score = jaccard_similarity("the quick brown fox", "the quick red fox");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn jaccard_identical_strings_is_one() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
    }
}
