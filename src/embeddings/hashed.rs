//! Feature-hashed bag-of-words embedder
//!
//! Lower-cased alphanumeric word tokens are hashed (FNV-1a) into `dimension`
//! buckets as term counts, then L2 normalized. Deterministic across runs and
//! platforms, needs no model files, and scores lexical overlap. Used offline
//! and as the default in tests.

use super::similarity::l2_normalize;
use super::{EmbeddingModel, Embedder};
use crate::error::{PipelineError, Result};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(EmbeddingModel::HashedBow.dimension().unwrap_or(384))
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash = FNV_OFFSET;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % self.dimension as u64) as usize
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(PipelineError::embedding("hashed embedder has zero dimension"));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(token)] += 1.0;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        EmbeddingModel::HashedBow.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;
    use approx::assert_relative_eq;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("Squats build leg strength.").unwrap();
        let b = embedder.embed("Squats build leg strength.").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn test_embedding_is_normalized() {
        let embedder = HashedEmbedder::new();
        let v = embedder.embed("Bench press builds chest strength").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("LEG day!").unwrap();
        let b = embedder.embed("leg, day").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_terms_score_higher() {
        let embedder = HashedEmbedder::new();
        let query = embedder.embed("leg exercises").unwrap();
        let legs = embedder.embed("Squats build leg strength").unwrap();
        let chest = embedder.embed("Bench press builds chest strength").unwrap();
        assert!(cosine_similarity(&query, &legs) > cosine_similarity(&query, &chest));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::with_dimension(16);
        let v = embedder.embed("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
