//! Deterministic feature-hashing embedder.
//!
//! No model, no network: every lowercased word is hashed into one of `dim`
//! buckets with a ±1 sign, and the result is L2-normalized. Texts sharing
//! words get a positive cosine similarity, which is enough for offline runs
//! and tests.

use sha2::{Digest, Sha256};
use std::{future::Future, pin::Pin};

use crate::{EmbeddingsProvider, RagError};

#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Embeds a single text synchronously.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            v[idx] += if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Wordless text still needs a valid direction.
            v[0] = 1.0;
        } else {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingsProvider for HashingEmbedder {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>> {
        Box::pin(async move { Ok(texts.iter().map(|t| self.vector(t)).collect()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_distance;

    #[test]
    fn shared_words_are_closer() {
        let e = HashingEmbedder::new(64);
        let q = e.vector("rust ownership rules");
        let near = e.vector("Ownership rules in Rust");
        let far = e.vector("baking sourdough bread");
        assert!(cosine_distance(&q, &near) < cosine_distance(&q, &far));
        assert_eq!(e.vector("same text"), e.vector("same text"));
    }

    #[test]
    fn punctuation_only_is_still_a_unit_vector() {
        let v = HashingEmbedder::new(8).vector("...");
        assert_eq!(v[0], 1.0);
    }
}
