//! Deterministic offline embeddings.
//!
//! [`HashingEmbedder`] projects unigrams and adjacent-token bigrams into a
//! fixed number of buckets with xxHash, signs each contribution by a hash
//! bit, and L2-normalizes the result. Texts sharing vocabulary land close in
//! squared-L2 distance; no model files are needed.

use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use govqa_core::{Embedder, Error, Result};
use govqa_text::tokenize;

const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be greater than zero".to_string()));
        }
        Ok(Self { dim })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(feature.as_bytes());
        let h = hasher.finish();
        let idx = (h % self.dim as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = tokenize(text);
        for token in &tokens {
            let (idx, sign) = self.bucket(token);
            v[idx] += sign;
        }
        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            v[idx] += sign * BIGRAM_WEIGHT;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tracing::debug!(texts = texts.len(), dim = self.dim, "hashing embed batch");
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
