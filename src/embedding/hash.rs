//! Offline feature-hashing embedder.
//!
//! Each lowercase token (and each adjacent token pair at half weight) is
//! hashed with FNV-1a into a handful of signed buckets, then the vector is
//! L2-normalized. Texts sharing vocabulary land close together in cosine
//! space. No network, no model files, fully deterministic.

use anyhow::Result;
use async_trait::async_trait;

use skill_index_core::embedding::{l2_normalize, EmbeddingProvider};

/// Buckets touched per feature.
const HASHES_PER_FEATURE: u64 = 4;
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbedder {
    dims: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            name: format!("fnv1a-hash-{}", dims),
        }
    }

    /// Embed one text synchronously.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vector;
        }

        let tokens = tokenize(text);
        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let base = fnv1a(feature);
        for salt in 0..HASHES_PER_FEATURE {
            let h = fnv1a(&[base.to_le_bytes(), salt.to_le_bytes()].concat());
            let bucket = ((h >> 1) % self.dims as u64) as usize;
            if h & 1 == 0 {
                vector[bucket] += weight;
            } else {
                vector[bucket] -= weight;
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    data.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}
