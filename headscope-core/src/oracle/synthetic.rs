//! Oracles that fabricate attention weights instead of running a model.

use super::{AttentionOracle, AttentionOutput, AttentionTensor, Availability};
use crate::error::Result;
use crate::geometry::{HEADS_PER_LAYER, NUM_LAYERS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

fn whitespace_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

/// Random attention in `[0, 1)`, not row-normalized.
///
/// Used when no real model is reachable. Weights are reproducible: the
/// generator is seeded from the configured seed mixed with a SHA-256 of the
/// text, so asking twice for the same sentence yields the same tensor.
#[derive(Debug, Clone)]
pub struct SyntheticOracle {
    seed: u64,
    layers: usize,
    heads: usize,
}

impl SyntheticOracle {
    pub fn new(seed: u64) -> Self {
        Self::with_shape(seed, NUM_LAYERS, HEADS_PER_LAYER)
    }

    /// A synthetic oracle for a model of a different size.
    pub fn with_shape(seed: u64, layers: usize, heads: usize) -> Self {
        Self {
            seed,
            layers,
            heads,
        }
    }

    fn rng_for(&self, text: &str) -> StdRng {
        let digest = Sha256::digest(text.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(self.seed ^ u64::from_le_bytes(prefix))
    }
}

impl AttentionOracle for SyntheticOracle {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn attend(&self, text: &str) -> Result<AttentionOutput> {
        let tokens = whitespace_tokens(text);
        let n = tokens.len();
        let mut rng = self.rng_for(text);
        let data = (0..self.layers * self.heads * n * n)
            .map(|_| rng.gen_range(0.0f32..1.0))
            .collect();
        Ok(AttentionOutput {
            tokens,
            attention: AttentionTensor::new(self.layers, self.heads, n, data)?,
        })
    }
}

/// Every head attends uniformly: each weight is `1 / seq_len`.
#[derive(Debug, Clone)]
pub struct UniformOracle {
    layers: usize,
    heads: usize,
}

impl Default for UniformOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformOracle {
    pub fn new() -> Self {
        Self::with_shape(NUM_LAYERS, HEADS_PER_LAYER)
    }

    pub fn with_shape(layers: usize, heads: usize) -> Self {
        Self { layers, heads }
    }
}

impl AttentionOracle for UniformOracle {
    fn name(&self) -> &str {
        "uniform"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn attend(&self, text: &str) -> Result<AttentionOutput> {
        let tokens = whitespace_tokens(text);
        let n = tokens.len();
        let weight = if n == 0 { 0.0 } else { 1.0 / n as f32 };
        Ok(AttentionOutput {
            tokens,
            attention: AttentionTensor::filled(self.layers, self.heads, n, weight),
        })
    }
}
