//! The attention oracle seam.
//!
//! An oracle turns a sentence into tokens plus a `[layer, head, query, key]`
//! block of attention weights. The profiler treats it as a black box; the
//! only contract is the shape of [`AttentionOutput`] and the capability check
//! exposed through [`AttentionOracle::availability`].

pub mod command;
pub mod synthetic;

pub use command::CommandOracle;
pub use synthetic::{SyntheticOracle, UniformOracle};

use crate::config::OracleConfig;
use crate::error::{ProfilerError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of an oracle capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Which oracle produced a profile, and whether its weights were synthetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleProvenance {
    pub name: String,
    pub synthetic: bool,
}

impl OracleProvenance {
    pub fn of(oracle: &dyn AttentionOracle) -> Self {
        Self {
            name: oracle.name().to_string(),
            synthetic: oracle.is_synthetic(),
        }
    }
}

/// Source of attention weights for a piece of text.
pub trait AttentionOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this oracle can serve requests right now.
    fn availability(&self) -> Availability;

    /// True when the weights are fabricated rather than produced by a model.
    fn is_synthetic(&self) -> bool {
        false
    }

    fn attend(&self, text: &str) -> Result<AttentionOutput>;
}

/// Tokens and attention weights for one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionOutput {
    pub tokens: Vec<String>,
    pub attention: AttentionTensor,
}

/// Dense `[layers, heads, seq_len, seq_len]` block of attention weights.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionTensor {
    layers: usize,
    heads: usize,
    seq_len: usize,
    data: Vec<f32>,
}

impl AttentionTensor {
    pub fn new(layers: usize, heads: usize, seq_len: usize, data: Vec<f32>) -> Result<Self> {
        let expected = layers * heads * seq_len * seq_len;
        if data.len() != expected {
            return Err(ProfilerError::invalid_input(format!(
                "attention data has {} values, expected {layers}x{heads}x{seq_len}x{seq_len} = {expected}",
                data.len()
            )));
        }
        Ok(Self {
            layers,
            heads,
            seq_len,
            data,
        })
    }

    /// Build from the nested `[layer][head][query][key]` layout used on the wire.
    pub fn from_nested(nested: Vec<Vec<Vec<Vec<f32>>>>) -> Result<Self> {
        let layers = nested.len();
        let heads = nested.first().map_or(0, Vec::len);
        let seq_len = nested
            .first()
            .and_then(|l| l.first())
            .map_or(0, Vec::len);

        let mut data = Vec::with_capacity(layers * heads * seq_len * seq_len);
        for (l, layer) in nested.into_iter().enumerate() {
            if layer.len() != heads {
                return Err(ProfilerError::invalid_input(format!(
                    "layer {l} has {} heads, expected {heads}",
                    layer.len()
                )));
            }
            for (h, head) in layer.into_iter().enumerate() {
                if head.len() != seq_len {
                    return Err(ProfilerError::invalid_input(format!(
                        "L{l}H{h} has {} rows, expected {seq_len}",
                        head.len()
                    )));
                }
                for row in head {
                    if row.len() != seq_len {
                        return Err(ProfilerError::invalid_input(format!(
                            "L{l}H{h} has a row of length {}, expected {seq_len}",
                            row.len()
                        )));
                    }
                    data.extend(row);
                }
            }
        }
        Self::new(layers, heads, seq_len, data)
    }

    /// Fill every `[seq, seq]` slice with the same value.
    pub fn filled(layers: usize, heads: usize, seq_len: usize, value: f32) -> Self {
        Self {
            layers,
            heads,
            seq_len,
            data: vec![value; layers * heads * seq_len * seq_len],
        }
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// The `[seq, seq]` slice for one head, or `None` when the tensor does
    /// not cover that layer or head (smaller models).
    pub fn matrix(&self, layer: usize, head: usize) -> Option<AttentionMatrix<'_>> {
        if layer >= self.layers || head >= self.heads {
            return None;
        }
        let block = self.seq_len * self.seq_len;
        let start = (layer * self.heads + head) * block;
        Some(AttentionMatrix {
            seq_len: self.seq_len,
            weights: &self.data[start..start + block],
        })
    }
}

/// Borrowed row-major `[seq, seq]` attention matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionMatrix<'a> {
    seq_len: usize,
    weights: &'a [f32],
}

impl<'a> AttentionMatrix<'a> {
    pub fn new(seq_len: usize, weights: &'a [f32]) -> Result<Self> {
        if weights.len() != seq_len * seq_len {
            return Err(ProfilerError::invalid_input(format!(
                "matrix has {} values, expected {seq_len}x{seq_len}",
                weights.len()
            )));
        }
        Ok(Self { seq_len, weights })
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn get(&self, query: usize, key: usize) -> f32 {
        self.weights[query * self.seq_len + key]
    }

    pub fn row(&self, query: usize) -> &'a [f32] {
        &self.weights[query * self.seq_len..(query + 1) * self.seq_len]
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [f32]> + 'a {
        let this = *self;
        (0..this.seq_len).map(move |i| this.row(i))
    }

    /// Position `(query, key)` and value of the largest weight; the first
    /// maximum in row-major order wins ties.
    pub fn argmax(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &w) in self.weights.iter().enumerate() {
            match best {
                Some((_, b)) if w <= b => {}
                _ => best = Some((idx, w)),
            }
        }
        best.map(|(idx, w)| (idx / self.seq_len, idx % self.seq_len, w))
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.rows().map(<[f32]>::to_vec).collect()
    }
}

/// Pick the oracle to use, applying the synthetic fallback policy.
///
/// `primary` is `None` when no real oracle is configured. If the primary is
/// missing or reports itself unavailable, a [`SyntheticOracle`] is returned
/// when fallback is allowed; otherwise the unavailability is an error.
pub fn resolve_oracle(
    primary: Option<Box<dyn AttentionOracle>>,
    allow_synthetic_fallback: bool,
    seed: u64,
) -> Result<Box<dyn AttentionOracle>> {
    let name = primary
        .as_ref()
        .map_or_else(|| "none".to_string(), |o| o.name().to_string());
    let unavailable_reason = match &primary {
        Some(oracle) => match oracle.availability() {
            Availability::Available => None,
            Availability::Unavailable { reason } => Some(reason),
        },
        None => Some("no oracle command configured".to_string()),
    };

    match (primary, unavailable_reason) {
        (Some(oracle), None) => {
            info!(oracle = %name, "Using attention oracle");
            Ok(oracle)
        }
        (_, reason) => {
            let reason = reason.unwrap_or_default();
            if !allow_synthetic_fallback {
                return Err(ProfilerError::unavailable(name, reason));
            }
            warn!(
                oracle = %name,
                reason = %reason,
                "Attention oracle unavailable, falling back to synthetic attention"
            );
            Ok(Box::new(SyntheticOracle::new(seed)))
        }
    }
}

/// The oracle `config` names, before any fallback: `None` when no command
/// is configured and synthetic attention is not forced.
pub fn configured_oracle(config: &OracleConfig, seed: u64) -> Option<Box<dyn AttentionOracle>> {
    if config.force_synthetic {
        return Some(Box::new(SyntheticOracle::new(seed)));
    }
    config
        .command
        .split_first()
        .map(|(program, args)| -> Box<dyn AttentionOracle> {
            Box::new(CommandOracle::new(program, args.to_vec()))
        })
}

/// Build the oracle described by `config`, falling back as configured.
pub fn oracle_from_config(config: &OracleConfig, seed: u64) -> Result<Box<dyn AttentionOracle>> {
    if config.force_synthetic {
        info!("Synthetic attention forced by configuration");
    }
    resolve_oracle(
        configured_oracle(config, seed),
        config.allow_synthetic_fallback,
        seed,
    )
}
