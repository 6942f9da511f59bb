//! Behavioral features of a single attention matrix.
//!
//! Five scalars summarize how one head distributes attention over one
//! sentence. Rows are used as given: weights that do not sum to exactly one
//! are not renormalized.
//!
//! Forward and backward attention are means over the strictly triangular
//! cells only, n(n-1)/2 each. Averaging the masked triangle over all n²
//! cells instead would give values smaller by a factor of 2n/(n-1), so
//! magnitudes are not comparable with profiles computed that way.

use crate::geometry::FEATURES_PER_SENTENCE;
use crate::oracle::AttentionMatrix;
use serde::{Deserialize, Serialize};

/// Guards `ln(0)` in the entropy term.
pub const ENTROPY_EPSILON: f64 = 1e-10;

/// Display names, in feature-slot order.
pub const FEATURE_NAMES: [&str; FEATURES_PER_SENTENCE] = [
    "Self-attention ratio",
    "Forward attention",
    "Backward attention",
    "Attention entropy",
    "Distance-weighted attention",
];

/// Feature vector for one (head, sentence) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mean of the diagonal.
    pub self_attention: f64,
    /// Mean of the strictly upper triangle (attention to later tokens).
    pub forward: f64,
    /// Mean of the strictly lower triangle (attention to earlier tokens).
    pub backward: f64,
    /// Mean per-row Shannon entropy, in nats.
    pub entropy: f64,
    /// Mean of `|i - j| * A[i, j]` over all cells.
    pub distance_weighted: f64,
}

impl FeatureVector {
    /// The zero vector substituted when a head's attention is unavailable.
    pub const ZERO: FeatureVector = FeatureVector {
        self_attention: 0.0,
        forward: 0.0,
        backward: 0.0,
        entropy: 0.0,
        distance_weighted: 0.0,
    };

    pub fn to_array(self) -> [f64; FEATURES_PER_SENTENCE] {
        [
            self.self_attention,
            self.forward,
            self.backward,
            self.entropy,
            self.distance_weighted,
        ]
    }

    pub fn from_array(values: [f64; FEATURES_PER_SENTENCE]) -> Self {
        Self {
            self_attention: values[0],
            forward: values[1],
            backward: values[2],
            entropy: values[3],
            distance_weighted: values[4],
        }
    }

    /// Replace NaN or infinite components with zero.
    pub fn sanitized(self) -> Self {
        let clean = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self::from_array(self.to_array().map(clean))
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Extract the five features from one `[seq, seq]` attention matrix.
///
/// Empty triangles (one-token sentences) and empty matrices yield zero for
/// the affected features instead of dividing by zero.
pub fn extract_features(matrix: &AttentionMatrix<'_>) -> FeatureVector {
    let n = matrix.seq_len();
    if n == 0 {
        return FeatureVector::ZERO;
    }

    let mut diag = 0.0;
    let mut upper = 0.0;
    let mut lower = 0.0;
    let mut distance = 0.0;
    let mut entropy = 0.0;

    for (i, row) in matrix.rows().enumerate() {
        let mut row_entropy = 0.0;
        for (j, &w) in row.iter().enumerate() {
            let p = f64::from(w);
            match i.cmp(&j) {
                std::cmp::Ordering::Equal => diag += p,
                std::cmp::Ordering::Less => upper += p,
                std::cmp::Ordering::Greater => lower += p,
            }
            distance += i.abs_diff(j) as f64 * p;
            row_entropy -= p * (p + ENTROPY_EPSILON).ln();
        }
        entropy += row_entropy;
    }

    let triangle = n * (n - 1) / 2;
    FeatureVector {
        self_attention: mean(diag, n),
        forward: mean(upper, triangle),
        backward: mean(lower, triangle),
        entropy: mean(entropy, n),
        distance_weighted: mean(distance, n * n),
    }
}
