//! How reproducible is the clustering?
//!
//! The matrix is re-clustered several times, each run with a different seed
//! and a small amount of per-column noise, and the resulting labelings are
//! compared pairwise with the Adjusted Rand Index. The score is descriptive:
//! it never gates or retries the main clustering.

use crate::clustering::{KMeans, adjusted_rand_index};
use crate::config::{ClusteringConfig, StabilityConfig};
use crate::error::Result;
use crate::geometry::NUM_CLUSTERS;
use crate::profile::ProfileMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Mean pairwise agreement across perturbed re-clusterings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityScore {
    /// Mean pairwise ARI, clamped to `[0, 1]`.
    pub score: f64,
    /// Population standard deviation of the pairwise ARIs.
    pub std: f64,
    pub runs: usize,
}

fn column_std(rows: &[Vec<f64>]) -> Vec<f64> {
    let width = rows.first().map_or(0, Vec::len);
    let n = rows.len().max(1) as f64;
    (0..width)
        .map(|c| {
            let mean = rows.iter().map(|r| r[c]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n;
            var.sqrt()
        })
        .collect()
}

/// Estimate clustering stability of `matrix`.
pub fn estimate_stability(
    matrix: &ProfileMatrix,
    seed: u64,
    clustering: &ClusteringConfig,
    config: &StabilityConfig,
) -> Result<StabilityScore> {
    info!(runs = config.runs, "Computing cluster stability");
    let rows = matrix.rows();
    let stds = column_std(rows);
    let k = NUM_CLUSTERS.min(rows.len());

    let mut labelings = Vec::with_capacity(config.runs);
    for run in 0..config.runs {
        let run_seed = seed.wrapping_add(run as u64 + 1);
        let mut rng = StdRng::seed_from_u64(run_seed ^ 0x5eed_5eed);
        let perturbed: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&stds)
                    .map(|(&v, &s)| {
                        let amplitude = config.noise_scale * s;
                        if amplitude > 0.0 && amplitude.is_finite() {
                            v + rng.gen_range(-amplitude..amplitude)
                        } else {
                            v
                        }
                    })
                    .collect()
            })
            .collect();
        let fit = KMeans::from_config(k, run_seed, clustering).fit(&perturbed)?;
        labelings.push(fit.assignments);
    }

    let mut scores = Vec::new();
    for i in 0..labelings.len() {
        for j in (i + 1)..labelings.len() {
            scores.push(adjusted_rand_index(&labelings[i], &labelings[j]));
        }
    }

    let (mean, std) = if scores.is_empty() {
        (0.0, 0.0)
    } else {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        (mean, var.sqrt())
    };

    let result = StabilityScore {
        score: mean.clamp(0.0, 1.0),
        std,
        runs: config.runs,
    };
    info!(score = result.score, std = result.std, "Stability estimated");
    Ok(result)
}
