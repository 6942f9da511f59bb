//! Display-only 3-D embedding of the profile matrix (exact t-SNE).
//!
//! The projection is computed from the same feature rows the clusterer sees,
//! but nothing flows back: cluster assignment never reads these coordinates.
//! Distances in the 3-D view are not the distances k-means used.

use crate::config::ProjectionConfig;
use crate::profile::ProfileMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const EXAGGERATION_ITERATIONS: usize = 250;
const MIN_PROBABILITY: f64 = 1e-12;
const MIN_GAIN: f64 = 0.01;
const ENTROPY_TOLERANCE: f64 = 1e-5;
const BANDWIDTH_SEARCH_STEPS: usize = 50;

/// 3-D coordinates per head, for visualization only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(Vec<[f64; 3]>);

impl Projection {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<[f64; 3]> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }
}

/// Embed the matrix rows into three dimensions with t-SNE.
pub fn project_3d(matrix: &ProfileMatrix, config: &ProjectionConfig, seed: u64) -> Projection {
    info!(
        points = matrix.num_rows(),
        perplexity = config.perplexity,
        iterations = config.iterations,
        "Creating 3D projection"
    );
    Projection(tsne(matrix.rows(), config, seed))
}

fn pairwise_squared_distances(data: &[Vec<f64>]) -> Vec<f64> {
    let n = data.len();
    let mut d = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let dist: f64 = data[i]
                .iter()
                .zip(&data[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            d[i * n + j] = dist;
            d[j * n + i] = dist;
        }
    }
    d
}

/// Conditional affinities `p(j|i)` whose entropy matches `ln(perplexity)`.
fn conditional_affinities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let mut p = vec![0.0; n * n];

    for i in 0..n {
        let row = &distances[i * n..(i + 1) * n];
        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;
        let mut probs = vec![0.0; n];

        for _ in 0..BANDWIDTH_SEARCH_STEPS {
            // Shift by the nearest neighbor distance to keep exp() in range.
            let min_d = row
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &d)| d)
                .fold(f64::INFINITY, f64::min);
            let mut sum = 0.0;
            for (j, &d) in row.iter().enumerate() {
                probs[j] = if j == i {
                    0.0
                } else {
                    (-(d - min_d) * beta).exp()
                };
                sum += probs[j];
            }
            if !(sum > 0.0) {
                break;
            }
            let weighted: f64 = row
                .iter()
                .zip(&probs)
                .map(|(&d, &pj)| (d - min_d) * pj)
                .sum();
            let entropy = sum.ln() + beta * weighted / sum;
            for pj in &mut probs {
                *pj /= sum;
            }

            let diff = entropy - target;
            if diff.abs() < ENTROPY_TOLERANCE {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
        p[i * n..(i + 1) * n].copy_from_slice(&probs);
    }
    p
}

fn tsne(data: &[Vec<f64>], config: &ProjectionConfig, seed: u64) -> Vec<[f64; 3]> {
    let n = data.len();
    if n < 2 {
        return vec![[0.0; 3]; n];
    }

    let perplexity = config
        .perplexity
        .min((n - 1) as f64 / 3.0)
        .max(1.0);
    let distances = pairwise_squared_distances(data);
    let conditional = conditional_affinities(&distances, n, perplexity);

    let mut p = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let joint = (conditional[i * n + j] + conditional[j * n + i]) / (2.0 * n as f64);
            p[i * n + j] = joint.max(MIN_PROBABILITY);
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut y: Vec<[f64; 3]> = (0..n)
        .map(|_| {
            [
                rng.gen_range(-1.0..1.0) * 1e-4,
                rng.gen_range(-1.0..1.0) * 1e-4,
                rng.gen_range(-1.0..1.0) * 1e-4,
            ]
        })
        .collect();
    let mut velocity = vec![[0.0f64; 3]; n];
    let mut gains = vec![[1.0f64; 3]; n];
    let mut num = vec![0.0; n * n];

    for iter in 0..config.iterations {
        let (exaggeration, momentum) = if iter < EXAGGERATION_ITERATIONS {
            (config.early_exaggeration, 0.5)
        } else {
            (1.0, 0.8)
        };

        let mut sum_num = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let d2: f64 = (0..3).map(|k| (y[i][k] - y[j][k]).powi(2)).sum();
                let q = 1.0 / (1.0 + d2);
                num[i * n + j] = q;
                num[j * n + i] = q;
                sum_num += 2.0 * q;
            }
        }
        if !(sum_num > 0.0) {
            break;
        }

        for i in 0..n {
            let mut grad = [0.0f64; 3];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[i * n + j] / sum_num).max(MIN_PROBABILITY);
                let coeff = (exaggeration * p[i * n + j] - q) * num[i * n + j];
                for k in 0..3 {
                    grad[k] += 4.0 * coeff * (y[i][k] - y[j][k]);
                }
            }
            for k in 0..3 {
                let same_sign = (grad[k] > 0.0) == (velocity[i][k] > 0.0);
                gains[i][k] = if same_sign {
                    (gains[i][k] * 0.8).max(MIN_GAIN)
                } else {
                    gains[i][k] + 0.2
                };
                velocity[i][k] =
                    momentum * velocity[i][k] - config.learning_rate * gains[i][k] * grad[k];
            }
        }

        let mut mean = [0.0f64; 3];
        for (point, step) in y.iter_mut().zip(&velocity) {
            for k in 0..3 {
                point[k] += step[k];
                mean[k] += point[k] / n as f64;
            }
        }
        for point in &mut y {
            for k in 0..3 {
                point[k] -= mean[k];
            }
        }

        if iter % 250 == 0 {
            debug!(iteration = iter, "t-SNE progress");
        }
    }

    for point in &mut y {
        for v in point.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
    }
    y
}
