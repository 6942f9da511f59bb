//! K-means clustering with k-means++ seeding and Lloyd iterations.

use super::metrics::euclidean_distance_squared;
use crate::config::ClusteringConfig;
use crate::error::{ProfilerError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// K-means configuration plus the seed that makes it reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub seed: u64,
}

/// Outcome of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster id per input row, numbered in order of first appearance.
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self::from_config(k, seed, &ClusteringConfig::default())
    }

    pub fn from_config(k: usize, seed: u64, config: &ClusteringConfig) -> Self {
        Self {
            k,
            n_init: config.n_init,
            max_iterations: config.max_iterations,
            convergence_threshold: config.convergence_threshold,
            seed,
        }
    }

    /// Cluster `data` (one row per item). Identical inputs and seed give
    /// identical assignments.
    pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit> {
        if data.is_empty() {
            return Err(ProfilerError::clustering("data must not be empty"));
        }
        if self.k == 0 || self.k > data.len() {
            return Err(ProfilerError::clustering(format!(
                "k ({}) must be in [1, {}]",
                self.k,
                data.len()
            )));
        }
        let dim = data[0].len();
        if data.iter().any(|row| row.len() != dim) {
            return Err(ProfilerError::clustering("rows have different widths"));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;
        for run in 0..self.n_init.max(1) {
            let init = kmeans_plus_plus_init(data, self.k, &mut rng);
            let fit = self.lloyd(data, init);
            debug!(
                run,
                inertia = fit.inertia,
                iterations = fit.iterations,
                converged = fit.converged,
                "k-means run finished"
            );
            if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        let mut fit = best.ok_or_else(|| ProfilerError::clustering("no k-means run completed"))?;
        relabel_by_first_appearance(&mut fit, self.k);
        Ok(fit)
    }

    fn lloyd(&self, data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
        let mut assignments = vec![0usize; data.len()];
        let mut iterations = 0;
        let mut converged = false;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;
            assign(data, &centroids, &mut assignments);
            relocate_empty_clusters(data, &centroids, &mut assignments, self.k);

            let new_centroids = compute_centroids(data, &assignments, &centroids);
            let max_shift = centroids
                .iter()
                .zip(&new_centroids)
                .map(|(old, new)| euclidean_distance_squared(old, new).sqrt())
                .fold(0.0f64, f64::max);
            centroids = new_centroids;

            if max_shift < self.convergence_threshold {
                converged = true;
                break;
            }
        }

        assign(data, &centroids, &mut assignments);
        let inertia = data
            .iter()
            .zip(&assignments)
            .map(|(row, &c)| euclidean_distance_squared(row, &centroids[c]))
            .sum();

        KMeansFit {
            assignments,
            centroids,
            inertia,
            iterations,
            converged,
        }
    }
}

/// Choose initial centroids with probability proportional to squared
/// distance from the centroids chosen so far.
pub fn kmeans_plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut min_distances = vec![f64::MAX; n];
    while centroids.len() < k {
        let last = &centroids[centroids.len() - 1];
        for (d, row) in min_distances.iter_mut().zip(data) {
            *d = d.min(euclidean_distance_squared(row, last));
        }

        let total: f64 = min_distances.iter().sum();
        if !(total > 0.0) {
            // Every point coincides with a centroid; duplicates stay empty.
            let first = centroids[0].clone();
            centroids.resize(k, first);
            break;
        }

        let target = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        let mut chosen = n - 1;
        for (i, &d) in min_distances.iter().enumerate() {
            cumulative += d;
            if cumulative > target {
                chosen = i;
                break;
            }
        }
        centroids.push(data[chosen].clone());
    }
    centroids
}

/// Nearest-centroid assignment; ties go to the lowest centroid index.
fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>], assignments: &mut [usize]) {
    for (row, slot) in data.iter().zip(assignments.iter_mut()) {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (j, centroid) in centroids.iter().enumerate() {
            let dist = euclidean_distance_squared(row, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = j;
            }
        }
        *slot = best;
    }
}

/// Give each empty cluster the point farthest from its current centroid.
/// Only points at a positive distance move, so identical rows stay together.
fn relocate_empty_clusters(
    data: &[Vec<f64>],
    centroids: &[Vec<f64>],
    assignments: &mut [usize],
    k: usize,
) {
    let mut counts = vec![0usize; k];
    for &c in assignments.iter() {
        counts[c] += 1;
    }
    for cluster in 0..k {
        if counts[cluster] > 0 {
            continue;
        }
        let farthest = data
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[assignments[*i]] > 1)
            .map(|(i, row)| (i, euclidean_distance_squared(row, &centroids[assignments[i]])))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((i, dist)) = farthest {
            if dist > 0.0 {
                counts[assignments[i]] -= 1;
                assignments[i] = cluster;
                counts[cluster] += 1;
            }
        }
    }
}

/// Mean of each cluster's members; an empty cluster keeps its old centroid.
fn compute_centroids(
    data: &[Vec<f64>],
    assignments: &[usize],
    previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let dim = data[0].len();
    let mut sums = vec![vec![0.0; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &c) in data.iter().zip(assignments) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(row) {
            *s += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((mut sum, count), old)| {
            if count == 0 {
                return old.clone();
            }
            for s in &mut sum {
                *s /= count as f64;
            }
            sum
        })
        .collect()
}

/// Renumber clusters so ids appear in increasing order of their first member.
fn relabel_by_first_appearance(fit: &mut KMeansFit, k: usize) {
    let mut mapping: Vec<Option<usize>> = vec![None; k];
    let mut next = 0;
    for &c in &fit.assignments {
        if mapping[c].is_none() {
            mapping[c] = Some(next);
            next += 1;
        }
    }
    for slot in mapping.iter_mut().filter(|m| m.is_none()) {
        *slot = Some(next);
        next += 1;
    }
    let mapping: Vec<usize> = mapping.into_iter().map(|m| m.unwrap_or(0)).collect();

    for c in &mut fit.assignments {
        *c = mapping[*c];
    }
    let mut centroids = vec![Vec::new(); k];
    for (old, centroid) in fit.centroids.drain(..).enumerate() {
        centroids[mapping[old]] = centroid;
    }
    fit.centroids = centroids;
}
