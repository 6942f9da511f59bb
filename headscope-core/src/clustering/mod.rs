//! Head clustering: k-means over the full feature space plus the static
//! label table.
//!
//! Labels are looked up by numeric cluster id, not derived from cluster
//! content. K-means ids are reproducible for a fixed seed and matrix, but
//! nothing ties id 0 to syntax-like behavior; the names are a presentation
//! convention.

pub mod kmeans;
pub mod metrics;

pub use kmeans::{KMeans, KMeansFit};
pub use metrics::adjusted_rand_index;

use crate::config::ClusteringConfig;
use crate::error::{ProfilerError, Result};
use crate::geometry::{HeadId, NUM_CLUSTERS, NUM_HEADS};
use crate::profile::ProfileMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const CLUSTER_LABELS: [&str; NUM_CLUSTERS] = [
    "Syntax Trackers",
    "Semantic Linkers",
    "Positional Encoders",
    "Rare Pattern Detectors",
    "Context Aggregators",
];

const CLUSTER_DESCRIPTIONS: [&str; NUM_CLUSTERS] = [
    "These heads focus on syntactic structure, tracking grammatical relationships like subject-verb agreement and phrase boundaries.",
    "These heads link semantically related words, connecting concepts and meanings across the sentence.",
    "These heads encode positional information, helping the model understand word order and sequence.",
    "These heads detect unusual patterns and rare linguistic constructions, acting as specialized detectors.",
    "These heads aggregate context from multiple tokens, building holistic sentence representations.",
];

/// Human-readable name for a cluster id.
pub fn cluster_label(cluster_id: usize) -> String {
    CLUSTER_LABELS
        .get(cluster_id)
        .map_or_else(|| format!("Cluster {cluster_id}"), |l| (*l).to_string())
}

/// Static paragraph describing a cluster id.
pub fn cluster_description(cluster_id: usize) -> &'static str {
    CLUSTER_DESCRIPTIONS
        .get(cluster_id)
        .copied()
        .unwrap_or("Specialized attention pattern cluster.")
}

/// The id → label table, as served in metadata.
pub fn label_table() -> BTreeMap<usize, String> {
    (0..NUM_CLUSTERS).map(|id| (id, cluster_label(id))).collect()
}

/// Cluster id of every head, indexed by flattened head index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterAssignment(Vec<usize>);

impl ClusterAssignment {
    pub fn new(ids: Vec<usize>) -> Result<Self> {
        if ids.len() != NUM_HEADS {
            return Err(ProfilerError::clustering(format!(
                "assignment covers {} heads, expected {NUM_HEADS}",
                ids.len()
            )));
        }
        if let Some(bad) = ids.iter().find(|&&c| c >= NUM_CLUSTERS) {
            return Err(ProfilerError::clustering(format!(
                "cluster id {bad} out of range"
            )));
        }
        Ok(Self(ids))
    }

    pub fn cluster_of(&self, head: HeadId) -> usize {
        self.0[head.index()]
    }

    pub fn ids(&self) -> &[usize] {
        &self.0
    }

    /// Heads assigned to `cluster_id`, in head-index order.
    pub fn members(&self, cluster_id: usize) -> Vec<HeadId> {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == cluster_id)
            .map(|(idx, _)| HeadId::from_index(idx))
            .collect()
    }
}

/// Partition the 144 head rows into five clusters in the full feature space.
pub fn cluster_heads(
    matrix: &ProfileMatrix,
    seed: u64,
    config: &ClusteringConfig,
) -> Result<ClusterAssignment> {
    if matrix.num_rows() != NUM_HEADS {
        return Err(ProfilerError::clustering(format!(
            "profile matrix has {} rows, expected {NUM_HEADS}",
            matrix.num_rows()
        )));
    }
    info!(
        k = NUM_CLUSTERS,
        dims = matrix.num_columns(),
        "Clustering attention heads"
    );
    let fit = KMeans::from_config(NUM_CLUSTERS, seed, config).fit(matrix.rows())?;
    info!(
        inertia = fit.inertia,
        iterations = fit.iterations,
        converged = fit.converged,
        "Clustering complete"
    );
    ClusterAssignment::new(fit.assignments)
}
