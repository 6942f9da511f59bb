//! Model geometry: GPT-2 small has 12 layers of 12 attention heads.

use crate::error::{ProfilerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUM_LAYERS: usize = 12;
pub const HEADS_PER_LAYER: usize = 12;
pub const NUM_HEADS: usize = NUM_LAYERS * HEADS_PER_LAYER;
pub const FEATURES_PER_SENTENCE: usize = 5;
pub const NUM_CLUSTERS: usize = 5;

/// Identity of one attention head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeadId {
    pub layer: usize,
    pub head: usize,
}

impl HeadId {
    /// Build a head id, rejecting coordinates outside the 12×12 grid.
    pub fn new(layer: usize, head: usize) -> Result<Self> {
        if layer >= NUM_LAYERS {
            return Err(ProfilerError::InvalidIndex {
                kind: "layer",
                value: layer,
                limit: NUM_LAYERS,
            });
        }
        if head >= HEADS_PER_LAYER {
            return Err(ProfilerError::InvalidIndex {
                kind: "head",
                value: head,
                limit: HEADS_PER_LAYER,
            });
        }
        Ok(Self { layer, head })
    }

    /// Inverse of [`HeadId::index`]. Panics on an index ≥ 144; callers iterate `0..NUM_HEADS`.
    pub fn from_index(index: usize) -> Self {
        assert!(index < NUM_HEADS, "head index {index} out of range");
        Self {
            layer: index / HEADS_PER_LAYER,
            head: index % HEADS_PER_LAYER,
        }
    }

    /// Flattened index `layer * 12 + head`.
    pub fn index(&self) -> usize {
        self.layer * HEADS_PER_LAYER + self.head
    }

    pub fn all() -> impl Iterator<Item = HeadId> {
        (0..NUM_HEADS).map(HeadId::from_index)
    }
}

impl fmt::Display for HeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}H{}", self.layer, self.head)
    }
}

/// Validate a cluster id against the fixed cluster count.
pub fn check_cluster_id(cluster_id: usize) -> Result<()> {
    if cluster_id >= NUM_CLUSTERS {
        return Err(ProfilerError::InvalidIndex {
            kind: "cluster",
            value: cluster_id,
            limit: NUM_CLUSTERS,
        });
    }
    Ok(())
}
