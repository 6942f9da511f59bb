//! Persisted profile bundle.
//!
//! One JSON file holds everything a build produces. It lives at a fixed path
//! and carries no fingerprint of the corpus or oracle that produced it:
//! after changing either, invalidate the cache or queries keep serving the
//! old profile.

use crate::clustering::ClusterAssignment;
use crate::error::{ProfilerError, Result};
use crate::geometry::NUM_HEADS;
use crate::oracle::OracleProvenance;
use crate::persistence::{atomic_write_json, load_json, remove_if_exists};
use crate::profile::{BuildReport, ProfileMatrix};
use crate::projection::Projection;
use crate::stability::StabilityScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything one build produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBundle {
    /// 144 × (sentences × 5) features; clustering input.
    pub features: ProfileMatrix,
    pub assignment: ClusterAssignment,
    /// Display-only 3-D coordinates.
    pub projection: Projection,
    pub stability: StabilityScore,
    pub oracle: OracleProvenance,
    pub corpus_size: usize,
    #[serde(default)]
    pub report: BuildReport,
    pub built_at: DateTime<Utc>,
}

impl ProfileBundle {
    /// Structural checks applied to every bundle read from disk.
    pub fn validate(&self) -> Result<()> {
        if self.features.num_rows() != NUM_HEADS {
            return Err(ProfilerError::cache(format!(
                "feature matrix has {} rows",
                self.features.num_rows()
            )));
        }
        // Re-run the constructor checks; serde bypasses them.
        ProfileMatrix::from_rows(self.features.rows().to_vec())
            .map_err(|e| ProfilerError::cache(format!("feature matrix is malformed: {e}")))?;
        if self.features.num_sentences() != self.corpus_size {
            return Err(ProfilerError::cache(format!(
                "feature matrix covers {} sentences, bundle says {}",
                self.features.num_sentences(),
                self.corpus_size
            )));
        }
        if !self.features.is_finite() {
            return Err(ProfilerError::cache("feature matrix has non-finite values"));
        }
        ClusterAssignment::new(self.assignment.ids().to_vec())?;
        if self.projection.len() != NUM_HEADS || !self.projection.is_finite() {
            return Err(ProfilerError::cache("projection is malformed"));
        }
        if !(0.0..=1.0).contains(&self.stability.score) || !self.stability.std.is_finite() {
            return Err(ProfilerError::cache("stability score out of range"));
        }
        Ok(())
    }
}

/// Fixed-location store for one [`ProfileBundle`].
#[derive(Debug, Clone)]
pub struct ProfileCache {
    path: PathBuf,
}

impl ProfileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the bundle. Missing, unreadable, undecodable or malformed
    /// artifacts are all reported as a miss (`None`), never as an error.
    pub fn load(&self) -> Option<ProfileBundle> {
        let bundle: ProfileBundle = match load_json(&self.path) {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                info!(path = %self.path.display(), "No cached attention profiles");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable profile cache");
                return None;
            }
        };
        if let Err(e) = bundle.validate() {
            warn!(path = %self.path.display(), error = %e, "Ignoring malformed profile cache");
            return None;
        }
        info!(path = %self.path.display(), "Loaded cached attention profiles");
        Some(bundle)
    }

    pub fn save(&self, bundle: &ProfileBundle) -> Result<()> {
        atomic_write_json(&self.path, bundle).map_err(|e| {
            ProfilerError::cache(format!("failed to write {}: {e}", self.path.display()))
        })?;
        info!(path = %self.path.display(), "Cached attention profiles");
        Ok(())
    }

    /// Delete the artifact. Returns whether anything was removed.
    pub fn invalidate(&self) -> Result<bool> {
        let removed = remove_if_exists(&self.path)?;
        if removed {
            info!(path = %self.path.display(), "Invalidated profile cache");
        }
        Ok(removed)
    }
}
