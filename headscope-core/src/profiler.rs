//! The profiler object: owns the oracle, corpus, cache and built state.
//!
//! State moves one way, from empty to built; it is only dropped by
//! [`HeadProfiler::invalidate`]. Query methods build lazily on first use.
//! Nothing here synchronizes concurrent first access across processes: two
//! processes cold-starting against the same cache path may both build.

use crate::cache::{ProfileBundle, ProfileCache};
use crate::clustering::cluster_heads;
use crate::config::ProfilerConfig;
use crate::corpus::Corpus;
use crate::error::{ProfilerError, Result};
use crate::geometry::{HeadId, check_cluster_id};
use crate::oracle::{AttentionOracle, OracleProvenance, oracle_from_config};
use crate::profile::build_profile_matrix;
use crate::projection::project_3d;
use crate::query::{
    self, AttentionSlice, ClusterInfo, HeadExample, HeadExplanation, LayerClusterCounts,
    ProfilerMetadata, VisualizationPoint,
};
use crate::stability::estimate_stability;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub struct HeadProfiler {
    config: ProfilerConfig,
    oracle: Box<dyn AttentionOracle>,
    corpus: Corpus,
    cache: ProfileCache,
    state: Option<ProfileBundle>,
}

impl HeadProfiler {
    /// A profiler over the standard probe corpus.
    pub fn new(config: ProfilerConfig, oracle: Box<dyn AttentionOracle>, cache: ProfileCache) -> Self {
        Self {
            config,
            oracle,
            corpus: Corpus::standard(),
            cache,
            state: None,
        }
    }

    /// Validate `config`, resolve its oracle and anchor its cache path at
    /// `workspace`.
    pub fn from_config(config: ProfilerConfig, workspace: &Path) -> Result<Self> {
        config.validate()?;
        let oracle = oracle_from_config(&config.oracle, config.seed)?;
        let cache = ProfileCache::new(config.resolved_cache_path(workspace));
        Ok(Self::new(config, oracle, cache))
    }

    pub fn with_corpus(mut self, corpus: Corpus) -> Self {
        self.corpus = corpus;
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn oracle(&self) -> &dyn AttentionOracle {
        self.oracle.as_ref()
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// The built state, if any. Never triggers a build.
    pub fn bundle(&self) -> Option<&ProfileBundle> {
        self.state.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Adopt the cached bundle if one is on disk. Returns whether it was.
    pub fn load(&mut self) -> bool {
        match self.cache.load() {
            Some(bundle) => {
                self.state = Some(bundle);
                true
            }
            None => false,
        }
    }

    /// Run the full pipeline, replacing any current state, and persist it.
    ///
    /// A failed cache write is logged; the freshly built state is still kept.
    pub fn build(&mut self) -> Result<&ProfileBundle> {
        if self.corpus.is_empty() {
            return Err(ProfilerError::invalid_input("corpus is empty"));
        }
        let started = Instant::now();
        let seed = self.config.seed;

        let (features, report) = build_profile_matrix(self.oracle.as_ref(), &self.corpus);
        let assignment = cluster_heads(&features, seed, &self.config.clustering)?;
        let projection = project_3d(&features, &self.config.projection, seed);
        let stability = estimate_stability(
            &features,
            seed,
            &self.config.clustering,
            &self.config.stability,
        )?;

        let bundle = ProfileBundle {
            features,
            assignment,
            projection,
            stability,
            oracle: OracleProvenance::of(self.oracle.as_ref()),
            corpus_size: self.corpus.len(),
            report,
            built_at: Utc::now(),
        };
        if let Err(e) = self.cache.save(&bundle) {
            warn!(error = %e, "Profile built but not cached");
        }

        info!(
            stability = bundle.stability.score,
            oracle = %bundle.oracle.name,
            synthetic = bundle.oracle.synthetic,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Profiling complete"
        );
        Ok(self.state.insert(bundle))
    }

    /// Built state, loading it from the cache or building it if needed.
    pub fn ensure(&mut self) -> Result<&ProfileBundle> {
        if self.state.is_none() && !self.load() {
            self.build()?;
        }
        self.state
            .as_ref()
            .ok_or_else(|| ProfilerError::cache("profile state missing after build"))
    }

    /// Drop the in-memory state and delete the cache file.
    pub fn invalidate(&mut self) -> Result<bool> {
        self.state = None;
        self.cache.invalidate()
    }

    fn ensure_for(&mut self, operation: &str) -> Result<&ProfileBundle> {
        self.ensure()
            .map_err(|e| ProfilerError::operation_failed(operation, e))
    }

    pub fn visualization_points(&mut self) -> Result<Vec<VisualizationPoint>> {
        Ok(query::visualization_points(self.ensure_for("visualization points")?))
    }

    /// Example sentences for a head. `limit` defaults to the configured one.
    pub fn head_examples(
        &mut self,
        layer: usize,
        head: usize,
        limit: Option<usize>,
    ) -> Result<Vec<HeadExample>> {
        let head = HeadId::new(layer, head)?;
        self.ensure_for("head examples")?;
        let limit = limit.unwrap_or(self.config.examples.limit);
        Ok(query::head_examples(
            self.oracle.as_ref(),
            &self.corpus,
            head,
            &self.config.examples,
            limit,
        ))
    }

    pub fn cluster_info(&mut self, cluster_id: usize) -> Result<ClusterInfo> {
        check_cluster_id(cluster_id)?;
        let bundle = self.ensure_for("cluster info")?;
        query::cluster_info(bundle, cluster_id)
            .map_err(|e| ProfilerError::operation_failed("cluster info", e))
    }

    pub fn head_explanation(&mut self, layer: usize, head: usize) -> Result<HeadExplanation> {
        let head = HeadId::new(layer, head)?;
        let bundle = self.ensure_for("head explanation")?;
        query::head_explanation(bundle, head)
            .map_err(|e| ProfilerError::operation_failed("head explanation", e))
    }

    pub fn layer_distribution(&mut self) -> Result<Vec<LayerClusterCounts>> {
        Ok(query::layer_distribution(self.ensure_for("layer distribution")?))
    }

    pub fn metadata(&mut self) -> Result<ProfilerMetadata> {
        Ok(query::metadata(self.ensure_for("metadata")?))
    }

    /// One head's attention on arbitrary text, straight from the oracle.
    pub fn attention_slice(&self, text: &str, layer: usize, head: usize) -> Result<AttentionSlice> {
        let head = HeadId::new(layer, head)?;
        query::attention_slice(self.oracle.as_ref(), text, head)
            .map_err(|e| ProfilerError::operation_failed("attention analysis", e))
    }
}

impl std::fmt::Debug for HeadProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadProfiler")
            .field("oracle", &self.oracle.name())
            .field("corpus", &self.corpus.len())
            .field("cache", &self.cache.path())
            .field("ready", &self.state.is_some())
            .finish()
    }
}
