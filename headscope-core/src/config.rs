//! Configuration for headscope.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> environment -> explicit overrides. Configuration is
//! read from `~/.config/headscope/config.toml` and/or
//! `.headscope/config.toml` in the workspace directory.

use crate::error::{ProfilerError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level profiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Location of the persisted profile bundle. Relative paths resolve
    /// against the workspace.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Seed shared by k-means, t-SNE and the synthetic oracle.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub examples: ExamplesConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            seed: default_seed(),
            clustering: ClusteringConfig::default(),
            projection: ProjectionConfig::default(),
            stability: StabilityConfig::default(),
            examples: ExamplesConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".headscope/attention_profiles.json")
}

fn default_seed() -> u64 {
    42
}

/// K-means parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Number of k-means++ restarts; the lowest-inertia run wins.
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Stop when no centroid moves further than this.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_init: default_n_init(),
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
        }
    }
}

fn default_n_init() -> usize {
    10
}

fn default_max_iterations() -> usize {
    300
}

fn default_convergence_threshold() -> f64 {
    1e-6
}

/// t-SNE parameters for the display-only 3-D projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_perplexity")]
    pub perplexity: f64,
    #[serde(default = "default_tsne_iterations")]
    pub iterations: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_early_exaggeration")]
    pub early_exaggeration: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            perplexity: default_perplexity(),
            iterations: default_tsne_iterations(),
            learning_rate: default_learning_rate(),
            early_exaggeration: default_early_exaggeration(),
        }
    }
}

fn default_perplexity() -> f64 {
    30.0
}

fn default_tsne_iterations() -> usize {
    1000
}

fn default_learning_rate() -> f64 {
    200.0
}

fn default_early_exaggeration() -> f64 {
    12.0
}

/// Stability estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Number of perturbed re-clusterings compared pairwise.
    #[serde(default = "default_stability_runs")]
    pub runs: usize,
    /// Noise amplitude as a fraction of each column's standard deviation.
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            runs: default_stability_runs(),
            noise_scale: default_noise_scale(),
        }
    }
}

fn default_stability_runs() -> usize {
    10
}

fn default_noise_scale() -> f64 {
    0.05
}

/// Head-example scan parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplesConfig {
    /// How many leading corpus sentences to scan.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Minimum peak weight for a sentence to count as an example.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for ExamplesConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            threshold: default_threshold(),
            limit: default_limit(),
        }
    }
}

fn default_sample_size() -> usize {
    10
}

fn default_threshold() -> f32 {
    0.2
}

fn default_limit() -> usize {
    3
}

/// Attention oracle selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Program and arguments of an external oracle (empty = none configured).
    #[serde(default)]
    pub command: Vec<String>,
    /// Substitute synthetic attention when the oracle is unavailable.
    #[serde(default = "default_true")]
    pub allow_synthetic_fallback: bool,
    /// Skip the configured oracle and use synthetic attention directly.
    #[serde(default)]
    pub force_synthetic: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            allow_synthetic_fallback: true,
            force_synthetic: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl ProfilerConfig {
    /// Reject values the algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.clustering.n_init == 0 {
            return Err(ProfilerError::config("clustering.n_init must be >= 1"));
        }
        if self.clustering.max_iterations == 0 {
            return Err(ProfilerError::config("clustering.max_iterations must be >= 1"));
        }
        if !(self.clustering.convergence_threshold > 0.0 && self.clustering.convergence_threshold.is_finite()) {
            return Err(ProfilerError::config(
                "clustering.convergence_threshold must be > 0",
            ));
        }
        if !(self.projection.perplexity > 0.0 && self.projection.perplexity.is_finite()) {
            return Err(ProfilerError::config(
                "projection.perplexity must be finite and > 0",
            ));
        }
        if !(self.projection.learning_rate > 0.0 && self.projection.learning_rate.is_finite()) {
            return Err(ProfilerError::config(
                "projection.learning_rate must be finite and > 0",
            ));
        }
        if !(self.projection.early_exaggeration >= 1.0
            && self.projection.early_exaggeration.is_finite())
        {
            return Err(ProfilerError::config(
                "projection.early_exaggeration must be finite and >= 1",
            ));
        }
        if self.stability.runs < 2 {
            return Err(ProfilerError::config("stability.runs must be >= 2"));
        }
        if !(self.stability.noise_scale >= 0.0 && self.stability.noise_scale.is_finite()) {
            return Err(ProfilerError::config(
                "stability.noise_scale must be finite and >= 0",
            ));
        }
        if !(self.examples.threshold >= 0.0 && self.examples.threshold.is_finite()) {
            return Err(ProfilerError::config(
                "examples.threshold must be finite and >= 0",
            ));
        }
        Ok(())
    }

    /// The cache path, anchored at `workspace` when relative.
    pub fn resolved_cache_path(&self, workspace: &Path) -> PathBuf {
        if self.cache_path.is_absolute() {
            self.cache_path.clone()
        } else {
            workspace.join(&self.cache_path)
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProfilerError::config(e.to_string()))
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `HEADSCOPE_`, `__` for nesting)
/// 3. Workspace-local config (`.headscope/config.toml`)
/// 4. User config (`~/.config/headscope/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ProfilerConfig>,
) -> std::result::Result<ProfilerConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ProfilerConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "headscope", "headscope") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".headscope").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // HEADSCOPE_SEED, HEADSCOPE_CLUSTERING__N_INIT, ...
    figment = figment.merge(Env::prefixed("HEADSCOPE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> std::result::Result<ProfilerConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(ProfilerConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HEADSCOPE_").split("__"))
        .extract()
        .map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.clustering.n_init, 10);
        assert_eq!(config.projection.perplexity, 30.0);
        assert_eq!(config.examples.threshold, 0.2);
        assert_eq!(config.examples.sample_size, 10);
        assert!(config.oracle.allow_synthetic_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: ProfilerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ProfilerConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ProfilerConfig::default();
        config.stability.runs = 1;
        assert!(config.validate().is_err());

        let mut config = ProfilerConfig::default();
        config.clustering.n_init = 0;
        assert!(config.validate().is_err());

        let mut config = ProfilerConfig::default();
        config.projection.perplexity = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_values() {
        let cases: [fn(&mut ProfilerConfig); 6] = [
            |c| c.stability.noise_scale = f64::INFINITY,
            |c| c.projection.learning_rate = f64::INFINITY,
            |c| c.projection.perplexity = f64::INFINITY,
            |c| c.projection.early_exaggeration = f64::NAN,
            |c| c.clustering.convergence_threshold = f64::INFINITY,
            |c| c.examples.threshold = f32::INFINITY,
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = ProfilerConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ProfilerError::Config(_))),
                "case {i} accepted"
            );
        }

        let mut config = ProfilerConfig::default();
        config.projection.early_exaggeration = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_cache_path() {
        let config = ProfilerConfig::default();
        let resolved = config.resolved_cache_path(Path::new("/work"));
        assert_eq!(
            resolved,
            PathBuf::from("/work/.headscope/attention_profiles.json")
        );
    }

    #[test]
    fn test_workspace_config_layer() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".headscope");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "seed = 7\n[clustering]\nn_init = 3\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.clustering.n_init, 3);
        assert_eq!(config.clustering.max_iterations, 300);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = ProfilerConfig {
            seed: 99,
            ..Default::default()
        };
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = ProfilerConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("seed = 42"));
        let parsed: ProfilerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
