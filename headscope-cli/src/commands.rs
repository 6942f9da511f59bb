//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use headscope_core::config::{ProfilerConfig, load_config, load_config_file};
use headscope_core::oracle::configured_oracle;
use headscope_core::{Availability, Corpus, HeadProfiler, ProfileCache};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

/// Global flags that shape how a command runs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub synthetic: bool,
}

impl Settings {
    /// Layered configuration with the command-line flags applied on top.
    pub fn config(&self) -> anyhow::Result<ProfilerConfig> {
        let mut config = match &self.config_file {
            Some(path) => load_config_file(path),
            None => load_config(Some(&self.workspace), None),
        }
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
        if self.synthetic {
            config.oracle.force_synthetic = true;
        }
        Ok(config)
    }

    fn profiler(&self) -> anyhow::Result<HeadProfiler> {
        Ok(HeadProfiler::from_config(self.config()?, &self.workspace)?)
    }
}

#[derive(Debug, Serialize)]
struct BuildSummary {
    cache_path: PathBuf,
    rebuilt: bool,
    built_at: String,
    stability_score: f64,
    oracle: String,
    synthetic: bool,
    sentences: usize,
    oracle_failures: usize,
    zero_filled: usize,
}

/// Run a subcommand and return what it prints.
pub fn handle_command(command: Commands, settings: &Settings) -> anyhow::Result<Value> {
    match command {
        Commands::Build { force } => handle_build(force, settings),
        Commands::Status => handle_status(settings),
        Commands::Points => Ok(json!({ "points": settings.profiler()?.visualization_points()? })),
        Commands::Examples { layer, head, limit } => {
            let examples = settings.profiler()?.head_examples(layer, head, limit)?;
            Ok(json!({ "layer": layer, "head": head, "examples": examples }))
        }
        Commands::Cluster { id } => Ok(serde_json::to_value(settings.profiler()?.cluster_info(id)?)?),
        Commands::Explain { layer, head } => Ok(serde_json::to_value(
            settings.profiler()?.head_explanation(layer, head)?,
        )?),
        Commands::Distribution => Ok(json!({
            "distribution": settings.profiler()?.layer_distribution()?
        })),
        Commands::Metadata => Ok(serde_json::to_value(settings.profiler()?.metadata()?)?),
        Commands::Analyze { text, layer, head } => Ok(serde_json::to_value(
            settings.profiler()?.attention_slice(&text, layer, head)?,
        )?),
        Commands::Invalidate => {
            let mut profiler = settings.profiler()?;
            let removed = profiler.invalidate()?;
            Ok(json!({
                "cache_path": profiler.cache().path(),
                "removed": removed,
            }))
        }
        Commands::Config { action } => handle_config(action, settings),
    }
}

fn handle_build(force: bool, settings: &Settings) -> anyhow::Result<Value> {
    let mut profiler = settings.profiler()?;
    let rebuilt = force || !profiler.load();
    if rebuilt {
        profiler.build()?;
    } else {
        info!("Using cached profile; pass --force to rebuild");
    }
    let cache_path = profiler.cache().path().to_path_buf();
    let bundle = profiler.ensure()?;
    let summary = BuildSummary {
        cache_path,
        rebuilt,
        built_at: bundle.built_at.to_rfc3339(),
        stability_score: bundle.stability.score,
        oracle: bundle.oracle.name.clone(),
        synthetic: bundle.oracle.synthetic,
        sentences: bundle.corpus_size,
        oracle_failures: bundle.report.oracle_failures,
        zero_filled: bundle.report.zero_filled,
    };
    Ok(serde_json::to_value(summary)?)
}

fn handle_status(settings: &Settings) -> anyhow::Result<Value> {
    let config = settings.config()?;
    config.validate()?;
    let oracle = match configured_oracle(&config.oracle, config.seed) {
        Some(oracle) => json!({
            "name": oracle.name(),
            "synthetic": oracle.is_synthetic(),
            "availability": oracle.availability(),
        }),
        None => json!({
            "name": Value::Null,
            "synthetic": false,
            "availability": Availability::Unavailable {
                reason: "no oracle command configured".into(),
            },
        }),
    };
    let cache = ProfileCache::new(config.resolved_cache_path(&settings.workspace));
    let cached = cache.load().map(|bundle| {
        json!({
            "built_at": bundle.built_at,
            "stability_score": bundle.stability.score,
            "oracle": bundle.oracle,
            "sentences": bundle.corpus_size,
        })
    });
    Ok(json!({
        "workspace": settings.workspace,
        "cache_path": cache.path(),
        "cached": cached,
        "oracle": oracle,
        "synthetic_fallback": config.oracle.allow_synthetic_fallback,
        "corpus_size": Corpus::standard().len(),
    }))
}

fn handle_config(action: ConfigAction, settings: &Settings) -> anyhow::Result<Value> {
    match action {
        ConfigAction::Init => {
            let config_dir = settings.workspace.join(".headscope");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                return Ok(json!({ "config_path": config_path, "created": false }));
            }

            let toml_str = ProfilerConfig::default().to_toml()?;
            std::fs::write(&config_path, &toml_str)?;
            info!(path = %config_path.display(), "Created default configuration");
            Ok(json!({ "config_path": config_path, "created": true }))
        }
        ConfigAction::Show => {
            let config = settings.config()?;
            config.validate()?;
            Ok(serde_json::to_value(config)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const QUICK_CONFIG: &str = r#"
seed = 42

[clustering]
n_init = 2

[projection]
iterations = 250

[stability]
runs = 3
"#;

    fn settings(dir: &TempDir) -> Settings {
        let config_file = dir.path().join("quick.toml");
        std::fs::write(&config_file, QUICK_CONFIG).unwrap();
        Settings {
            workspace: dir.path().to_path_buf(),
            config_file: Some(config_file),
            cache: None,
            synthetic: true,
        }
    }

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let out = handle_command(
            Commands::Config {
                action: ConfigAction::Init,
            },
            &settings,
        )
        .unwrap();
        assert_eq!(out["created"], json!(true));

        let config_path = dir.path().join(".headscope").join("config.toml");
        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.seed, 42);
        assert_eq!(parsed.clustering.n_init, 10);
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let init = || {
            handle_command(
                Commands::Config {
                    action: ConfigAction::Init,
                },
                &settings,
            )
            .unwrap()
        };
        init();
        assert_eq!(init()["created"], json!(false));
    }

    #[test]
    fn test_config_show_applies_flags() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.cache = Some(PathBuf::from("elsewhere.json"));
        let out = handle_command(
            Commands::Config {
                action: ConfigAction::Show,
            },
            &settings,
        )
        .unwrap();
        assert_eq!(out["cache_path"], json!("elsewhere.json"));
        assert_eq!(out["oracle"]["force_synthetic"], json!(true));
        assert_eq!(out["stability"]["runs"], json!(3));
    }

    #[test]
    fn test_status_does_not_build() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let out = handle_command(Commands::Status, &settings).unwrap();
        assert_eq!(out["cached"], Value::Null);
        assert_eq!(out["oracle"]["name"], json!("synthetic"));
        assert_eq!(out["oracle"]["availability"]["status"], json!("available"));
        assert_eq!(out["corpus_size"], json!(50));
    }

    #[test]
    fn test_status_reports_unavailable_oracle_without_fallback() {
        let dir = TempDir::new().unwrap();
        let config_file = dir.path().join("strict.toml");
        std::fs::write(
            &config_file,
            "[oracle]\ncommand = [\"headscope-missing-oracle\"]\nallow_synthetic_fallback = false\n",
        )
        .unwrap();
        let settings = Settings {
            workspace: dir.path().to_path_buf(),
            config_file: Some(config_file),
            cache: None,
            synthetic: false,
        };
        let out = handle_command(Commands::Status, &settings).unwrap();
        assert_eq!(out["oracle"]["synthetic"], json!(false));
        assert_eq!(out["oracle"]["availability"]["status"], json!("unavailable"));
        assert_eq!(out["synthetic_fallback"], json!(false));
        assert_eq!(out["corpus_size"], json!(50));
    }

    #[test]
    fn test_status_without_oracle_command() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.synthetic = false;
        let out = handle_command(Commands::Status, &settings).unwrap();
        assert_eq!(out["oracle"]["name"], Value::Null);
        assert_eq!(
            out["oracle"]["availability"]["reason"],
            json!("no oracle command configured")
        );
    }

    #[test]
    fn test_build_then_query_then_invalidate() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);

        let built = handle_command(Commands::Build { force: false }, &settings).unwrap();
        assert_eq!(built["rebuilt"], json!(true));
        assert_eq!(built["synthetic"], json!(true));

        let again = handle_command(Commands::Build { force: false }, &settings).unwrap();
        assert_eq!(again["rebuilt"], json!(false));
        assert_eq!(again["built_at"], built["built_at"]);

        let status = handle_command(Commands::Status, &settings).unwrap();
        assert_eq!(status["cached"]["sentences"], json!(50));

        let explain = handle_command(Commands::Explain { layer: 3, head: 4 }, &settings).unwrap();
        assert_eq!(explain["features"].as_array().unwrap().len(), 5);

        let meta = handle_command(Commands::Metadata, &settings).unwrap();
        assert_eq!(meta["num_heads"], json!(144));
        assert_eq!(meta["oracle"]["synthetic"], json!(true));

        let removed = handle_command(Commands::Invalidate, &settings).unwrap();
        assert_eq!(removed["removed"], json!(true));
        let status = handle_command(Commands::Status, &settings).unwrap();
        assert_eq!(status["cached"], Value::Null);
    }

    #[test]
    fn test_invalid_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let err = handle_command(Commands::Cluster { id: 5 }, &settings).unwrap_err();
        assert!(err.to_string().contains("Invalid cluster index 5"));
    }

    #[test]
    fn test_analyze_uses_oracle_directly() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let out = handle_command(
            Commands::Analyze {
                text: "the cat sat".into(),
                layer: 1,
                head: 2,
            },
            &settings,
        )
        .unwrap();
        assert_eq!(out["tokens"], json!(["the", "cat", "sat"]));
        assert_eq!(out["attention_matrix"].as_array().unwrap().len(), 3);
        assert!(!dir.path().join(".headscope").exists());
    }
}
