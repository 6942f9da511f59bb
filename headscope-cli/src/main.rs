//! headscope CLI: explore the behavioral clusters of a transformer's
//! attention heads.
//!
//! Every command prints JSON to stdout; logs go to stderr and a rolling
//! JSON log file.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// headscope: attention head personality profiles
#[derive(Parser, Debug)]
#[command(name = "headscope", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.headscope/`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the user and workspace layers)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile cache location
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Use synthetic attention instead of the configured oracle
    #[arg(long)]
    synthetic: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Build the profile (reuses the cache unless --force)
    Build {
        /// Rebuild even when a cached profile exists
        #[arg(long)]
        force: bool,
    },
    /// Show oracle and cache state without building
    Status,
    /// 3-D points for every head
    Points,
    /// Example sentences where a head attends sharply
    Examples {
        layer: usize,
        head: usize,
        /// Maximum number of examples
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Members and description of one cluster
    Cluster {
        /// Cluster id (0-4)
        id: usize,
    },
    /// Averaged features and tags for one head
    Explain { layer: usize, head: usize },
    /// Cluster counts per layer
    Distribution,
    /// Counts, stability and feature names
    Metadata,
    /// Attention of one head on arbitrary text
    Analyze {
        text: String,
        #[arg(long, default_value_t = 0)]
        layer: usize,
        #[arg(long, default_value_t = 0)]
        head: usize,
    },
    /// Delete the cached profile
    Invalidate,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "headscope", "headscope")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "headscope.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let settings = commands::Settings {
        workspace,
        config_file: cli.config,
        cache: cli.cache,
        synthetic: cli.synthetic,
    };

    let output = commands::handle_command(cli.command, &settings)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
