//! # headscope-core: attention head profiling and clustering
//!
//! Profiles every head of a 12-layer, 12-head transformer against a fixed
//! probe corpus, groups the heads into five behavioral clusters and answers
//! queries about the result.
//!
//! ## Pipeline
//!
//! 1. **Oracle**: an [`AttentionOracle`] turns each sentence into attention weights
//! 2. **Features**: five scalars per (head, sentence) attention matrix
//! 3. **Clustering**: k-means over the 144 × (sentences × 5) profile matrix
//! 4. **Projection / stability**: display-only t-SNE coordinates and an ARI score
//! 5. **Cache**: the bundle is persisted and reused until invalidated
//!
//! [`HeadProfiler`] owns the whole lifecycle; [`query`] holds the read-side views.

// Foundation
pub mod config;
pub mod error;
pub mod geometry;
pub mod persistence;

// Inputs
pub mod corpus;
pub mod oracle;

// Pipeline
pub mod clustering;
pub mod features;
pub mod profile;
pub mod projection;
pub mod stability;

// State and queries
pub mod cache;
pub mod profiler;
pub mod query;

// Re-exports
pub use cache::{ProfileBundle, ProfileCache};
pub use config::{ProfilerConfig, load_config, load_config_file};
pub use corpus::Corpus;
pub use error::{ProfilerError, Result};
pub use geometry::HeadId;
pub use oracle::{AttentionOracle, AttentionOutput, AttentionTensor, Availability};
pub use profiler::HeadProfiler;
