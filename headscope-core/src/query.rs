//! Read-side views over a built [`ProfileBundle`].
//!
//! Every function here is pure with respect to the bundle: calling one twice
//! on the same bundle yields identical records. The records are what the CLI
//! prints, so every float in them is finite.

use crate::cache::ProfileBundle;
use crate::clustering::{cluster_description, cluster_label, label_table};
use crate::config::ExamplesConfig;
use crate::corpus::Corpus;
use crate::error::{ProfilerError, Result};
use crate::features::FEATURE_NAMES;
use crate::geometry::{HEADS_PER_LAYER, HeadId, NUM_CLUSTERS, NUM_HEADS, NUM_LAYERS, check_cluster_id};
use crate::oracle::{AttentionOracle, OracleProvenance};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// States which space the clusters live in, sized to the bundle's feature width.
pub fn projection_disclaimer(dimensions: usize) -> String {
    format!(
        "Clusters are computed in the original {dimensions}-dimensional feature space; the 3D projection is for visualization only."
    )
}

const SELF_ATTENTION_TAG_THRESHOLD: f64 = 0.3;
const LOW_ENTROPY_THRESHOLD: f64 = 2.0;

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// One head in the 3-D scatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub layer: usize,
    pub head: usize,
    pub cluster: usize,
    pub label: String,
    pub name: String,
}

pub fn visualization_points(bundle: &ProfileBundle) -> Vec<VisualizationPoint> {
    HeadId::all()
        .map(|head| {
            let [x, y, z] = bundle.projection.get(head.index()).unwrap_or([0.0; 3]);
            let cluster = bundle.assignment.cluster_of(head);
            VisualizationPoint {
                x,
                y,
                z,
                layer: head.layer,
                head: head.head,
                cluster,
                label: cluster_label(cluster),
                name: head.to_string(),
            }
        })
        .collect()
}

/// Strongest token-to-token link of a head on one sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadExample {
    pub sentence: String,
    pub tokens: Vec<String>,
    pub from_token: String,
    pub to_token: String,
    pub weight: f32,
    pub from_pos: usize,
    pub to_pos: usize,
}

/// Sentences from the head of the corpus on which `head` attends sharply.
///
/// Each of the first `sample_size` sentences contributes its single
/// strongest (query, key) pair when that weight exceeds `threshold`.
/// Sentences the oracle fails on, or whose tensor lacks the head, are
/// skipped. Results are sorted by weight, strongest first, and cut to
/// `limit`.
pub fn head_examples(
    oracle: &dyn AttentionOracle,
    corpus: &Corpus,
    head: HeadId,
    config: &ExamplesConfig,
    limit: usize,
) -> Vec<HeadExample> {
    let mut examples = Vec::new();
    for sentence in corpus.sample(config.sample_size) {
        let output = match oracle.attend(sentence) {
            Ok(output) => output,
            Err(e) => {
                debug!(head = %head, error = %e, "Skipping example sentence");
                continue;
            }
        };
        let Some((from_pos, to_pos, weight)) = output
            .attention
            .matrix(head.layer, head.head)
            .and_then(|m| m.argmax())
        else {
            continue;
        };
        if !weight.is_finite() || weight <= config.threshold {
            continue;
        }
        let token_at = |pos: usize| output.tokens.get(pos).cloned().unwrap_or_default();
        examples.push(HeadExample {
            sentence: sentence.clone(),
            from_token: token_at(from_pos),
            to_token: token_at(to_pos),
            tokens: output.tokens.clone(),
            weight,
            from_pos,
            to_pos,
        });
    }
    examples.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    examples.truncate(limit);
    examples
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfo {
    pub cluster_id: usize,
    pub label: String,
    pub num_heads: usize,
    pub heads: Vec<HeadId>,
    pub description: String,
}

pub fn cluster_info(bundle: &ProfileBundle, cluster_id: usize) -> Result<ClusterInfo> {
    check_cluster_id(cluster_id)?;
    let heads = bundle.assignment.members(cluster_id);
    Ok(ClusterInfo {
        cluster_id,
        label: cluster_label(cluster_id),
        num_heads: heads.len(),
        heads,
        description: cluster_description(cluster_id).to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedFeature {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadExplanation {
    pub layer: usize,
    pub head: usize,
    pub cluster: String,
    pub cluster_id: usize,
    pub features: Vec<NamedFeature>,
    pub explanations: Vec<String>,
}

/// Average a head's features over the corpus and turn them into tags.
pub fn head_explanation(bundle: &ProfileBundle, head: HeadId) -> Result<HeadExplanation> {
    let averages = bundle.features.feature_averages(head).ok_or_else(|| {
        ProfilerError::invalid_input(format!("no feature row for head {head}"))
    })?;
    let cluster_id = bundle.assignment.cluster_of(head);

    let mut explanations = Vec::new();
    if averages.self_attention > SELF_ATTENTION_TAG_THRESHOLD {
        let pct = (averages.self_attention * 100.0).trunc() as i64;
        explanations.push(format!("{pct}% self-attention"));
    }
    if averages.entropy < LOW_ENTROPY_THRESHOLD {
        explanations.push("Low entropy (sharp attention)".to_string());
    }
    if averages.forward > averages.backward {
        explanations.push("Forward-looking".to_string());
    } else if averages.backward > averages.forward {
        explanations.push("Backward-looking".to_string());
    }
    if explanations.is_empty() {
        explanations.push("Standard pattern".to_string());
    }

    let features = FEATURE_NAMES
        .iter()
        .zip(averages.to_array())
        .map(|(name, value)| NamedFeature {
            name: (*name).to_string(),
            value: round3(value),
        })
        .collect();

    Ok(HeadExplanation {
        layer: head.layer,
        head: head.head,
        cluster: cluster_label(cluster_id),
        cluster_id,
        features,
        explanations,
    })
}

/// Cluster membership counts of one layer's heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerClusterCounts {
    pub layer: usize,
    pub name: String,
    /// Label → number of heads; labels with no heads are omitted.
    pub counts: BTreeMap<String, usize>,
}

pub fn layer_distribution(bundle: &ProfileBundle) -> Vec<LayerClusterCounts> {
    (0..NUM_LAYERS)
        .map(|layer| {
            let mut per_id = [0usize; NUM_CLUSTERS];
            for head in 0..HEADS_PER_LAYER {
                let cluster = bundle.assignment.cluster_of(HeadId { layer, head });
                per_id[cluster] += 1;
            }
            let counts = per_id
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count > 0)
                .map(|(id, &count)| (cluster_label(id), count))
                .collect();
            LayerClusterCounts {
                layer,
                name: format!("Layer {layer}"),
                counts,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilerMetadata {
    pub num_heads: usize,
    pub num_clusters: usize,
    pub num_sentences: usize,
    pub stability_score: f64,
    pub stability_std: f64,
    pub features: Vec<String>,
    pub disclaimer: String,
    pub cluster_labels: BTreeMap<usize, String>,
    pub oracle: OracleProvenance,
    pub built_at: DateTime<Utc>,
}

pub fn metadata(bundle: &ProfileBundle) -> ProfilerMetadata {
    ProfilerMetadata {
        num_heads: NUM_HEADS,
        num_clusters: NUM_CLUSTERS,
        num_sentences: bundle.corpus_size,
        stability_score: round3(bundle.stability.score),
        stability_std: round3(bundle.stability.std),
        features: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
        disclaimer: projection_disclaimer(bundle.features.num_columns()),
        cluster_labels: label_table(),
        oracle: bundle.oracle.clone(),
        built_at: bundle.built_at,
    }
}

/// Raw attention of one head on arbitrary text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionSlice {
    pub tokens: Vec<String>,
    pub attention_matrix: Vec<Vec<f32>>,
    pub layer: usize,
    pub head: usize,
}

/// Ask the oracle for `text` and cut out one head. Bypasses the cache.
pub fn attention_slice(
    oracle: &dyn AttentionOracle,
    text: &str,
    head: HeadId,
) -> Result<AttentionSlice> {
    let output = oracle.attend(text)?;
    let matrix = output
        .attention
        .matrix(head.layer, head.head)
        .ok_or_else(|| {
            ProfilerError::oracle(format!(
                "oracle tensor has {}x{} heads, {head} not covered",
                output.attention.layers(),
                output.attention.heads()
            ))
        })?;
    Ok(AttentionSlice {
        attention_matrix: matrix.to_rows(),
        tokens: output.tokens,
        layer: head.layer,
        head: head.head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusterAssignment;
    use crate::oracle::{AttentionOutput, AttentionTensor, Availability, UniformOracle};
    use crate::profile::{BuildReport, ProfileMatrix};
    use crate::projection::Projection;
    use crate::stability::StabilityScore;
    use pretty_assertions::assert_eq;

    /// Two sentences; head h gets self-attention h/12 and entropy h/4.
    fn bundle() -> ProfileBundle {
        let rows = (0..NUM_HEADS)
            .map(|idx| {
                let h = (idx % 12) as f64;
                let one = [h / 12.0, 0.1, 0.2, h / 4.0, 0.5];
                one.iter().chain(one.iter()).copied().collect()
            })
            .collect();
        ProfileBundle {
            features: ProfileMatrix::from_rows(rows).unwrap(),
            assignment: ClusterAssignment::new((0..NUM_HEADS).map(|i| (i % 12) % 5).collect())
                .unwrap(),
            projection: Projection::new((0..NUM_HEADS).map(|i| [i as f64, 0.0, 1.0]).collect()),
            stability: StabilityScore {
                score: 0.87654,
                std: 0.01234,
                runs: 10,
            },
            oracle: OracleProvenance {
                name: "uniform".into(),
                synthetic: true,
            },
            corpus_size: 2,
            report: BuildReport::default(),
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_visualization_points() {
        let points = visualization_points(&bundle());
        assert_eq!(points.len(), 144);
        let p = &points[13];
        assert_eq!((p.layer, p.head, p.name.as_str()), (1, 1, "L1H1"));
        assert_eq!(p.x, 13.0);
        assert_eq!(p.cluster, 1);
        assert_eq!(p.label, "Semantic Linkers");
    }

    #[test]
    fn test_cluster_info_rejects_bad_id() {
        let err = cluster_info(&bundle(), 5).unwrap_err();
        assert!(matches!(err, ProfilerError::InvalidIndex { .. }));
    }

    #[test]
    fn test_cluster_info() {
        let info = cluster_info(&bundle(), 0).unwrap();
        assert_eq!(info.label, "Syntax Trackers");
        // heads 0, 5, 10 of every layer
        assert_eq!(info.num_heads, 36);
        assert_eq!(info.heads[1], HeadId { layer: 0, head: 5 });
    }

    #[test]
    fn test_head_explanation_tags() {
        let b = bundle();
        // head 6: self 0.5, entropy 1.5, backward > forward
        let e = head_explanation(&b, HeadId { layer: 3, head: 6 }).unwrap();
        assert_eq!(
            e.explanations,
            vec![
                "50% self-attention".to_string(),
                "Low entropy (sharp attention)".to_string(),
                "Backward-looking".to_string(),
            ]
        );
        assert_eq!(e.features[0].name, "Self-attention ratio");
        assert_eq!(e.features[0].value, 0.5);
        assert_eq!(e.features[3].value, 1.5);
        assert_eq!(e.cluster_id, 1);

        // head 11: self 0.9166 → truncated to 91
        let e = head_explanation(&b, HeadId { layer: 0, head: 11 }).unwrap();
        assert_eq!(e.explanations[0], "91% self-attention");
        assert_eq!(e.features[0].value, 0.917);
    }

    #[test]
    fn test_head_explanation_standard_pattern() {
        let mut b = bundle();
        let mut rows = b.features.rows().to_vec();
        rows[0] = vec![0.1, 0.2, 0.2, 3.0, 0.4, 0.1, 0.2, 0.2, 3.0, 0.4];
        b.features = ProfileMatrix::from_rows(rows).unwrap();
        let e = head_explanation(&b, HeadId { layer: 0, head: 0 }).unwrap();
        assert_eq!(e.explanations, vec!["Standard pattern".to_string()]);
    }

    #[test]
    fn test_layer_distribution_omits_empty_clusters() {
        let dist = layer_distribution(&bundle());
        assert_eq!(dist.len(), 12);
        assert_eq!(dist[4].name, "Layer 4");
        // head ids 0..12 mod 5: three of 0 and 1, two each of 2, 3 and 4
        assert_eq!(dist[0].counts["Syntax Trackers"], 3);
        assert_eq!(dist[0].counts["Context Aggregators"], 2);
        let total: usize = dist.iter().flat_map(|l| l.counts.values()).sum();
        assert_eq!(total, 144);

        let mut b = bundle();
        b.assignment = ClusterAssignment::new(vec![2; 144]).unwrap();
        let dist = layer_distribution(&b);
        assert_eq!(dist[7].counts.len(), 1);
        assert_eq!(dist[7].counts["Positional Encoders"], 12);
    }

    #[test]
    fn test_metadata() {
        let meta = metadata(&bundle());
        assert_eq!(meta.num_heads, 144);
        assert_eq!(meta.num_clusters, 5);
        assert_eq!(meta.num_sentences, 2);
        assert_eq!(meta.stability_score, 0.877);
        assert_eq!(meta.stability_std, 0.012);
        assert_eq!(meta.features.len(), 5);
        // two sentences of five features each
        assert!(meta.disclaimer.contains("original 10-dimensional feature space"));
        assert_eq!(
            projection_disclaimer(250),
            "Clusters are computed in the original 250-dimensional feature space; the 3D projection is for visualization only."
        );
        assert!(meta.oracle.synthetic);
    }

    struct PeakOracle;

    impl AttentionOracle for PeakOracle {
        fn name(&self) -> &str {
            "peak"
        }
        fn availability(&self) -> Availability {
            Availability::Available
        }
        fn attend(&self, text: &str) -> Result<AttentionOutput> {
            if text.contains("skip") {
                return Err(ProfilerError::oracle("no"));
            }
            // Peak weight grows with sentence length; it sits past the last token.
            let tokens: Vec<String> = text.split_whitespace().map(String::from).collect();
            let n = tokens.len() + 1;
            let peak = tokens.len() as f32 / 10.0;
            let mut data = vec![0.0f32; 12 * 12 * n * n];
            for block in data.chunks_exact_mut(n * n) {
                block[n - 1] = peak;
            }
            Ok(AttentionOutput {
                tokens,
                attention: AttentionTensor::new(12, 12, n, data)?,
            })
        }
    }

    #[test]
    fn test_head_examples_threshold_sort_and_limit() {
        let corpus = Corpus::from_sentences([
            "a b",           // peak 0.2, not strictly above the threshold
            "a b c",         // 0.3
            "skip this one", // oracle failure
            "a b c d e",     // 0.5
            "a b c d",       // 0.4
            "a b c d e f g", // outside the sample
        ]);
        let config = ExamplesConfig {
            sample_size: 5,
            threshold: 0.2,
            limit: 3,
        };
        let examples = head_examples(&PeakOracle, &corpus, HeadId { layer: 2, head: 3 }, &config, 2);
        let weights: Vec<f32> = examples.iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![0.5, 0.4]);
        assert_eq!(examples[0].sentence, "a b c d e");
        assert_eq!((examples[0].from_pos, examples[0].to_pos), (0, 5));
        assert_eq!(examples[0].from_token, "a");
        assert_eq!(examples[0].to_token, "");
    }

    #[test]
    fn test_head_examples_uniform_never_qualifies_on_long_sentences() {
        let corpus = Corpus::from_sentences(["one two three four five six"]);
        let examples = head_examples(
            &UniformOracle::new(),
            &corpus,
            HeadId { layer: 0, head: 0 },
            &ExamplesConfig::default(),
            3,
        );
        assert!(examples.is_empty());
    }

    #[test]
    fn test_attention_slice() {
        let slice = attention_slice(&UniformOracle::new(), "x y", HeadId { layer: 11, head: 11 })
            .unwrap();
        assert_eq!(slice.tokens, vec!["x", "y"]);
        assert_eq!(slice.attention_matrix, vec![vec![0.5, 0.5], vec![0.5, 0.5]]);
        assert_eq!((slice.layer, slice.head), (11, 11));
    }

    #[test]
    fn test_attention_slice_small_tensor() {
        let oracle = UniformOracle::with_shape(2, 2);
        let err = attention_slice(&oracle, "x y", HeadId { layer: 5, head: 0 }).unwrap_err();
        assert!(matches!(err, ProfilerError::Oracle(_)));
    }
}
