//! Profile builder: one feature row per head across the whole corpus.

use crate::corpus::Corpus;
use crate::error::{ProfilerError, Result};
use crate::features::{FeatureVector, extract_features};
use crate::geometry::{FEATURES_PER_SENTENCE, HeadId, NUM_HEADS};
use crate::oracle::AttentionOracle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// `heads × (sentences × 5)` feature matrix, sentence-major within a row.
///
/// Row `h` holds the five features of head `h` for sentence 0, then
/// sentence 1, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatrix {
    rows: Vec<Vec<f64>>,
}

impl ProfileMatrix {
    /// Wrap rows, checking that the matrix is rectangular and its width is a
    /// whole number of sentences.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if width % FEATURES_PER_SENTENCE != 0 {
            return Err(ProfilerError::invalid_input(format!(
                "row width {width} is not a multiple of {FEATURES_PER_SENTENCE}"
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ProfilerError::invalid_input(format!(
                "row {i} has {} columns, expected {width}",
                row.len()
            )));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, head: HeadId) -> Option<&[f64]> {
        self.rows.get(head.index()).map(Vec::as_slice)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn num_sentences(&self) -> usize {
        self.num_columns() / FEATURES_PER_SENTENCE
    }

    /// The feature vector of `head` on sentence `sentence`.
    pub fn features(&self, head: HeadId, sentence: usize) -> Option<FeatureVector> {
        let row = self.row(head)?;
        let start = sentence * FEATURES_PER_SENTENCE;
        let slot = row.get(start..start + FEATURES_PER_SENTENCE)?;
        let mut values = [0.0; FEATURES_PER_SENTENCE];
        values.copy_from_slice(slot);
        Some(FeatureVector::from_array(values))
    }

    /// Per-feature mean of a head's row across all sentences.
    pub fn feature_averages(&self, head: HeadId) -> Option<FeatureVector> {
        let row = self.row(head)?;
        let sentences = self.num_sentences();
        let mut sums = [0.0; FEATURES_PER_SENTENCE];
        for chunk in row.chunks_exact(FEATURES_PER_SENTENCE) {
            for (sum, v) in sums.iter_mut().zip(chunk) {
                *sum += v;
            }
        }
        if sentences > 0 {
            for sum in &mut sums {
                *sum /= sentences as f64;
            }
        }
        Some(FeatureVector::from_array(sums))
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().flatten().all(|v| v.is_finite())
    }
}

/// Counters describing how a build went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub sentences: usize,
    pub oracle_failures: usize,
    /// (head, sentence) pairs filled with the zero vector.
    pub zero_filled: usize,
}

/// Run the oracle over the corpus and assemble the 144-row profile matrix.
///
/// The oracle is called once per sentence and its tensor shared by all
/// heads. A failed call, or a tensor too small to contain a head, fills the
/// affected (head, sentence) slots with zeros; the build always completes.
pub fn build_profile_matrix(
    oracle: &dyn AttentionOracle,
    corpus: &Corpus,
) -> (ProfileMatrix, BuildReport) {
    let mut rows = vec![Vec::with_capacity(corpus.len() * FEATURES_PER_SENTENCE); NUM_HEADS];
    let mut report = BuildReport {
        sentences: corpus.len(),
        ..Default::default()
    };

    info!(
        oracle = oracle.name(),
        sentences = corpus.len(),
        heads = NUM_HEADS,
        "Computing attention head profiles"
    );

    for (idx, sentence) in corpus.sentences().iter().enumerate() {
        let output = match oracle.attend(sentence) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(sentence = idx, error = %e, "Oracle failed, zero-filling sentence");
                report.oracle_failures += 1;
                None
            }
        };

        for head in HeadId::all() {
            let features = output
                .as_ref()
                .and_then(|o| o.attention.matrix(head.layer, head.head))
                .map(|m| extract_features(&m).sanitized());
            let features = match features {
                Some(f) => f,
                None => {
                    if output.is_some() {
                        debug!(sentence = idx, head = %head, "Head missing from oracle tensor");
                    }
                    report.zero_filled += 1;
                    FeatureVector::ZERO
                }
            };
            rows[head.index()].extend(features.to_array());
        }
        debug!(sentence = idx, "Profiled sentence");
    }

    if report.zero_filled > 0 {
        warn!(
            zero_filled = report.zero_filled,
            "Some head/sentence pairs were zero-filled"
        );
    }

    (ProfileMatrix { rows }, report)
}
