//! Distance and agreement metrics used by the clusterer.

use std::collections::HashMap;

pub fn euclidean_distance_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn comb2(n: u64) -> f64 {
    (n * n.saturating_sub(1)) as f64 / 2.0
}

/// Adjusted Rand Index between two labelings of the same items.
///
/// 1.0 for identical partitions (up to renaming), around 0.0 for chance
/// agreement, negative when worse than chance. Two trivial partitions (every
/// item in its own cluster, or all items in one) compare as 1.0. Labelings of
/// different length, or empty ones, score 0.0.
pub fn adjusted_rand_index(a: &[usize], b: &[usize]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as u64;

    let mut contingency: HashMap<(usize, usize), u64> = HashMap::new();
    let mut row_sums: HashMap<usize, u64> = HashMap::new();
    let mut col_sums: HashMap<usize, u64> = HashMap::new();
    for (&x, &y) in a.iter().zip(b) {
        *contingency.entry((x, y)).or_insert(0) += 1;
        *row_sums.entry(x).or_insert(0) += 1;
        *col_sums.entry(y).or_insert(0) += 1;
    }

    let index: f64 = contingency.values().map(|&c| comb2(c)).sum();
    let sum_rows: f64 = row_sums.values().map(|&c| comb2(c)).sum();
    let sum_cols: f64 = col_sums.values().map(|&c| comb2(c)).sum();
    let total = comb2(n);

    let expected = if total > 0.0 {
        sum_rows * sum_cols / total
    } else {
        0.0
    };
    let max_index = (sum_rows + sum_cols) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < f64::EPSILON {
        return 1.0;
    }
    (index - expected) / denom
}
