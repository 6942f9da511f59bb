//! Property-based tests for feature extraction and labeling agreement.

use proptest::prelude::*;

use headscope_core::clustering::adjusted_rand_index;
use headscope_core::features::extract_features;
use headscope_core::oracle::AttentionMatrix;

/// A row-stochastic `n × n` matrix.
fn stochastic_matrix() -> impl Strategy<Value = (usize, Vec<f32>)> {
    (1usize..12).prop_flat_map(|n| {
        prop::collection::vec(0.01f32..1.0, n * n).prop_map(move |mut w| {
            for row in w.chunks_exact_mut(n) {
                let sum: f32 = row.iter().sum();
                row.iter_mut().for_each(|v| *v /= sum);
            }
            (n, w)
        })
    })
}

fn labeling(len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..5, len)
}

// --- Feature extraction properties ---

proptest! {
    #[test]
    fn features_are_finite_and_bounded((n, weights) in stochastic_matrix()) {
        let f = extract_features(&AttentionMatrix::new(n, &weights).unwrap());
        for v in f.to_array() {
            prop_assert!(v.is_finite());
            prop_assert!(v >= -1e-6);
        }
        prop_assert!(f.self_attention <= 1.0 + 1e-5);
        prop_assert!(f.entropy <= (n as f64).ln() + 1e-4);
    }

    #[test]
    fn feature_mass_adds_up((n, weights) in stochastic_matrix()) {
        let f = extract_features(&AttentionMatrix::new(n, &weights).unwrap());
        let triangle = (n * (n - 1) / 2) as f64;
        let total = f.self_attention * n as f64 + (f.forward + f.backward) * triangle;
        prop_assert!((total - n as f64).abs() < 1e-3, "total mass {total} for n={n}");
    }

    #[test]
    fn arbitrary_weights_never_produce_nan(
        n in 0usize..8,
        seed in prop::collection::vec(0.0f32..10.0, 64),
    ) {
        let weights: Vec<f32> = seed.iter().cycle().take(n * n).copied().collect();
        let f = extract_features(&AttentionMatrix::new(n, &weights).unwrap());
        prop_assert!(f.to_array().iter().all(|v| v.is_finite()));
    }
}

// --- Adjusted Rand Index properties ---

proptest! {
    #[test]
    fn ari_of_identical_labelings_is_one(labels in labeling(40)) {
        prop_assert!((adjusted_rand_index(&labels, &labels) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ari_is_symmetric(a in labeling(30), b in labeling(30)) {
        let ab = adjusted_rand_index(&a, &b);
        let ba = adjusted_rand_index(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn ari_ignores_label_names(a in labeling(30), b in labeling(30)) {
        let renamed: Vec<usize> = b.iter().map(|&l| (l + 3) % 5).collect();
        let plain = adjusted_rand_index(&a, &b);
        let permuted = adjusted_rand_index(&a, &renamed);
        prop_assert!((plain - permuted).abs() < 1e-12);
    }

    #[test]
    fn ari_is_at_most_one(a in labeling(25), b in labeling(25)) {
        prop_assert!(adjusted_rand_index(&a, &b) <= 1.0 + 1e-12);
    }
}
