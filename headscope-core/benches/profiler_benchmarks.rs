use criterion::{Criterion, black_box, criterion_group, criterion_main};
use headscope_core::clustering::{KMeans, adjusted_rand_index};
use headscope_core::config::{ClusteringConfig, ProjectionConfig};
use headscope_core::corpus::Corpus;
use headscope_core::features::extract_features;
use headscope_core::oracle::{AttentionOracle, SyntheticOracle};
use headscope_core::profile::build_profile_matrix;
use headscope_core::projection::project_3d;

fn bench_feature_extraction(c: &mut Criterion) {
    let oracle = SyntheticOracle::new(42);
    let output = oracle
        .attend("The keys to the cabinet that the old man lost are on the table")
        .unwrap();
    let matrix = output.attention.matrix(5, 5).unwrap();

    c.bench_function("extract_features_14_tokens", |b| {
        b.iter(|| extract_features(black_box(&matrix)))
    });

    let long_text = "token ".repeat(128);
    let long = oracle.attend(&long_text).unwrap();
    let long_matrix = long.attention.matrix(0, 0).unwrap();
    c.bench_function("extract_features_128_tokens", |b| {
        b.iter(|| extract_features(black_box(&long_matrix)))
    });
}

fn bench_profile_build(c: &mut Criterion) {
    let oracle = SyntheticOracle::new(42);
    let corpus = Corpus::from_sentences(Corpus::standard().sample(10).to_vec());

    c.bench_function("build_profile_matrix_10_sentences", |b| {
        b.iter(|| build_profile_matrix(black_box(&oracle), black_box(&corpus)))
    });
}

fn bench_clustering(c: &mut Criterion) {
    let (matrix, _) = build_profile_matrix(&SyntheticOracle::new(7), &Corpus::standard());
    let config = ClusteringConfig::default();

    c.bench_function("kmeans_144x250_n_init_10", |b| {
        b.iter(|| {
            KMeans::from_config(5, 42, &config)
                .fit(black_box(matrix.rows()))
                .unwrap()
        })
    });

    let a: Vec<usize> = (0..144).map(|i| i % 5).collect();
    let other: Vec<usize> = (0..144).map(|i| (i / 3) % 5).collect();
    c.bench_function("adjusted_rand_index_144", |b| {
        b.iter(|| adjusted_rand_index(black_box(&a), black_box(&other)))
    });

    let projection = ProjectionConfig {
        iterations: 100,
        ..Default::default()
    };
    let mut group = c.benchmark_group("projection");
    group.sample_size(10);
    group.bench_function("tsne_144_points_100_iterations", |b| {
        b.iter(|| project_3d(black_box(&matrix), &projection, 42))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_feature_extraction,
    bench_profile_build,
    bench_clustering,
);
criterion_main!(benches);
