//! Run with:
//! ```bash
//! RUSTFLAGS="-C target-cpu=native" cargo bench --bench benchmark
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use vsearch::data::dense::DenseDataset;
use vsearch::ivf::{self, IvfSearchParameters, KMeansParameters};
use vsearch::{BuildParameters, Metric, SearchParameters, VamanaIndex};

/// A representative embedding dimension (OpenAI text-embedding-3-small).
const DIM: usize = 1536;
/// Number of vectors in the index for the main benchmarks.
const N_VECS: usize = 10_000;
/// Fixed RNG seed for reproducible benchmarks.
const SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Generate `n` random f32 vectors of dimension `dim`.
/// Using a seeded RNG ensures the benchmark data is identical across runs,
/// making benchmark comparisons statistically valid.
fn generate_random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

fn build_vamana(n_vecs: usize, dim: usize) -> VamanaIndex<DenseDataset> {
    let rows = generate_random_vectors(n_vecs, dim, SEED);
    let data = DenseDataset::from_rows(dim, &rows).unwrap();
    let params = BuildParameters::new(1.2, 32, 64);
    VamanaIndex::build(data, Metric::L2, &params, SEED).unwrap()
}

/// Measures greedy-search throughput (C5) over a 10,000 × 1536-dim Vamana
/// graph: one query touches only the traversed neighborhood, not all N
/// points, so this is the index's actual query-time cost.
fn bench_vamana_search(c: &mut Criterion) {
    let index = build_vamana(N_VECS, DIM);
    let query = generate_random_vectors(1, DIM, SEED + 1).remove(0);
    let params = SearchParameters::new(64);

    let mut group = c.benchmark_group("vamana_search");
    group.throughput(Throughput::Elements(1));
    group.bench_function(
        BenchmarkId::new("greedy_search", format!("{N_VECS}vecs_dim{DIM}")),
        |b| b.iter(|| black_box(index.search(black_box(&query), 10, &params).unwrap())),
    );
    group.finish();
}

/// Measures build throughput (C6): interleaved greedy search + robust
/// prune over the whole corpus.
fn bench_vamana_build(c: &mut Criterion) {
    let rows = generate_random_vectors(2_000, 256, SEED);

    let mut group = c.benchmark_group("vamana_build");
    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("build_2000vecs_dim256", |b| {
        b.iter_batched(
            || DenseDataset::from_rows(256, &rows).unwrap(),
            |data| {
                let params = BuildParameters::new(1.2, 32, 64);
                black_box(VamanaIndex::build(data, Metric::L2, &params, SEED).unwrap())
            },
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

/// Measures IVF cluster-probe search (C9): n_probes clusters scanned
/// exhaustively rather than the whole corpus.
fn bench_ivf_search(c: &mut Criterion) {
    let rows = generate_random_vectors(N_VECS, DIM, SEED);
    let data = DenseDataset::from_rows(DIM, &rows).unwrap();
    let kmeans_params = KMeansParameters::new(100, 10, SEED);
    let index = ivf::build_and_assemble(data, Metric::L2, &kmeans_params).unwrap();
    let query = generate_random_vectors(1, DIM, SEED + 1).remove(0);
    let search_params = IvfSearchParameters::new(10);

    let mut group = c.benchmark_group("ivf_search");
    group.throughput(Throughput::Elements(1));
    group.bench_function(
        BenchmarkId::new("n_probes_10", format!("{N_VECS}vecs_dim{DIM}_100centroids")),
        |b| b.iter(|| black_box(index.search(black_box(&query), 10, &search_params).unwrap())),
    );
    group.finish();
}

/// Measures how Vamana search latency scales with corpus size.
/// Expected: sub-linear — the graph's bounded out-degree keeps the
/// traversed neighborhood roughly constant as N grows.
fn bench_vamana_scaling(c: &mut Criterion) {
    let query = generate_random_vectors(1, 128, SEED + 99).remove(0);

    let mut group = c.benchmark_group("vamana_scaling_by_n_vecs");
    for n in [500usize, 1_000, 5_000, 10_000] {
        let index = build_vamana(n, 128);
        let params = SearchParameters::new(64);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| black_box(index.search(black_box(&query), 10, &params).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_vamana_search,
    bench_vamana_build,
    bench_ivf_search,
    bench_vamana_scaling,
);
criterion_main!(benches);
