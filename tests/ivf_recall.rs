//! End-to-end recall scenario (spec §8 scenario 4): IVF search against a
//! brute-force exact groundtruth must clear a recall@10 floor.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashSet;

use vsearch::data::dense::DenseDataset;
use vsearch::ivf::{self, IvfSearchParameters, KMeansParameters};
use vsearch::{Dataset, Metric};

const SEED: u64 = 0x5e7f10e;

fn random_dataset(n: usize, dim: usize, seed: u64) -> DenseDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect();
    DenseDataset::from_rows(dim, &rows).unwrap()
}

/// Brute-force top-k by squared L2 distance, used as groundtruth.
fn exact_top_k(data: &DenseDataset, query: &[f32], k: usize) -> Vec<u64> {
    let mut scored: Vec<(u64, f32)> = (0..data.size())
        .map(|i| {
            let row = data.get(i).unwrap().to_f32_vec();
            let d: f32 = row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
            (i as u64, d)
        })
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    scored.truncate(k);
    scored.into_iter().map(|(id, _)| id).collect()
}

/// Builds IVF over a 10k x 128 L2 dataset with 100 flat centroids,
/// assembles a searchable index, and checks recall@10 with n_probes=10
/// against brute-force groundtruth over a sample of queries.
#[test]
fn ivf_recall_floor_at_ten_probes() {
    let n = 10_000;
    let dim = 128;
    let data = random_dataset(n, dim, SEED);
    let groundtruth_data = data.clone();

    let kmeans_params = KMeansParameters::new(100, 15, SEED).with_training_fraction(0.5);
    let index = ivf::build_and_assemble(data, Metric::L2, &kmeans_params).unwrap();
    let search_params = IvfSearchParameters::new(10);

    let mut rng = StdRng::seed_from_u64(SEED + 1);
    let num_queries = 25;
    let k = 10;
    let mut total_hits = 0usize;
    let mut total_possible = 0usize;

    for _ in 0..num_queries {
        let query: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
        let exact: HashSet<u64> = exact_top_k(&groundtruth_data, &query, k).into_iter().collect();
        let approx = index.search(&query, k, &search_params).unwrap();
        let approx_ids: HashSet<u64> = approx.iter().map(|(id, _)| *id).collect();
        total_hits += exact.intersection(&approx_ids).count();
        total_possible += exact.len();
    }

    let recall = total_hits as f64 / total_possible as f64;
    assert!(recall >= 0.85, "recall@10 = {recall:.3}, expected >= 0.85");
}
