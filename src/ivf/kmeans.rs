//! Flat and hierarchical minibatch k-means (§4.8), producing a centroid
//! dataset consumed by [`crate::ivf::clustering`].

use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::data::dense::DenseDataset;
use crate::data::Dataset;
use crate::distance::{fix_argument, score_view, Metric};
use crate::error::{Error, Result};

/// Parameters driving a k-means run (§4.8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParameters {
    /// Target number of centroids `m`.
    pub num_centroids: usize,
    pub minibatch_size: usize,
    pub num_iterations: usize,
    pub is_hierarchical: bool,
    /// Fraction of the dataset sampled for training, in `(0, 1]`.
    pub training_fraction: f32,
    /// Level-1 cluster count when hierarchical; `0` picks `sqrt(m)`.
    pub level1_clusters: usize,
    pub seed: u64,
}

impl KMeansParameters {
    pub fn new(num_centroids: usize, num_iterations: usize, seed: u64) -> Self {
        Self {
            num_centroids,
            minibatch_size: (num_centroids * 16).max(256),
            num_iterations,
            is_hierarchical: false,
            training_fraction: 1.0,
            level1_clusters: 0,
            seed,
        }
    }

    pub fn hierarchical(mut self, level1_clusters: usize) -> Self {
        self.is_hierarchical = true;
        self.level1_clusters = level1_clusters;
        self
    }

    pub fn with_training_fraction(mut self, fraction: f32) -> Self {
        self.training_fraction = fraction;
        self
    }

    pub fn with_minibatch_size(mut self, size: usize) -> Self {
        self.minibatch_size = size;
        self
    }

    pub fn validate(&self, n: usize) -> Result<()> {
        if self.num_centroids == 0 {
            return Err(Error::invalid_input("num_centroids must be > 0"));
        }
        if self.num_centroids > n {
            return Err(Error::invalid_input(format!(
                "num_centroids ({}) cannot exceed dataset size ({n})",
                self.num_centroids
            )));
        }
        if !(0.0..=1.0).contains(&self.training_fraction) || self.training_fraction <= 0.0 {
            return Err(Error::invalid_input(format!(
                "training_fraction must be in (0, 1], got {}",
                self.training_fraction
            )));
        }
        Ok(())
    }

    fn effective_level1(&self) -> usize {
        if self.level1_clusters > 0 {
            self.level1_clusters
        } else {
            (self.num_centroids as f64).sqrt().ceil().max(1.0) as usize
        }
    }
}

/// Train `m` centroids over `data` via minibatch k-means (flat or
/// hierarchical per `params.is_hierarchical`), returning a dataset holding
/// one centroid row per cluster.
pub fn train<D: Dataset + Sync>(data: &D, metric: Metric, params: &KMeansParameters) -> Result<DenseDataset> {
    params.validate(data.size())?;
    if params.is_hierarchical && params.num_centroids > params.effective_level1() {
        train_hierarchical(data, metric, params)
    } else {
        train_flat_on_sample(data, metric, params, params.num_centroids, params.seed)
    }
}

/// Run flat k-means over a training sample of `data`, producing exactly
/// `num_centroids` centroids.
fn train_flat_on_sample<D: Dataset + Sync>(
    data: &D,
    metric: Metric,
    params: &KMeansParameters,
    num_centroids: usize,
    seed: u64,
) -> Result<DenseDataset> {
    let n = data.size();
    let dim = data.dimensions();
    let sample_size = ((params.training_fraction as f64) * n as f64).floor().max(1.0) as usize;
    let sample_size = sample_size.min(n);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<u32> = (0..n as u32).collect();
    indices.shuffle(&mut rng);
    let sample: Vec<u32> = indices[..sample_size].to_vec();

    let mut init: Vec<u32> = sample.clone();
    init.shuffle(&mut rng);
    init.truncate(num_centroids);
    if init.len() < num_centroids {
        return Err(Error::invalid_input("training sample too small for requested centroid count"));
    }

    let mut centroids: Vec<f32> = Vec::with_capacity(num_centroids * dim);
    for &idx in &init {
        centroids.extend(data.get(idx as usize)?.to_f32_vec());
    }

    let minibatch_size = params.minibatch_size.min(sample.len()).max(1);
    let cmp = metric.comparator();

    for iter in 0..params.num_iterations {
        let mut batch_rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(iter as u64 + 1));
        let mut batch: Vec<u32> = sample.clone();
        batch.shuffle(&mut batch_rng);
        batch.truncate(minibatch_size);

        let assignments: Vec<(u32, usize)> = batch
            .par_iter()
            .map(|&point| {
                let row = data.get(point as usize).expect("sampled index in range").to_f32_vec();
                let nearest = nearest_centroid(&row, &centroids, dim, metric, cmp);
                (point, nearest)
            })
            .collect();

        let mut sums = vec![0.0f32; num_centroids * dim];
        let mut counts = vec![0u32; num_centroids];
        for &(point, cluster) in &assignments {
            let row = data.get(point as usize)?;
            let row = row.to_f32_vec();
            let base = cluster * dim;
            for d in 0..dim {
                sums[base + d] += row[d];
            }
            counts[cluster] += 1;
        }

        for c in 0..num_centroids {
            if counts[c] == 0 {
                continue;
            }
            let base = c * dim;
            for d in 0..dim {
                centroids[base + d] = sums[base + d] / counts[c] as f32;
            }
        }
    }

    DenseDataset::from_rows(dim, &centroids.chunks(dim).map(|c| c.to_vec()).collect::<Vec<_>>())
}

/// Hierarchical k-means (§4.8): cluster into `L1` coarse groups, then
/// independently run flat k-means within each group for its share of the
/// `m` final centroids, concatenating the results.
fn train_hierarchical<D: Dataset + Sync>(
    data: &D,
    metric: Metric,
    params: &KMeansParameters,
) -> Result<DenseDataset> {
    let l1 = params.effective_level1().min(data.size());
    let l1_params = KMeansParameters::new(l1, params.num_iterations, params.seed)
        .with_training_fraction(params.training_fraction)
        .with_minibatch_size(params.minibatch_size);
    let l1_centroids = train_flat_on_sample(data, metric, &l1_params, l1, params.seed)?;

    let dim = data.dimensions();
    let cmp = metric.comparator();
    let n = data.size();

    let mut groups: Vec<Vec<u32>> = vec![Vec::new(); l1];
    for i in 0..n as u32 {
        let row = data.get(i as usize)?.to_f32_vec();
        let nearest = nearest_centroid(&row, l1_centroids.raw(), dim, metric, cmp);
        groups[nearest].push(i);
    }

    let base_share = params.num_centroids / l1;
    let remainder = params.num_centroids % l1;

    let mut all_centroids: Vec<f32> = Vec::with_capacity(params.num_centroids * dim);
    for (g, members) in groups.iter().enumerate() {
        let share = base_share + if g < remainder { 1 } else { 0 };
        if share == 0 || members.is_empty() {
            continue;
        }
        let share = share.min(members.len());
        let subset = GatherView { base: data, indices: members, dim };
        let sub_params = KMeansParameters::new(share, params.num_iterations, params.seed.wrapping_add(g as u64 + 1));
        let sub_centroids = train_flat_on_sample(&subset, metric, &sub_params, share, sub_params.seed)?;
        all_centroids.extend_from_slice(sub_centroids.raw());
    }

    if all_centroids.is_empty() {
        return Err(Error::invalid_input("hierarchical k-means produced no centroids: all L1 groups were empty"));
    }
    DenseDataset::from_rows(dim, &all_centroids.chunks(dim).map(|c| c.to_vec()).collect::<Vec<_>>())
}

/// A read-only view over a subset of another dataset's rows, used to run
/// flat k-means within one L1 group without copying its member vectors.
struct GatherView<'a, D> {
    base: &'a D,
    indices: &'a [u32],
    dim: usize,
}

impl<'a, D: Dataset> Dataset for GatherView<'a, D> {
    fn size(&self) -> usize {
        self.indices.len()
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn get(&self, i: usize) -> Result<crate::data::VectorView<'_>> {
        if i >= self.indices.len() {
            return Err(Error::OutOfBounds { index: i, size: self.indices.len() });
        }
        self.base.get(self.indices[i] as usize)
    }

    fn prefetch(&self, i: usize) {
        if let Some(&g) = self.indices.get(i) {
            self.base.prefetch(g as usize);
        }
    }
}

fn nearest_centroid(
    row: &[f32],
    centroids: &[f32],
    dim: usize,
    metric: Metric,
    cmp: crate::distance::Comparator,
) -> usize {
    let fixed = fix_argument(metric, row);
    let mut best = 0usize;
    let mut best_dist = cmp.worst_possible();
    for (c, chunk) in centroids.chunks(dim).enumerate() {
        let d = score_view(metric, &fixed, &crate::data::VectorView::F32(chunk));
        if cmp.is_better(d, best_dist) {
            best_dist = d;
            best = c;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(seed_offset: f32, n: usize, dim: usize) -> DenseDataset {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let jitter = (i % 7) as f32 * 0.01;
                vec![seed_offset + jitter; dim]
            })
            .collect();
        DenseDataset::from_rows(dim, &rows).unwrap()
    }

    fn two_blob_dataset(n_per: usize, dim: usize) -> DenseDataset {
        let mut rows = Vec::new();
        for i in 0..n_per {
            rows.push(vec![0.0 + (i % 5) as f32 * 0.01; dim]);
        }
        for i in 0..n_per {
            rows.push(vec![100.0 + (i % 5) as f32 * 0.01; dim]);
        }
        DenseDataset::from_rows(dim, &rows).unwrap()
    }

    #[test]
    fn flat_kmeans_separates_two_well_separated_blobs() {
        let data = two_blob_dataset(50, 4);
        let params = KMeansParameters::new(2, 10, 7);
        let centroids = train(&data, Metric::L2, &params).unwrap();
        assert_eq!(centroids.size(), 2);
        let c0 = centroids.get(0).unwrap().to_f32_vec();
        let c1 = centroids.get(1).unwrap().to_f32_vec();
        let lo = c0[0].min(c1[0]);
        let hi = c0[0].max(c1[0]);
        assert!(lo < 5.0, "expected one centroid near 0, got {lo}");
        assert!(hi > 95.0, "expected one centroid near 100, got {hi}");
    }

    #[test]
    fn rejects_more_centroids_than_points() {
        let data = blobs(0.0, 4, 4);
        let params = KMeansParameters::new(10, 5, 0);
        assert!(train(&data, Metric::L2, &params).is_err());
    }

    #[test]
    fn hierarchical_matches_requested_centroid_count() {
        let data = two_blob_dataset(80, 6);
        let params = KMeansParameters::new(8, 6, 5).hierarchical(2);
        let centroids = train(&data, Metric::L2, &params).unwrap();
        assert!(centroids.size() <= 8 && centroids.size() > 0);
    }
}
