//! A clustering: a centroid dataset plus the per-centroid member lists that
//! partition (or, in overlapping mode, cover) the source dataset (§4.8's
//! clustering type `K`, spec §3).

use rayon::prelude::*;

use crate::data::dense::DenseDataset;
use crate::data::Dataset;
use crate::distance::{fix_argument, score_view, Comparator, Metric};
use crate::error::{Error, Result};
use crate::ivf::kmeans::{self, KMeansParameters};

/// One cluster's members, in the order they were assigned.
#[derive(Debug, Clone, Default)]
pub struct ClusterMembers {
    pub ids: Vec<u32>,
}

/// Centroids plus membership lists. `|centroids| == assignments.len()`, and
/// every id in every member list is a valid row index into the dataset the
/// clustering was built over.
#[derive(Clone)]
pub struct Clustering {
    centroids: DenseDataset,
    assignments: Vec<ClusterMembers>,
    metric: Metric,
}

impl Clustering {
    pub fn num_clusters(&self) -> usize {
        self.centroids.size()
    }

    pub fn centroids(&self) -> &DenseDataset {
        &self.centroids
    }

    pub fn members(&self, cluster: usize) -> Result<&[u32]> {
        self.assignments
            .get(cluster)
            .map(|m| m.ids.as_slice())
            .ok_or(Error::OutOfBounds { index: cluster, size: self.assignments.len() })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The full per-cluster membership list, for the save/load framework.
    pub(crate) fn assignments(&self) -> &[ClusterMembers] {
        &self.assignments
    }

    /// Total number of `(cluster, member)` pairs across all clusters;
    /// exceeds the dataset size under overlapping assignment.
    pub fn total_assignments(&self) -> usize {
        self.assignments.iter().map(|m| m.ids.len()).sum()
    }

    /// Train centroids over `data` and assign every row to its nearest
    /// centroid (sparse clustering, §4.8's default).
    pub fn build<D: Dataset + Sync>(data: &D, metric: Metric, params: &KMeansParameters) -> Result<Self> {
        let centroids = kmeans::train(data, metric, params)?;
        Self::assign_sparse(data, centroids, metric)
    }

    /// Train centroids then assign every row to its `top_k` nearest
    /// centroids (overlapping/dense clustering, §4.8), trading memory for
    /// recall.
    pub fn build_overlapping<D: Dataset + Sync>(
        data: &D,
        metric: Metric,
        params: &KMeansParameters,
        top_k: usize,
    ) -> Result<Self> {
        let centroids = kmeans::train(data, metric, params)?;
        Self::assign_overlapping(data, centroids, metric, top_k)
    }

    /// Reassign `data` against an externally trained `centroids` dataset,
    /// each row to its single nearest centroid.
    pub fn assign_sparse<D: Dataset + Sync>(data: &D, centroids: DenseDataset, metric: Metric) -> Result<Self> {
        let cmp = metric.comparator();
        let centroid_rows: Vec<Vec<f32>> = (0..centroids.size())
            .map(|i| centroids.get(i).map(|v| v.to_f32_vec()))
            .collect::<Result<_>>()?;

        let nearest: Vec<u32> = (0..data.size())
            .into_par_iter()
            .map(|i| {
                let row = data.get(i).expect("index within dataset bounds").to_f32_vec();
                nearest_centroid(&row, &centroid_rows, metric, cmp) as u32
            })
            .collect();

        let mut assignments = vec![ClusterMembers::default(); centroids.size()];
        for (i, &c) in nearest.iter().enumerate() {
            assignments[c as usize].ids.push(i as u32);
        }
        Ok(Self { centroids, assignments, metric })
    }

    /// Reassign `data` against `centroids`, each row to its `top_k`
    /// nearest centroids.
    pub fn assign_overlapping<D: Dataset + Sync>(
        data: &D,
        centroids: DenseDataset,
        metric: Metric,
        top_k: usize,
    ) -> Result<Self> {
        let top_k = top_k.max(1).min(centroids.size());
        let cmp = metric.comparator();
        let centroid_rows: Vec<Vec<f32>> = (0..centroids.size())
            .map(|i| centroids.get(i).map(|v| v.to_f32_vec()))
            .collect::<Result<_>>()?;

        let per_point: Vec<Vec<u32>> = (0..data.size())
            .into_par_iter()
            .map(|i| {
                let row = data.get(i).expect("index within dataset bounds").to_f32_vec();
                top_k_centroids(&row, &centroid_rows, metric, cmp, top_k)
            })
            .collect();

        let mut assignments = vec![ClusterMembers::default(); centroids.size()];
        for (i, clusters) in per_point.into_iter().enumerate() {
            for c in clusters {
                assignments[c as usize].ids.push(i as u32);
            }
        }
        Ok(Self { centroids, assignments, metric })
    }

    /// Reassemble a clustering from its saved parts (save/load, §4.11).
    pub fn from_parts(centroids: DenseDataset, assignments: Vec<ClusterMembers>, metric: Metric) -> Self {
        Self { centroids, assignments, metric }
    }

    /// Centroids closest to `query`, nearest first.
    pub fn nearest_centroids(&self, query: &[f32], n_probes: usize) -> Result<Vec<(usize, f32)>> {
        let cmp = self.metric.comparator();
        let fixed = fix_argument(self.metric, query);
        let mut scored: Vec<(usize, f32)> = (0..self.centroids.size())
            .map(|i| {
                let view = self.centroids.get(i).expect("centroid index in range");
                (i, score_view(self.metric, &fixed, &view))
            })
            .collect();
        scored.sort_by(|a, b| {
            if cmp.is_better(a.1, b.1) {
                std::cmp::Ordering::Less
            } else if cmp.is_better(b.1, a.1) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
        scored.truncate(n_probes.min(scored.len()));
        Ok(scored)
    }
}

fn nearest_centroid(row: &[f32], centroids: &[Vec<f32>], metric: Metric, cmp: Comparator) -> usize {
    let fixed = fix_argument(metric, row);
    let mut best = 0;
    let mut best_dist = cmp.worst_possible();
    for (c, centroid) in centroids.iter().enumerate() {
        let d = score_view(metric, &fixed, &crate::data::VectorView::F32(centroid));
        if cmp.is_better(d, best_dist) {
            best_dist = d;
            best = c;
        }
    }
    best
}

fn top_k_centroids(row: &[f32], centroids: &[Vec<f32>], metric: Metric, cmp: Comparator, k: usize) -> Vec<u32> {
    let fixed = fix_argument(metric, row);
    let mut scored: Vec<(u32, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| (c as u32, score_view(metric, &fixed, &crate::data::VectorView::F32(centroid))))
        .collect();
    scored.sort_by(|a, b| {
        if cmp.is_better(a.1, b.1) {
            std::cmp::Ordering::Less
        } else if cmp.is_better(b.1, a.1) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    scored.truncate(k);
    scored.into_iter().map(|(c, _)| c).collect()
}
