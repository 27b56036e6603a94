//! IVF (inverted-file) index (C8-C9): partition the corpus via
//! (hierarchical) k-means, then probe the nearest clusters at query time.

pub mod clustering;
pub mod kmeans;
pub mod search;

pub use clustering::{ClusterMembers, Clustering};
pub use kmeans::KMeansParameters;
pub use search::{IvfIndex, IvfSearchParameters};

use crate::data::Dataset;
use crate::distance::Metric;
use crate::error::Result;

/// Train a clustering over `data` and assemble a sparse (shared-dataset)
/// searchable index in one call, the common case when no overlapping
/// assignment or dense per-cluster copy is needed.
pub fn build_and_assemble<D: Dataset + Sync>(
    data: D,
    metric: Metric,
    params: &KMeansParameters,
) -> Result<IvfIndex<D>> {
    let clustering = Clustering::build(&data, metric, params)?;
    Ok(IvfIndex::assemble_sparse(data, clustering))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dense::DenseDataset;

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
    fn build_and_assemble_round_trips_a_query() {
        let data = two_blob_dataset(60, 4);
        let params = KMeansParameters::new(2, 10, 6);
        let index = build_and_assemble(data, crate::distance::Metric::L2, &params).unwrap();
        let results = index.search(&[0.0; 4], 3, &IvfSearchParameters::new(1)).unwrap();
        assert_eq!(results.len(), 3);
    }
}
