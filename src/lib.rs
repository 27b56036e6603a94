//! # vsearch — dense-vector similarity search
//!
//! A library for approximate nearest-neighbor search over large corpora of
//! dense vectors. Two index families share a common quantized-storage
//! substrate and save/load framework:
//!
//! - [`vamana`]: a monotonic proximity graph built by interleaved greedy
//!   search and robust pruning, with dynamic insert/delete/consolidate/
//!   compact support ([`vamana::VamanaIndex`], [`vamana::DynamicVamanaIndex`]).
//! - [`ivf`]: an inverted-file index partitioning the corpus via
//!   (hierarchical) k-means, probing the nearest clusters at query time
//!   ([`ivf::IvfIndex`]).
//!
//! ## Memory layout
//!
//! Both index families are generic over the [`data::Dataset`] trait rather
//! than a single concrete vector representation. [`data::dense::DenseDataset`]
//! stores rows contiguously (row `i` occupies `data[i*dim..(i+1)*dim]`, the
//! same flat Structure-of-Arrays layout used throughout this crate's
//! quantized variants) so the search loop walks memory sequentially instead
//! of chasing per-row heap pointers. [`data::scalar_quant`], [`data::lvq`],
//! and [`data::leanvec`] pack compressed rows behind the same trait, so a
//! [`vamana::VamanaIndex`] or [`ivf::IvfIndex`] built over quantized storage
//! runs the identical traversal code as one built over `f32`.
//!
//! ## Concurrency
//!
//! Parallel work (k-means assignment, batch graph construction) goes
//! through [`threading::WorkerPool::static_partition`], which splits a
//! range into one contiguous chunk per worker with no task stealing —
//! adequate for search/build workloads where per-item cost is uniform.
//! Graph edits during build are guarded by the per-row locks in
//! [`graph::Graph`]; search buffers ([`buffer::SearchBuffer`]) are
//! thread-local and never shared.
//!
//! ## Persistence
//!
//! Every on-disk artifact goes through [`saveload`]: a root
//! `svs_config.toml` carrying a schema tag and version, plus relative
//! sidecar `.bin` files for bulk numeric data. No absolute paths are ever
//! persisted (§4.11's relocatability invariant).

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod buffer;
pub mod data;
pub mod distance;
pub mod error;
pub mod graph;
pub mod ivf;
pub mod iterator;
pub mod narrow;
pub mod saveload;
pub mod threading;
pub mod translator;
pub mod vamana;
pub mod version;

pub use data::{Dataset, MutableDataset, VectorView};
pub use distance::{Comparator, Metric};
pub use error::{Error, Result};
pub use ivf::{ClusterMembers, Clustering, IvfIndex, IvfSearchParameters, KMeansParameters};
pub use translator::IdTranslator;
pub use vamana::{BuildParameters, DynamicVamanaIndex, SearchParameters, VamanaIndex};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dense::DenseDataset;

    /// End-to-end smoke test exercising the public re-exports: build a
    /// Vamana index over a small line dataset and confirm the nearest
    /// point surfaces in a top-k query, using only `vsearch::`-prefixed
    /// paths (as an external crate consumer would).
    #[test]
    fn public_api_builds_and_searches() {
        let rows: Vec<Vec<f32>> = (0..64u32).map(|i| vec![i as f32; 4]).collect();
        let data = DenseDataset::from_rows(4, &rows).unwrap();
        let params = BuildParameters::new(1.2, 16, 32);
        let index = VamanaIndex::build(data, Metric::L2, &params, 7).unwrap();

        let results = index
            .search(&[30.4; 4], 3, &SearchParameters::default())
            .unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&30), "expected id 30 near query among {ids:?}");
    }

    #[test]
    fn public_api_builds_ivf_index() {
        let rows: Vec<Vec<f32>> = (0..80u32)
            .map(|i| vec![if i < 40 { 0.0 } else { 50.0 }; 3])
            .collect();
        let data = DenseDataset::from_rows(3, &rows).unwrap();
        let params = KMeansParameters::new(2, 16, 8);
        let index = ivf::build_and_assemble(data, Metric::L2, &params).unwrap();
        let results = index
            .search(&[0.0; 3], 5, &IvfSearchParameters::new(1))
            .unwrap();
        assert_eq!(results.len(), 5);
    }
}
