//! Vamana graph index (C5-C7): greedy search, robust-prune build, and the
//! dynamic insert/delete/consolidate/compact variant.

pub mod build;
pub mod dynamic;
pub mod params;
pub mod search;

pub use dynamic::DynamicVamanaIndex;
pub use params::{BuildParameters, SearchParameters};

use crate::buffer::SearchBuffer;
use crate::data::Dataset;
use crate::distance::Metric;
use crate::error::Result;
use crate::graph::Graph;
use crate::translator::IdTranslator;

/// A built, static Vamana index over an immutable dataset `D`. Generic so
/// the same search path serves dense, scalar-quantized, LVQ, and LeanVec
/// datasets without duplicating `greedy_search`'s traversal logic.
pub struct VamanaIndex<D> {
    data: D,
    graph: Graph,
    translator: IdTranslator,
    metric: Metric,
    entry_point: u32,
    /// The parameters the graph was built with, carried alongside for
    /// persistence (§6's `vamana_config`) and inspection; not re-consulted
    /// by `search`.
    build_params: BuildParameters,
}

impl<D: Dataset + Sync> VamanaIndex<D> {
    /// Build a new index over `data`, assigning identity external ids
    /// `[0, data.size())` (§4.6).
    pub fn build(data: D, metric: Metric, params: &BuildParameters, seed: u64) -> Result<Self> {
        let (graph, entry_point) = build::build_vamana_graph(&data, metric, params, seed)?;
        let translator = IdTranslator::identity(data.size());
        Ok(Self { data, graph, translator, metric, entry_point, build_params: *params })
    }

    /// Build a new index using a caller-supplied external id for each row
    /// of `data`, in row order.
    pub fn build_with_ids(
        data: D,
        external_ids: &[u64],
        metric: Metric,
        params: &BuildParameters,
        seed: u64,
    ) -> Result<Self> {
        let (graph, entry_point) = build::build_vamana_graph(&data, metric, params, seed)?;
        let internal: Vec<u32> = (0..data.size() as u32).collect();
        let mut translator = IdTranslator::new();
        translator.insert(external_ids, &internal, true)?;
        Ok(Self { data, graph, translator, metric, entry_point, build_params: *params })
    }

    /// Reassemble an index from its constituent parts, as the save/load
    /// framework does on deserialization.
    pub fn from_parts(
        data: D,
        graph: Graph,
        translator: IdTranslator,
        metric: Metric,
        entry_point: u32,
        build_params: BuildParameters,
    ) -> Self {
        Self { data, graph, translator, metric, entry_point, build_params }
    }

    pub fn build_params(&self) -> &BuildParameters {
        &self.build_params
    }

    pub fn size(&self) -> usize {
        self.data.size()
    }

    pub fn dimensions(&self) -> usize {
        self.data.dimensions()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn translator(&self) -> &IdTranslator {
        &self.translator
    }

    /// Top-`k` nearest neighbors of `query`, as `(external_id, distance)`
    /// pairs in ascending-badness order (§4.5). `query` is full-dimensional;
    /// it is projected into the dataset's native comparison space (a no-op
    /// for plain/quantized datasets, a transform for [`crate::data::leanvec::LeanVecDataset`])
    /// before the graph traversal starts.
    pub fn search(&self, query: &[f32], k: usize, params: &SearchParameters) -> Result<Vec<(u64, f32)>> {
        let projected = self.data.project_query(query);
        let mut buffer = SearchBuffer::new(
            params.search_window_size,
            params.search_buffer_capacity.max(k),
            self.metric.comparator(),
        );
        search::greedy_search(
            &projected,
            &self.data,
            &self.graph,
            self.metric,
            &[self.entry_point],
            &mut buffer,
            params,
            &|| false,
        )?;
        self.translate_top_k(&buffer, k)
    }

    /// Same as [`Self::search`] but polls `cancel` during traversal,
    /// returning whatever partial buffer state existed at cancellation.
    pub fn search_cancellable(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParameters,
        cancel: &dyn Fn() -> bool,
    ) -> Result<Vec<(u64, f32)>> {
        let projected = self.data.project_query(query);
        let mut buffer = SearchBuffer::new(
            params.search_window_size,
            params.search_buffer_capacity.max(k),
            self.metric.comparator(),
        );
        search::greedy_search(&projected, &self.data, &self.graph, self.metric, &[self.entry_point], &mut buffer, params, cancel)?;
        self.translate_top_k(&buffer, k)
    }

    fn translate_top_k(&self, buffer: &SearchBuffer, k: usize) -> Result<Vec<(u64, f32)>> {
        let mut out = Vec::with_capacity(k.min(buffer.len()));
        for n in buffer.top(k) {
            out.push((self.translator.get_external(n.id)?, n.distance));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dense::DenseDataset;

    fn line_dataset(n: usize, dim: usize) -> DenseDataset {
        let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32; dim]).collect();
        DenseDataset::from_rows(dim, &rows).unwrap()
    }

    #[test]
    fn build_then_search_finds_nearest() {
        let data = line_dataset(200, 8);
        let params = BuildParameters::new(1.2, 16, 32);
        let index = VamanaIndex::build(data, Metric::L2, &params, 11).unwrap();
        let query = vec![100.3; 8];
        let results = index.search(&query, 5, &SearchParameters::default()).unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&100), "expected the closest point (id 100) among {ids:?}");
    }

    #[test]
    fn build_with_ids_preserves_caller_external_ids() {
        let data = line_dataset(10, 4);
        let external: Vec<u64> = (1000..1010).collect();
        let params = BuildParameters::new(1.2, 6, 12);
        let index = VamanaIndex::build_with_ids(data, &external, Metric::L2, &params, 3).unwrap();
        let query = vec![5.0; 4];
        let results = index.search(&query, 1, &SearchParameters::default()).unwrap();
        assert_eq!(results[0].0, 1005);
    }
}
