//! Dynamic Vamana index (C7): insert, tombstoned delete, consolidate, and
//! compact on top of the static build/search primitives.

use std::collections::HashMap;

use crate::buffer::{Neighbor, SearchBuffer};
use crate::data::dense::DenseDataset;
use crate::data::{Dataset, MutableDataset};
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::narrow::narrow;
use crate::translator::IdTranslator;
use crate::vamana::build::{insert_node_into_graph, point_distance, robust_prune};
use crate::vamana::params::{BuildParameters, SearchParameters};
use crate::vamana::search::greedy_search;

/// A Vamana index supporting insert/delete/consolidate/compact (§4.7) on
/// top of an in-memory dense dataset.
pub struct DynamicVamanaIndex {
    data: DenseDataset,
    graph: Graph,
    translator: IdTranslator,
    tombstoned: Vec<bool>,
    free_list: Vec<u32>,
    entry_point: Option<u32>,
    metric: Metric,
    build_params: BuildParameters,
    search_params: SearchParameters,
    reuse_empty: bool,
}

impl DynamicVamanaIndex {
    pub fn new(dim: usize, metric: Metric, build_params: BuildParameters, reuse_empty: bool) -> Result<Self> {
        build_params.validate()?;
        Ok(Self {
            data: DenseDataset::with_capacity(dim, 0),
            graph: Graph::new(0, build_params.graph_max_degree),
            translator: IdTranslator::new(),
            tombstoned: Vec::new(),
            free_list: Vec::new(),
            entry_point: None,
            metric,
            search_params: SearchParameters::new(build_params.window_size),
            build_params,
            reuse_empty,
        })
    }

    /// Number of live (non-tombstoned) points.
    pub fn size(&self) -> usize {
        self.tombstoned.iter().filter(|t| !**t).count()
    }

    pub fn has_external(&self, external_id: u64) -> bool {
        self.translator.has_external(external_id)
    }

    pub fn get_external(&self, internal_id: u32) -> Result<u64> {
        self.translator.get_external(internal_id)
    }

    pub fn get_internal(&self, external_id: u64) -> Result<u32> {
        self.translator.get_internal(external_id)
    }

    /// Reusing a tombstoned slot before `consolidate()` has removed the
    /// dangling references to it would let a stale edge silently resolve
    /// to the new point. Callers that set `reuse_empty` are expected to
    /// `consolidate()` between a `delete` and any `insert` that would
    /// reuse its slot.
    fn allocate_slot(&mut self) -> u32 {
        if self.reuse_empty {
            if let Some(slot) = self.free_list.pop() {
                return slot;
            }
        }
        let new_id = narrow::<u32, usize>(self.data.size()).expect("dataset size fits u32");
        self.data.push(&vec![0.0; self.data.dimensions()]).expect("zero row matches dimension");
        self.graph.grow(1);
        self.tombstoned.push(true);
        new_id
    }

    /// Insert `vector` under `external_id`, running a single-node build
    /// step against the current graph to place it (§4.7).
    pub fn insert(&mut self, external_id: u64, vector: &[f32]) -> Result<()> {
        if self.translator.has_external(external_id) {
            return Err(Error::DuplicateId(external_id));
        }
        if vector.len() != self.data.dimensions() {
            return Err(Error::DimensionMismatch { expected: self.data.dimensions(), got: vector.len() });
        }

        let internal_id = self.allocate_slot();
        self.data.set(internal_id as usize, vector)?;
        self.tombstoned[internal_id as usize] = false;
        self.translator.insert(&[external_id], &[internal_id], true)?;

        match self.entry_point {
            None => {
                self.entry_point = Some(internal_id);
            }
            Some(ep) => {
                insert_node_into_graph(
                    &self.data,
                    self.metric,
                    &self.graph,
                    ep,
                    &self.build_params,
                    self.build_params.alpha,
                    internal_id,
                )?;
            }
        }
        Ok(())
    }

    /// Tombstone the slot bound to `external_id`; existing graph edges
    /// still point to it until `consolidate()` runs (§4.7).
    pub fn delete(&mut self, external_id: u64) -> Result<()> {
        let internal_id = self.translator.delete_external(external_id)?;
        self.tombstoned[internal_id as usize] = true;
        if self.reuse_empty {
            self.free_list.push(internal_id);
        }

        if self.entry_point == Some(internal_id) {
            self.entry_point = self.closest_surviving_node(internal_id)?;
        }
        Ok(())
    }

    fn closest_surviving_node(&self, deleted: u32) -> Result<Option<u32>> {
        let live: Vec<u32> =
            (0..self.tombstoned.len() as u32).filter(|&i| !self.tombstoned[i as usize]).collect();
        if live.is_empty() {
            return Ok(None);
        }
        let reference = self.data.get(deleted as usize)?.to_f32_vec();
        let fixed = crate::distance::fix_argument(self.metric, &reference);
        let cmp = self.metric.comparator();
        let mut best = live[0];
        let mut best_score = cmp.worst_possible();
        for &i in &live {
            let view = self.data.get(i as usize)?;
            let d = crate::distance::score_view(self.metric, &fixed, &view);
            if cmp.is_better(d, best_score) {
                best_score = d;
                best = i;
            }
        }
        Ok(Some(best))
    }

    /// Replace every tombstoned neighbor reference with the union of that
    /// neighbor's live two-hop neighbors, then robust-prune back to
    /// `prune_to`. After this, no surviving node's neighbor list
    /// references a tombstoned id (§4.7, §8 invariant).
    pub fn consolidate(&mut self) -> Result<()> {
        let n = self.tombstoned.len();
        for i in 0..n {
            if self.tombstoned[i] {
                continue;
            }
            let current = self.graph.get_neighbors(i)?.to_vec();
            let mut replaced: Vec<u32> = Vec::with_capacity(current.len());
            let mut touched_tombstone = false;
            for &nb in &current {
                if self.tombstoned[nb as usize] {
                    touched_tombstone = true;
                    for &two_hop in self.graph.get_neighbors(nb as usize)? {
                        if two_hop != i as u32
                            && !self.tombstoned[two_hop as usize]
                            && !replaced.contains(&two_hop)
                        {
                            replaced.push(two_hop);
                        }
                    }
                } else if !replaced.contains(&nb) {
                    replaced.push(nb);
                }
            }
            if !touched_tombstone {
                continue;
            }
            tracing::debug!(node = i, "consolidating tombstoned neighbors");
            let mut pool = Vec::with_capacity(replaced.len());
            for &c in &replaced {
                let d = point_distance(&self.data, self.metric, i as u32, c)?;
                pool.push(Neighbor::new(c, d));
            }
            let pruned = robust_prune(&self.data, self.metric, i as u32, pool, self.build_params.alpha, self.build_params.prune_to)?;
            self.graph.set_neighbors(i, &pruned)?;
        }
        Ok(())
    }

    /// Remap internal ids to a contiguous `[0, N)` prefix in batches of
    /// `batchsize`, rewriting data, graph, and translator (§4.7).
    /// `delete()` + `consolidate()` + `compact()` is idempotent when no
    /// intervening operations occur.
    pub fn compact(&mut self, batchsize: usize) -> Result<()> {
        let batchsize = batchsize.max(1);
        let live: Vec<u32> =
            (0..self.tombstoned.len() as u32).filter(|&i| !self.tombstoned[i as usize]).collect();
        let n_new = live.len();

        let mut remap: HashMap<u32, u32> = HashMap::with_capacity(n_new);
        for (new_id, &old_id) in live.iter().enumerate() {
            remap.insert(old_id, new_id as u32);
        }

        let dim = self.data.dimensions();
        let mut new_data = DenseDataset::with_capacity(dim, n_new);
        let mut new_graph = Graph::new(n_new, self.graph.max_degree());
        let mut externals = Vec::with_capacity(n_new);

        for chunk in live.chunks(batchsize) {
            for &old_id in chunk {
                let row = self.data.get(old_id as usize)?.to_f32_vec();
                new_data.push(&row)?;
                let neighbors = self.graph.get_neighbors(old_id as usize)?;
                let remapped: Vec<u32> =
                    neighbors.iter().filter_map(|n| remap.get(n).copied()).collect();
                let new_id = remap[&old_id];
                new_graph.set_neighbors(new_id as usize, &remapped)?;
                externals.push(self.translator.get_external(old_id)?);
            }
        }

        let internals: Vec<u32> = (0..n_new as u32).collect();
        let mut new_translator = IdTranslator::new();
        new_translator.insert(&externals, &internals, true)?;

        self.entry_point = self.entry_point.and_then(|ep| remap.get(&ep).copied());
        self.data = new_data;
        self.graph = new_graph;
        self.translator = new_translator;
        self.tombstoned = vec![false; n_new];
        self.free_list.clear();
        Ok(())
    }

    /// Greedy search over the current (possibly tombstone-containing)
    /// graph; tombstoned ids may still appear as out-neighbors before
    /// `consolidate()` runs, but `insert`/`delete` can still serve queries
    /// in the meantime by filtering them out of the returned external ids.
    pub fn search(&self, query: &[f32], k: usize, window: usize) -> Result<Vec<(u64, f32)>> {
        let Some(ep) = self.entry_point else {
            return Ok(Vec::new());
        };
        let projected = self.data.project_query(query);
        let effective_window = window.max(k);
        let mut buffer = SearchBuffer::new(effective_window, effective_window, self.metric.comparator());
        let params = self.search_params.with_capacity(effective_window);
        let params = SearchParameters { search_window_size: effective_window, ..params };
        greedy_search(&projected, &self.data, &self.graph, self.metric, &[ep], &mut buffer, &params, &|| false)?;

        let mut out = Vec::with_capacity(k);
        for n in buffer.iter() {
            if self.tombstoned[n.id as usize] {
                continue;
            }
            let external = self.translator.get_external(n.id)?;
            out.push((external, n.distance));
            if out.len() == k {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_index(dim: usize) -> DynamicVamanaIndex {
        DynamicVamanaIndex::new(dim, Metric::L2, BuildParameters::new(1.2, 16, 32), true).unwrap()
    }

    #[test]
    fn dynamic_round_trip_matches_scenario_3() {
        let mut index = new_index(4);
        for e in 100u64..1100 {
            let v = vec![e as f32; 4];
            index.insert(e, &v).unwrap();
        }
        assert_eq!(index.size(), 1000);

        for e in 100u64..600 {
            index.delete(e).unwrap();
        }
        index.consolidate().unwrap();
        index.compact(128).unwrap();

        assert_eq!(index.size(), 500);
        for e in 600u64..1100 {
            assert!(index.has_external(e));
            let internal = index.get_internal(e).unwrap();
            assert_eq!(index.get_external(internal).unwrap(), e);
        }
        let mut internals: Vec<u32> = (600u64..1100).map(|e| index.get_internal(e).unwrap()).collect();
        internals.sort_unstable();
        let expected: Vec<u32> = (0..500).collect();
        assert_eq!(internals, expected);
    }

    #[test]
    fn consolidate_removes_tombstoned_references() {
        let mut index = new_index(2);
        for e in 0u64..20 {
            index.insert(e, &[e as f32, e as f32]).unwrap();
        }
        for e in 0u64..5 {
            index.delete(e).unwrap();
        }
        index.consolidate().unwrap();
        for i in 0..20u32 {
            if index.tombstoned[i as usize] {
                continue;
            }
            for &nb in index.graph.get_neighbors(i as usize).unwrap() {
                assert!(!index.tombstoned[nb as usize], "node {i} still references tombstoned {nb}");
            }
        }
    }

    #[test]
    fn delete_unknown_external_id_errors() {
        let mut index = new_index(2);
        assert!(index.delete(999).is_err());
    }

    #[test]
    fn insert_duplicate_external_id_errors() {
        let mut index = new_index(2);
        index.insert(1, &[0.0, 0.0]).unwrap();
        assert!(matches!(index.insert(1, &[1.0, 1.0]), Err(Error::DuplicateId(1))));
    }
}
