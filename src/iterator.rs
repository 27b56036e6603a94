//! Batch iterators (C10): wrap a single-query search state and yield
//! successive batches of previously-unseen neighbors by widening the
//! underlying search (Vamana: window/capacity; IVF: `n_probes`) between
//! calls, grounded on `original_source/include/svs/index/vamana/
//! iterator.h`'s `BatchIterator`.

use std::collections::HashSet;

use crate::data::Dataset;
use crate::error::Result;
use crate::ivf::search::{IvfIndex, IvfSearchParameters};
use crate::vamana::{SearchParameters, VamanaIndex};

/// Expanding-window batch iterator over a [`VamanaIndex`] (§4.10).
pub struct VamanaBatchIterator<'a, D> {
    index: &'a VamanaIndex<D>,
    query: Vec<f32>,
    params: SearchParameters,
    base_window: usize,
    yielded: HashSet<u64>,
    exhausted: bool,
    restart_next_search: bool,
}

impl<'a, D: Dataset + Sync> VamanaBatchIterator<'a, D> {
    pub fn new(index: &'a VamanaIndex<D>, query: &[f32], params: SearchParameters) -> Self {
        Self {
            index,
            query: query.to_vec(),
            base_window: params.search_window_size,
            params,
            yielded: HashSet::new(),
            exhausted: false,
            restart_next_search: true,
        }
    }

    /// Emit up to `batch_size` previously-unyielded neighbors, widening the
    /// search window by `batch_size` first (or initializing it to
    /// `base_window + batch_size` on the first call / after [`Self::update`]).
    pub fn next(&mut self, batch_size: usize) -> Result<Vec<(u64, f32)>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        if self.restart_next_search {
            self.params.search_window_size = self.base_window + batch_size;
            self.params.search_buffer_capacity = self.params.search_window_size;
            self.restart_next_search = false;
        } else {
            self.params.search_window_size += batch_size;
            self.params.search_buffer_capacity = self.params.search_window_size;
        }

        let ranked = self.index.search(&self.query, self.params.search_buffer_capacity, &self.params)?;

        // Build the new batch against a scratch copy of the yielded set so
        // a mid-walk failure (none occur with `HashSet`, but the shape
        // mirrors the source's rollback-on-throw `copy_from_scratch`)
        // leaves `self.yielded` untouched until the whole batch commits.
        let mut scratch = self.yielded.clone();
        let mut batch = Vec::with_capacity(batch_size);
        for (id, dist) in ranked {
            if batch.len() == batch_size {
                break;
            }
            if scratch.insert(id) {
                batch.push((id, dist));
            }
        }
        self.yielded = scratch;

        if batch.is_empty() {
            self.exhausted = true;
        }
        Ok(batch)
    }

    /// True once every reachable point has been yielded, or the last batch
    /// produced nothing new.
    pub fn done(&self) -> bool {
        self.exhausted || self.yielded.len() >= self.index.size()
    }

    /// Reset for a new query, keeping the current window/capacity as a
    /// tuning hint for the next `next()` call's restart (§4.10).
    pub fn update(&mut self, new_query: &[f32]) {
        self.query = new_query.to_vec();
        self.yielded.clear();
        self.exhausted = false;
        self.restart_next_search = true;
    }

    pub fn num_yielded(&self) -> usize {
        self.yielded.len()
    }
}

/// Expanding-probe batch iterator over an [`IvfIndex`] (§4.10).
pub struct IvfBatchIterator<'a, D> {
    index: &'a IvfIndex<D>,
    query: Vec<f32>,
    params: IvfSearchParameters,
    base_n_probes: usize,
    yielded: HashSet<u64>,
    exhausted: bool,
    restart_next_search: bool,
}

impl<'a, D: Dataset> IvfBatchIterator<'a, D> {
    pub fn new(index: &'a IvfIndex<D>, query: &[f32], params: IvfSearchParameters) -> Self {
        Self {
            index,
            query: query.to_vec(),
            base_n_probes: params.n_probes,
            params,
            yielded: HashSet::new(),
            exhausted: false,
            restart_next_search: true,
        }
    }

    pub fn next(&mut self, batch_size: usize) -> Result<Vec<(u64, f32)>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let cap = self.index.num_clusters();
        if self.restart_next_search {
            self.params.n_probes = (self.base_n_probes + batch_size).min(cap);
            self.restart_next_search = false;
        } else {
            self.params.n_probes = (self.params.n_probes + batch_size).min(cap);
        }

        let fetch_k = batch_size * self.params.n_probes.max(1);
        let ranked = self.index.search(&self.query, fetch_k, &self.params)?;

        let mut scratch = self.yielded.clone();
        let mut batch = Vec::with_capacity(batch_size);
        for (id, dist) in ranked {
            if batch.len() == batch_size {
                break;
            }
            if scratch.insert(id) {
                batch.push((id, dist));
            }
        }
        self.yielded = scratch;

        if batch.is_empty() {
            self.exhausted = true;
        }
        Ok(batch)
    }

    pub fn done(&self) -> bool {
        self.exhausted || self.params.n_probes >= self.index.num_clusters()
    }

    pub fn update(&mut self, new_query: &[f32]) {
        self.query = new_query.to_vec();
        self.yielded.clear();
        self.exhausted = false;
        self.restart_next_search = true;
    }

    pub fn num_yielded(&self) -> usize {
        self.yielded.len()
    }
}
