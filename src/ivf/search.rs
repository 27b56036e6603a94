//! IVF search (C9): probe the nearest clusters, scan their members, and
//! optionally rerank against a higher-fidelity dataset.

use crate::buffer::{Neighbor, SearchBuffer};
use crate::data::dense::DenseDataset;
use crate::data::Dataset;
use crate::distance::{fix_argument, score_view, Metric};
use crate::error::{Error, Result};
use crate::ivf::clustering::Clustering;
use crate::translator::IdTranslator;

/// Parameters for one IVF query (§4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvfSearchParameters {
    /// Number of clusters to scan.
    pub n_probes: usize,
    /// `1.0` = no rerank; `>1.0` = fetch `k * k_reorder` candidates,
    /// rerank against the primary dataset, return top `k`.
    pub k_reorder: f32,
}

impl IvfSearchParameters {
    pub fn new(n_probes: usize) -> Self {
        Self { n_probes, k_reorder: 1.0 }
    }

    pub fn with_k_reorder(mut self, k_reorder: f32) -> Self {
        self.k_reorder = k_reorder.max(1.0);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_probes == 0 {
            return Err(Error::invalid_input("n_probes must be > 0"));
        }
        if self.k_reorder < 1.0 {
            return Err(Error::invalid_input(format!("k_reorder must be >= 1.0, got {}", self.k_reorder)));
        }
        Ok(())
    }
}

impl Default for IvfSearchParameters {
    fn default() -> Self {
        Self::new(8)
    }
}

/// The member-storage strategy a built index uses when scanning a probed
/// cluster (§4.9): sparse shares one dataset and indexes into it by global
/// id, dense gives each cluster a contiguous copy of just its members.
pub(crate) enum Storage {
    Sparse,
    Dense(Vec<DenseDataset>),
}

/// A searchable IVF index: a clustering plus the dataset it was built
/// over (sparse) or a per-cluster member copy (dense).
pub struct IvfIndex<D> {
    data: D,
    clustering: Clustering,
    translator: IdTranslator,
    storage: Storage,
}

impl<D: Dataset> IvfIndex<D> {
    /// Assemble a sparse index: clusters store `(local_idx, global_id)`
    /// pairs into the one shared `data`, as `clustering.members()` already
    /// does.
    pub fn assemble_sparse(data: D, clustering: Clustering) -> Self {
        let translator = IdTranslator::identity(data.size());
        Self { data, clustering, translator, storage: Storage::Sparse }
    }

    pub fn assemble_sparse_with_ids(data: D, clustering: Clustering, external_ids: &[u64]) -> Result<Self> {
        let internal: Vec<u32> = (0..data.size() as u32).collect();
        let mut translator = IdTranslator::new();
        translator.insert(external_ids, &internal, true)?;
        Ok(Self { data, clustering, translator, storage: Storage::Sparse })
    }

    /// Assemble a dense index: copy each cluster's member rows into a
    /// contiguous per-cluster dataset for better scan locality, at the
    /// cost of duplicating member vectors that land in more than one
    /// cluster under overlapping assignment.
    pub fn assemble_dense(data: D, clustering: Clustering) -> Result<Self> {
        let translator = IdTranslator::identity(data.size());
        let dim = data.dimensions();
        let mut per_cluster = Vec::with_capacity(clustering.num_clusters());
        for c in 0..clustering.num_clusters() {
            let members = clustering.members(c)?;
            let mut cluster_data = DenseDataset::with_capacity(dim, members.len());
            for &m in members {
                let row = data.get(m as usize)?.to_f32_vec();
                cluster_data.push(&row)?;
            }
            per_cluster.push(cluster_data);
        }
        Ok(Self { data, clustering, translator, storage: Storage::Dense(per_cluster) })
    }

    pub fn num_clusters(&self) -> usize {
        self.clustering.num_clusters()
    }

    pub fn metric(&self) -> Metric {
        self.clustering.metric()
    }

    /// Reassemble an index from its constituent parts, as the save/load
    /// framework does on deserialization.
    pub(crate) fn from_raw_parts(data: D, clustering: Clustering, translator: IdTranslator, storage: Storage) -> Self {
        Self { data, clustering, translator, storage }
    }

    pub(crate) fn data(&self) -> &D {
        &self.data
    }

    pub(crate) fn clustering(&self) -> &Clustering {
        &self.clustering
    }

    pub(crate) fn translator(&self) -> &IdTranslator {
        &self.translator
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Top-`k` nearest neighbors of `query` (§4.9 algorithm steps 1-4).
    /// `query` is full-dimensional; it is projected into the dataset's
    /// native comparison space before centroid selection, matching the
    /// space the clustering itself was trained over.
    pub fn search(&self, query: &[f32], k: usize, params: &IvfSearchParameters) -> Result<Vec<(u64, f32)>> {
        params.validate()?;
        let query = self.data.project_query(query);
        let query = query.as_slice();
        let metric = self.clustering.metric();
        let n_probes = params.n_probes.min(self.clustering.num_clusters());
        let probes = self.clustering.nearest_centroids(query, n_probes)?;

        let capacity = ((k as f32) * params.k_reorder).ceil() as usize * n_probes.max(1);
        let capacity = capacity.max(k).max(1);
        let mut buffer = SearchBuffer::new(capacity, capacity, metric.comparator()).without_visited_set();

        let fixed = fix_argument(metric, query);
        for &(cluster, _) in &probes {
            let members = self.clustering.members(cluster)?;
            match &self.storage {
                Storage::Sparse => {
                    for (pos, &global_id) in members.iter().enumerate() {
                        if pos + 1 < members.len() {
                            self.data.prefetch(members[pos + 1] as usize);
                        }
                        let view = self.data.get(global_id as usize)?;
                        let d = score_view(metric, &fixed, &view);
                        buffer.insert(Neighbor::new(global_id, d));
                    }
                }
                Storage::Dense(per_cluster) => {
                    let cluster_data = &per_cluster[cluster];
                    for local in 0..cluster_data.size() {
                        if local + 1 < cluster_data.size() {
                            cluster_data.prefetch(local + 1);
                        }
                        let view = cluster_data.get(local)?;
                        let d = score_view(metric, &fixed, &view);
                        buffer.insert(Neighbor::new(members[local], d));
                    }
                }
            }
        }

        let reorder_count = ((k as f32) * params.k_reorder).ceil() as usize;
        if params.k_reorder > 1.0 && self.data.uses_reranking() {
            for entry in buffer.entries_mut().iter_mut().take(reorder_count) {
                let view = self.data.get_primary(entry.id as usize)?;
                entry.distance = score_view(metric, &fixed, &view);
            }
            buffer.resort();
        }

        let mut out = Vec::with_capacity(k);
        for n in buffer.top(k) {
            out.push((self.translator.get_external(n.id)?, n.distance));
        }
        Ok(out)
    }
}
