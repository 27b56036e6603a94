//! `Saveable` implementations for the crate's core types (C11).
//!
//! Each `impl` follows the same shape: scalar/structural fields go straight
//! into the returned [`Table`]; anything that is really an array of
//! integers or floats goes out as a [`BinaryBlobRecord`]-tagged sidecar file
//! via `bincode`, keeping the TOML document itself small and human-legible.

use crate::data::dense::DenseDataset;
use crate::data::Dataset;
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::ivf::clustering::{ClusterMembers, Clustering};
use crate::ivf::search::{IvfIndex, Storage};
use crate::translator::IdTranslator;
use crate::vamana::{BuildParameters, VamanaIndex};
use crate::version::{Version, CURRENT_GLOBAL_VERSION};

use super::table::{BinaryBlobRecord, Table};
use super::{LoadContext, SaveContext, Saveable};

fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::L2 => "l2",
        Metric::InnerProduct => "inner_product",
        Metric::Cosine => "cosine",
    }
}

fn metric_from_name(name: &str) -> Result<Metric> {
    match name {
        "l2" => Ok(Metric::L2),
        "inner_product" => Ok(Metric::InnerProduct),
        "cosine" => Ok(Metric::Cosine),
        other => Err(Error::serialization(None, format!("unknown metric tag {other:?}"))),
    }
}

fn encode_blob(ctx: &mut SaveContext, prefix: &str, element_type: &str, element_size: usize, bytes: Vec<u8>, num_elements: usize) -> Result<Table> {
    let filename = ctx.generate_name(prefix, "bin");
    ctx.write_blob(&filename, &bytes)?;
    let blob = BinaryBlobRecord { filename, element_size, element_type: element_type.to_string(), num_elements };
    Ok(blob.to_table())
}

fn decode_blob<T: serde::de::DeserializeOwned>(ctx: &LoadContext, blob_table: &Table) -> Result<T> {
    let blob = BinaryBlobRecord::from_table(blob_table)?;
    let bytes = ctx.read_blob(&blob.filename)?;
    bincode::deserialize(&bytes).map_err(|e| Error::serialization(None, format!("malformed blob {}: {e}", blob.filename)))
}

impl Saveable for DenseDataset {
    fn schema() -> &'static str {
        "vsearch.data.dense"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let bytes = bincode::serialize(self.raw())
            .map_err(|e| Error::serialization(None, format!("failed to encode dense dataset: {e}")))?;
        let blob = encode_blob(ctx, "dense_data", "f32", 4, bytes, self.raw().len())?;

        let mut t = Table::new();
        t.insert_int("dim", self.dimensions() as i64);
        t.insert_int("size", self.size() as i64);
        t.insert_table("blob", blob);
        Ok(t)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let dim = table.get_usize("dim")?;
        let size = table.get_usize("size")?;
        let blob_table = table.get_table("blob")?;
        let flat: Vec<f32> = decode_blob(ctx, &blob_table)?;
        if flat.len() != dim * size {
            return Err(Error::serialization(
                None,
                format!("dense dataset blob has {} elements, expected dim*size = {dim}*{size}", flat.len()),
            ));
        }
        DenseDataset::from_flat(dim, flat)
    }
}

impl Saveable for Graph {
    fn schema() -> &'static str {
        "vsearch.graph"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let bytes = bincode::serialize(self.raw_adjacency())
            .map_err(|e| Error::serialization(None, format!("failed to encode graph adjacency: {e}")))?;
        let blob = encode_blob(ctx, "graph_adjacency", "u32", 4, bytes, self.raw_adjacency().len())?;

        let mut t = Table::new();
        t.insert_int("num_nodes", self.num_nodes() as i64);
        t.insert_int("max_degree", self.max_degree() as i64);
        t.insert_table("blob", blob);
        Ok(t)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let num_nodes = table.get_usize("num_nodes")?;
        let max_degree = table.get_usize("max_degree")?;
        let blob_table = table.get_table("blob")?;
        let adjacency: Vec<u32> = decode_blob(ctx, &blob_table)?;
        Graph::from_raw_parts(num_nodes, max_degree, adjacency)
    }
}

impl Saveable for IdTranslator {
    fn schema() -> &'static str {
        "vsearch.translator"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let pairs: Vec<(u64, u32)> = self.iter().collect();
        let bytes = bincode::serialize(&pairs)
            .map_err(|e| Error::serialization(None, format!("failed to encode id translator: {e}")))?;
        let blob = encode_blob(ctx, "translator_pairs", "(u64,u32)", 12, bytes, pairs.len())?;

        let mut t = Table::new();
        t.insert_table("blob", blob);
        Ok(t)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let blob_table = table.get_table("blob")?;
        let pairs: Vec<(u64, u32)> = decode_blob(ctx, &blob_table)?;
        let mut translator = IdTranslator::new();
        let external: Vec<u64> = pairs.iter().map(|(e, _)| *e).collect();
        let internal: Vec<u32> = pairs.iter().map(|(_, i)| *i).collect();
        translator.insert(&external, &internal, true)?;
        Ok(translator)
    }
}

/// `BuildParameters` is saved inline as part of a Vamana index's config
/// table rather than as its own artifact, since it never appears detached
/// from the graph/data it describes; `from_saved` (already version-aware
/// for the `v0.0.0` `prune_to` substitution, §8 scenario 2) does the actual
/// reconstruction once [`VamanaIndex::load`] has pulled the version out of
/// the surrounding config table.
fn save_build_params(params: &BuildParameters) -> Table {
    let mut t = Table::new();
    t.insert_float("alpha", params.alpha as f64);
    t.insert_int("graph_max_degree", params.graph_max_degree as i64);
    t.insert_int("window_size", params.window_size as i64);
    t.insert_int("max_candidates", params.max_candidates as i64);
    t.insert_int("prune_to", params.prune_to as i64);
    t.insert_bool("use_full_search_history", params.use_full_search_history);
    t
}

fn load_build_params(table: &Table, version: Version) -> Result<BuildParameters> {
    BuildParameters::from_saved(
        version,
        table.get_f32("alpha")?,
        table.get_usize("graph_max_degree")?,
        table.get_usize("window_size")?,
        table.get_usize("max_candidates")?,
        table.get_usize_opt("prune_to"),
        table.get_bool("use_full_search_history")?,
    )
}

impl<D: Dataset + Sync + Saveable> Saveable for VamanaIndex<D> {
    fn schema() -> &'static str {
        "vsearch.vamana.index"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let mut config = save_build_params(self.build_params());
        config.insert_int("entry_point", self.entry_point() as i64);
        config.insert_str("metric", metric_name(self.metric()));
        config.insert_str("__version__", Self::save_version().to_string());

        let mut graph_ctx = ctx.subdirectory("vamana_graph")?;
        let graph_table = self.graph().save(&mut graph_ctx)?;

        let mut data_ctx = ctx.subdirectory("vamana_data")?;
        let data_table = self.data().save(&mut data_ctx)?;

        let mut translator_ctx = ctx.subdirectory("vamana_translator")?;
        let translator_table = self.translator().save(&mut translator_ctx)?;

        let mut object = Table::new();
        object.insert_table("config", config);
        object.insert_table("graph", graph_table);
        object.insert_table("data", data_table);
        object.insert_table("translator", translator_table);
        Ok(object)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let config = table.get_table("config")?;
        let config_version: Version = config
            .get_str("__version__")?
            .parse()
            .map_err(|_: Error| Error::serialization(None, "malformed vamana config version"))?;
        let build_params = load_build_params(&config, config_version)?;
        let entry_point = config.get_usize("entry_point")? as u32;
        let metric = metric_from_name(config.get_str("metric")?)?;

        let graph_table = table.get_table("graph")?;
        let graph = Graph::load(&graph_table, &ctx.subdirectory("vamana_graph"))?;

        let data_table = table.get_table("data")?;
        let data = D::load(&data_table, &ctx.subdirectory("vamana_data"))?;

        let translator_table = table.get_table("translator")?;
        let translator = IdTranslator::load(&translator_table, &ctx.subdirectory("vamana_translator"))?;

        Ok(VamanaIndex::from_parts(data, graph, translator, metric, entry_point, build_params))
    }
}

impl Saveable for Clustering {
    fn schema() -> &'static str {
        "vsearch.ivf.clustering"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let mut centroid_ctx = ctx.subdirectory("centroids")?;
        let centroid_table = self.centroids().save(&mut centroid_ctx)?;

        let counts: Vec<u64> = self.assignments().iter().map(|m| m.ids.len() as u64).collect();
        let flat_ids: Vec<u32> = self.assignments().iter().flat_map(|m| m.ids.iter().copied()).collect();
        let bytes = bincode::serialize(&flat_ids)
            .map_err(|e| Error::serialization(None, format!("failed to encode cluster membership: {e}")))?;
        let blob = encode_blob(ctx, "ivf_members", "u32", 4, bytes, flat_ids.len())?;

        let mut object = Table::new();
        object.insert_table("centroids", centroid_table);
        object.insert_int_array("member_counts", &counts);
        object.insert_table("members_blob", blob);
        object.insert_str("metric", metric_name(self.metric()));
        Ok(object)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let centroid_table = table.get_table("centroids")?;
        let centroids = DenseDataset::load(&centroid_table, &ctx.subdirectory("centroids"))?;

        let counts = table.get_int_array("member_counts")?;
        let blob_table = table.get_table("members_blob")?;
        let flat_ids: Vec<u32> = decode_blob(ctx, &blob_table)?;

        let mut assignments = Vec::with_capacity(counts.len());
        let mut offset = 0usize;
        for count in counts {
            let count = count as usize;
            if offset + count > flat_ids.len() {
                return Err(Error::serialization(None, "cluster membership blob shorter than member_counts implies"));
            }
            assignments.push(ClusterMembers { ids: flat_ids[offset..offset + count].to_vec() });
            offset += count;
        }

        let metric = metric_from_name(table.get_str("metric")?)?;
        Ok(Clustering::from_parts(centroids, assignments, metric))
    }
}

impl<D: Dataset + Saveable> Saveable for IvfIndex<D> {
    fn schema() -> &'static str {
        "vsearch.ivf.index"
    }

    fn save_version() -> Version {
        CURRENT_GLOBAL_VERSION
    }

    fn save(&self, ctx: &mut SaveContext) -> Result<Table> {
        let mut clustering_ctx = ctx.subdirectory("ivf_clustering")?;
        let clustering_table = self.clustering().save(&mut clustering_ctx)?;

        let mut data_ctx = ctx.subdirectory("ivf_data")?;
        let data_table = self.data().save(&mut data_ctx)?;

        let mut translator_ctx = ctx.subdirectory("ivf_translator")?;
        let translator_table = self.translator().save(&mut translator_ctx)?;

        let mut object = Table::new();
        object.insert_table("clustering", clustering_table);
        object.insert_table("data", data_table);
        object.insert_table("translator", translator_table);

        match self.storage() {
            Storage::Sparse => {
                object.insert_str("storage", "sparse");
            }
            Storage::Dense(per_cluster) => {
                object.insert_str("storage", "dense");
                let mut cluster_ctx = ctx.subdirectory("ivf_clusters")?;
                let mut cluster_tables = Vec::with_capacity(per_cluster.len());
                for (i, cluster_data) in per_cluster.iter().enumerate() {
                    let mut sub_ctx = cluster_ctx.subdirectory(&format!("cluster_{i}"))?;
                    cluster_tables.push(cluster_data.save(&mut sub_ctx)?);
                }
                object.insert_table_array("clusters", cluster_tables);
            }
        }
        Ok(object)
    }

    fn load(table: &Table, ctx: &LoadContext) -> Result<Self> {
        let clustering_table = table.get_table("clustering")?;
        let clustering = Clustering::load(&clustering_table, &ctx.subdirectory("ivf_clustering"))?;

        let data_table = table.get_table("data")?;
        let data = D::load(&data_table, &ctx.subdirectory("ivf_data"))?;

        let translator_table = table.get_table("translator")?;
        let translator = IdTranslator::load(&translator_table, &ctx.subdirectory("ivf_translator"))?;

        let storage = match table.get_str("storage")? {
            "sparse" => Storage::Sparse,
            "dense" => {
                let cluster_tables = table.get_table_array("clusters")?;
                let cluster_ctx_root = ctx.subdirectory("ivf_clusters");
                let mut per_cluster = Vec::with_capacity(cluster_tables.len());
                for (i, t) in cluster_tables.iter().enumerate() {
                    let sub_ctx = cluster_ctx_root.subdirectory(&format!("cluster_{i}"));
                    per_cluster.push(DenseDataset::load(t, &sub_ctx)?);
                }
                Storage::Dense(per_cluster)
            }
            other => return Err(Error::serialization(None, format!("unknown ivf storage kind {other:?}"))),
        };

        Ok(IvfIndex::from_raw_parts(data, clustering, translator, storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ivf::build_and_assemble;
    use crate::ivf::kmeans::KMeansParameters;
    use crate::ivf::search::IvfSearchParameters;
    use crate::saveload::{load_from_directory, save_to_directory};
    use crate::vamana::SearchParameters;
    use tempfile::tempdir;

    fn line_dataset(n: usize, dim: usize) -> DenseDataset {
        let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32; dim]).collect();
        DenseDataset::from_rows(dim, &rows).unwrap()
    }

    #[test]
    fn dense_dataset_round_trips_through_directory() {
        let dir = tempdir().unwrap();
        let data = line_dataset(20, 4);
        save_to_directory(dir.path(), &data).unwrap();
        let loaded: DenseDataset = load_from_directory(dir.path()).unwrap();
        assert_eq!(loaded.size(), data.size());
        assert_eq!(loaded.raw(), data.raw());
    }

    #[test]
    fn graph_round_trips_through_directory() {
        let dir = tempdir().unwrap();
        let mut g = Graph::new(4, 3);
        g.set_neighbors(0, &[1, 2]).unwrap();
        g.set_neighbors(1, &[2]).unwrap();
        save_to_directory(dir.path(), &g).unwrap();
        let loaded: Graph = load_from_directory(dir.path()).unwrap();
        assert_eq!(loaded.get_neighbors(0).unwrap(), &[1, 2]);
        assert_eq!(loaded.get_neighbors(1).unwrap(), &[2]);
        assert_eq!(loaded.num_nodes(), 4);
        assert_eq!(loaded.max_degree(), 3);
    }

    #[test]
    fn id_translator_round_trips_after_mutation() {
        let dir = tempdir().unwrap();
        let mut t = IdTranslator::identity(5);
        t.delete_external(2).unwrap();
        save_to_directory(dir.path(), &t).unwrap();
        let loaded: IdTranslator = load_from_directory(dir.path()).unwrap();
        assert_eq!(loaded.size(), 4);
        assert!(loaded.get_internal(2).is_err());
        assert_eq!(loaded.get_internal(3).unwrap(), 3);
    }

    #[test]
    fn vamana_index_round_trips_and_still_finds_nearest() {
        let dir = tempdir().unwrap();
        let data = line_dataset(200, 8);
        let params = BuildParameters::new(1.2, 16, 32);
        let index = VamanaIndex::build(data, Metric::L2, &params, 11).unwrap();
        save_to_directory(dir.path(), &index).unwrap();

        let loaded: VamanaIndex<DenseDataset> = load_from_directory(dir.path()).unwrap();
        assert_eq!(loaded.size(), index.size());
        assert_eq!(loaded.entry_point(), index.entry_point());
        assert_eq!(loaded.build_params().graph_max_degree, index.build_params().graph_max_degree);

        let query = vec![100.3; 8];
        let results = loaded.search(&query, 5, &SearchParameters::default()).unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&100), "expected the closest point (id 100) among {ids:?}");
    }

    #[test]
    fn ivf_sparse_index_round_trips() {
        let dir = tempdir().unwrap();
        let mut rows = Vec::new();
        for i in 0..40 {
            rows.push(vec![(i % 5) as f32 * 0.01; 4]);
        }
        for i in 0..40 {
            rows.push(vec![100.0 + (i % 5) as f32 * 0.01; 4]);
        }
        let data = DenseDataset::from_rows(4, &rows).unwrap();
        let params = KMeansParameters::new(2, 10, 3);
        let index = build_and_assemble(data, Metric::L2, &params).unwrap();
        save_to_directory(dir.path(), &index).unwrap();

        let loaded: IvfIndex<DenseDataset> = load_from_directory(dir.path()).unwrap();
        let results = loaded.search(&[0.0; 4], 5, &IvfSearchParameters::new(2)).unwrap();
        assert_eq!(results.len(), 5);
        for (id, _) in &results {
            assert!(*id < 40, "expected a near-zero-blob id, got {id}");
        }
    }

    #[test]
    fn ivf_dense_index_round_trips() {
        let dir = tempdir().unwrap();
        let mut rows = Vec::new();
        for i in 0..30 {
            rows.push(vec![(i % 5) as f32 * 0.01; 4]);
        }
        for i in 0..30 {
            rows.push(vec![100.0 + (i % 5) as f32 * 0.01; 4]);
        }
        let data = DenseDataset::from_rows(4, &rows).unwrap();
        let params = KMeansParameters::new(2, 10, 3);
        let clustering = Clustering::build(&data, Metric::L2, &params).unwrap();
        let index = IvfIndex::assemble_dense(data, clustering).unwrap();
        save_to_directory(dir.path(), &index).unwrap();

        let loaded: IvfIndex<DenseDataset> = load_from_directory(dir.path()).unwrap();
        let results = loaded.search(&[100.0; 4], 5, &IvfSearchParameters::new(2)).unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn loading_with_wrong_schema_errors() {
        let dir = tempdir().unwrap();
        let data = line_dataset(10, 4);
        save_to_directory(dir.path(), &data).unwrap();
        let err = load_from_directory::<Graph>(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
