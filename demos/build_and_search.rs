//! Minimal end-to-end walkthrough: build a Vamana index over a small
//! synthetic corpus, run a top-k query, then save and reload the index.
//!
//! ```bash
//! cargo run --example build_and_search
//! ```

use tempfile::tempdir;
use vsearch::data::dense::DenseDataset;
use vsearch::saveload::{load_from_directory, save_to_directory};
use vsearch::{BuildParameters, Metric, SearchParameters, VamanaIndex};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let dim = 16;
    let n = 2_000;
    let rows: Vec<Vec<f32>> = (0..n)
        .map(|i| (0..dim).map(|d| ((i * 7 + d) % 97) as f32).collect())
        .collect();
    let data = DenseDataset::from_rows(dim, &rows)?;

    let build_params = BuildParameters::new(1.2, 32, 64);
    let index = VamanaIndex::build(data, Metric::L2, &build_params, 42)?;
    println!("built Vamana index: {} points, {} dims", index.size(), index.dimensions());

    let query: Vec<f32> = (0..dim).map(|d| ((500 * 7 + d) % 97) as f32).collect();
    let search_params = SearchParameters::new(64);
    let results = index.search(&query, 5, &search_params)?;
    println!("top-5 neighbors of point 500: {results:?}");

    let dir = tempdir()?;
    save_to_directory(dir.path(), &index)?;
    let reloaded: VamanaIndex<DenseDataset> = load_from_directory(dir.path())?;
    let reloaded_results = reloaded.search(&query, 5, &search_params)?;
    assert_eq!(results, reloaded_results, "reloaded index must answer identically");
    println!("save/load round-trip verified at {:?}", dir.path());

    Ok(())
}
