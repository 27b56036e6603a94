//! Vamana build (C6): two-pass candidate-gather + robust-prune construction
//! over a permutation of nodes, and the standalone `robust_prune` routine
//! dynamic insert/consolidate also call against a single node's candidate
//! pool.

use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::buffer::{Neighbor, SearchBuffer};
use crate::data::Dataset;
use crate::distance::{fix_argument, score_view, Comparator, Metric};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::vamana::params::BuildParameters;
use crate::vamana::search::{compute_medoid, greedy_search};

/// Sort order helper: "better" (per `cmp`) sorts first.
fn sort_by_comparator(entries: &mut [Neighbor], cmp: Comparator) {
    entries.sort_by(|a, b| {
        if cmp.is_better(a.distance, b.distance) {
            std::cmp::Ordering::Less
        } else if cmp.is_better(b.distance, a.distance) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
}

/// The alpha-scaled threshold a candidate's distance to an already-accepted
/// neighbor must beat to survive pruning. Generalizes the usual
/// `distance(v,c) / alpha` formula (written for "smaller is closer"
/// metrics) to comparator-greater metrics by scaling in the direction that
/// keeps `alpha < 1` tightening the threshold for both families.
fn prune_threshold(cmp: Comparator, dist_v_c: f32, alpha: f32) -> f32 {
    match cmp {
        Comparator::Less => dist_v_c / alpha,
        Comparator::Greater => dist_v_c * alpha,
    }
}

/// True if `dist_cprime_c` means "c' already covers c", so c should be
/// rejected from the accepted set.
fn prune_rejects(cmp: Comparator, dist_cprime_c: f32, threshold: f32) -> bool {
    match cmp {
        Comparator::Less => dist_cprime_c <= threshold,
        Comparator::Greater => dist_cprime_c >= threshold,
    }
}

pub(crate) fn point_distance<D: Dataset>(data: &D, metric: Metric, a: u32, b: u32) -> Result<f32> {
    let row_a = data.get(a as usize)?.to_f32_vec();
    let fixed = fix_argument(metric, &row_a);
    let view_b = data.get(b as usize)?;
    Ok(score_view(metric, &fixed, &view_b))
}

/// Robust prune (§4.6 step 3): sort `candidates` (already scored relative
/// to `node`) by the metric's comparator, then greedily accept a candidate
/// iff every previously accepted candidate is farther from it than
/// `node`'s distance to it, scaled by `alpha`. Stops at `prune_to`
/// accepted neighbors.
pub fn robust_prune<D: Dataset>(
    data: &D,
    metric: Metric,
    node: u32,
    candidates: Vec<Neighbor>,
    alpha: f32,
    prune_to: usize,
) -> Result<Vec<u32>> {
    let cmp = metric.comparator();
    let mut pool: Vec<Neighbor> = candidates.into_iter().filter(|c| c.id != node).collect();
    sort_by_comparator(&mut pool, cmp);

    let mut accepted: Vec<Neighbor> = Vec::with_capacity(prune_to);
    for candidate in pool {
        if accepted.len() >= prune_to {
            break;
        }
        let threshold = prune_threshold(cmp, candidate.distance, alpha);
        let mut keep = true;
        for &acc in &accepted {
            let d = point_distance(data, metric, acc.id, candidate.id)?;
            if prune_rejects(cmp, d, threshold) {
                keep = false;
                break;
            }
        }
        if keep {
            accepted.push(candidate);
        }
    }
    Ok(accepted.into_iter().map(|n| n.id).collect())
}

/// Gather the candidate pool for node `v` in one build round: the contents
/// of a greedy search from the entry point plus `v`'s existing neighbors,
/// deduplicated, truncated to `max_candidates`.
fn gather_candidates<D: Dataset>(
    data: &D,
    graph: &Graph,
    metric: Metric,
    v: u32,
    entry_point: u32,
    params: &BuildParameters,
) -> Result<Vec<Neighbor>> {
    let query = data.get(v as usize)?.to_f32_vec();
    let search_capacity = if params.use_full_search_history {
        params.max_candidates
    } else {
        params.window_size
    };
    let mut buffer = SearchBuffer::new(params.window_size, search_capacity, metric.comparator());
    let search_params = crate::vamana::params::SearchParameters::new(params.window_size)
        .with_capacity(search_capacity);
    greedy_search(&query, data, graph, metric, &[entry_point], &mut buffer, &search_params, &|| false)?;

    let mut pool: Vec<Neighbor> = buffer.iter().copied().filter(|n| n.id != v).collect();
    let existing = graph.get_neighbors(v as usize)?;
    for &e in existing {
        if pool.iter().any(|n| n.id == e) || e == v {
            continue;
        }
        let d = point_distance(data, metric, v, e)?;
        pool.push(Neighbor::new(e, d));
    }

    sort_by_comparator(&mut pool, metric.comparator());
    pool.truncate(params.max_candidates);
    Ok(pool)
}

/// Re-sort every row the preceding round touched (per [`Graph::is_dirty`])
/// by `(distance to the row, id)`, so byte-equal output no longer depends
/// on which concurrent worker happened to win a row's lock during
/// back-propagation. Robust-pruned rows are already in this order; this
/// only changes rows that only ever received back-propagated appends
/// (`insert_node_into_graph`'s `merged.push(v)`), whose append order is
/// otherwise a race between workers (§8 "build idempotence").
fn canonicalize_dirty_rows<D: Dataset>(data: &D, metric: Metric, graph: &mut Graph) -> Result<()> {
    let cmp = metric.comparator();
    for i in 0..graph.num_nodes() {
        if !graph.is_dirty(i) {
            continue;
        }
        let neighbors = graph.get_neighbors(i)?.to_vec();
        if neighbors.len() > 1 {
            let mut scored = Vec::with_capacity(neighbors.len());
            for nb in neighbors {
                let d = point_distance(data, metric, i as u32, nb)?;
                scored.push(Neighbor::new(nb, d));
            }
            scored.sort_by(|a, b| {
                if cmp.is_better(a.distance, b.distance) {
                    std::cmp::Ordering::Less
                } else if cmp.is_better(b.distance, a.distance) {
                    std::cmp::Ordering::Greater
                } else {
                    a.id.cmp(&b.id)
                }
            });
            let ordered: Vec<u32> = scored.into_iter().map(|n| n.id).collect();
            graph.set_neighbors(i, &ordered)?;
        }
    }
    Ok(())
}

/// Run one build round over a permutation of `[0, n)`: gather candidates,
/// robust-prune to `v`'s new neighbor list, then back-propagate `v` into
/// each new neighbor's list (pruning that neighbor too if it now exceeds
/// `R`). Runs in parallel across nodes; the graph's per-row locks (used via
/// `edit_neighbors_locked`) make concurrent edits to the same row safe.
fn run_build_round<D: Dataset + Sync>(
    data: &D,
    metric: Metric,
    graph: &Graph,
    entry_point: u32,
    params: &BuildParameters,
    alpha: f32,
    permutation: &[u32],
) -> Result<()> {
    permutation
        .par_iter()
        .try_for_each(|&v| insert_node_into_graph(data, metric, graph, entry_point, params, alpha, v))
}

/// The per-node unit of a build round (§4.6 steps 1-4), also reused by
/// dynamic insert (§4.7) for its single-node build step: gather `v`'s
/// candidate pool, robust-prune it into `v`'s new neighbor list, then
/// back-propagate `v` into each accepted neighbor's list, re-pruning that
/// neighbor if it now exceeds `R`.
pub(crate) fn insert_node_into_graph<D: Dataset + Sync>(
    data: &D,
    metric: Metric,
    graph: &Graph,
    entry_point: u32,
    params: &BuildParameters,
    alpha: f32,
    v: u32,
) -> Result<()> {
    let candidates = gather_candidates(data, graph, metric, v, entry_point, params)?;
    let new_neighbors = robust_prune(data, metric, v, candidates, alpha, params.prune_to)?;

    unsafe {
        graph.edit_neighbors_locked(v as usize, |_old| new_neighbors.clone())?;
    }

    for &c in &new_neighbors {
        unsafe {
            graph.edit_neighbors_locked(c as usize, |existing| {
                if existing.contains(&v) {
                    return existing.to_vec();
                }
                let mut merged = existing.to_vec();
                merged.push(v);
                merged
            })?;
        }
        if graph.degree(c as usize) > params.graph_max_degree {
            let existing = graph.get_neighbors(c as usize)?;
            let mut pool = Vec::with_capacity(existing.len());
            for &e in existing {
                let d = point_distance(data, metric, c, e)?;
                pool.push(Neighbor::new(e, d));
            }
            let pruned = robust_prune(data, metric, c, pool, alpha, params.prune_to)?;
            unsafe {
                graph.edit_neighbors_locked(c as usize, |_old| pruned)?;
            }
        }
    }
    Ok(())
}

/// Build a static Vamana graph over `data` (§4.6). Deterministic given
/// `seed`: the node permutation for both build passes is a Fisher-Yates
/// shuffle of `ChaCha8Rng::seed_from_u64(seed)`. Returns the graph and its
/// chosen medoid entry point.
pub fn build_vamana_graph<D: Dataset + Sync>(
    data: &D,
    metric: Metric,
    params: &BuildParameters,
    seed: u64,
) -> Result<(Graph, u32)> {
    params.validate()?;
    let n = data.size();
    if n == 0 {
        return Err(Error::invalid_input("cannot build a Vamana graph over an empty dataset"));
    }

    let mut graph = Graph::new(n, params.graph_max_degree);
    let sample_size = n.min(64);
    let sample: Vec<u32> = (0..sample_size as u32).collect();
    let entry_point = compute_medoid(data, metric, &sample)?;

    if n > 1 {
        initialize_random_graph(&mut graph, n, params.graph_max_degree, seed)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut permutation: Vec<u32> = (0..n as u32).collect();
        permutation.shuffle(&mut rng);

        run_build_round(data, metric, &graph, entry_point, params, 1.0, &permutation)?;
        canonicalize_dirty_rows(data, metric, &mut graph)?;
        graph.clear_all_dirty();

        let mut rng2 = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let mut permutation2: Vec<u32> = (0..n as u32).collect();
        permutation2.shuffle(&mut rng2);
        run_build_round(data, metric, &graph, entry_point, params, params.alpha, &permutation2)?;
        canonicalize_dirty_rows(data, metric, &mut graph)?;
    }

    for i in 0..n {
        if n > 1 && graph.degree(i) == 0 {
            tracing::warn!(node = i, "node ended Vamana build with zero out-neighbors");
        }
    }

    graph.clear_all_dirty();
    Ok((graph, entry_point))
}

/// Seed every node with up to `degree` random out-neighbors so the first
/// build round's greedy search has somewhere to go.
fn initialize_random_graph(graph: &mut Graph, n: usize, degree: usize, seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5EED_5EED);
    let degree = degree.min(n.saturating_sub(1));
    for i in 0..n {
        let mut candidates: Vec<u32> = (0..n as u32).filter(|&j| j as usize != i).collect();
        candidates.shuffle(&mut rng);
        candidates.truncate(degree);
        graph.set_neighbors(i, &candidates)?;
    }
    Ok(())
}
