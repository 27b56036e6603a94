//! Greedy beam search over the Vamana graph (C5): initialize the buffer
//! from a set of entry points, then repeatedly expand the best unvisited
//! candidate's out-neighbors until the buffer is done or cancelled.

use crate::buffer::{Neighbor, SearchBuffer};
use crate::data::Dataset;
use crate::distance::{fix_argument, score_view, Metric};
use crate::error::Result;
use crate::graph::Graph;
use crate::vamana::params::SearchParameters;

/// Run greedy search for `query` starting from `entry_points`, writing
/// results into `buffer` (cleared first). `cancel` is polled once per
/// outer iteration; on cancellation the buffer is left in a consistent
/// partial state and returned as-is, matching §4.5.
pub fn greedy_search<D: Dataset>(
    query: &[f32],
    data: &D,
    graph: &Graph,
    metric: Metric,
    entry_points: &[u32],
    buffer: &mut SearchBuffer,
    params: &SearchParameters,
    cancel: &dyn Fn() -> bool,
) -> Result<()> {
    buffer.clear();
    let fixed = fix_argument(metric, query);

    for &ep in entry_points {
        if buffer.already_seen(ep) {
            continue;
        }
        let view = data.get(ep as usize)?;
        let d = score_view(metric, &fixed, &view);
        buffer.insert(Neighbor::new(ep, d));
    }

    while !buffer.done() {
        if cancel() {
            break;
        }
        let Some(current) = buffer.best_unvisited() else {
            break;
        };
        let neighbors = graph.get_neighbors(current.id as usize)?;

        for (pos, &nb) in neighbors.iter().enumerate() {
            if params.prefetch_lookahead > 0 {
                let lookahead = pos + params.prefetch_lookahead * params.prefetch_step.max(1);
                if let Some(&future) = neighbors.get(lookahead) {
                    data.prefetch(future as usize);
                }
            }
            if cancel() {
                return Ok(());
            }
            if buffer.already_seen(nb) {
                continue;
            }
            let view = data.get(nb as usize)?;
            let d = score_view(metric, &fixed, &view);
            buffer.insert(Neighbor::new(nb, d));
        }
    }

    if data.uses_reranking() {
        rerank(data, metric, query, buffer)?;
    }

    Ok(())
}

/// Re-score every entry in `buffer` against the dataset's higher-fidelity
/// accessor and restore sorted order (§4.5's rerank hook).
fn rerank<D: Dataset>(data: &D, metric: Metric, query: &[f32], buffer: &mut SearchBuffer) -> Result<()> {
    let fixed = fix_argument(metric, query);
    for entry in buffer.entries_mut() {
        let view = data.get_primary(entry.id as usize)?;
        entry.distance = score_view(metric, &fixed, &view);
    }
    buffer.resort();
    Ok(())
}

/// The medoid entry-point policy (§4.5): argmin (per the metric's
/// comparator) of a sampled point's mean distance to the rest of the
/// sample. Capped at `max_sample` points to keep the O(sample^2) cost
/// bounded for large datasets; static build uses this once, dynamic
/// indexes re-run it only when the current entry point is deleted.
pub fn compute_medoid<D: Dataset>(data: &D, metric: Metric, candidates: &[u32]) -> Result<u32> {
    assert!(!candidates.is_empty(), "medoid requires at least one candidate");
    let cmp = metric.comparator();
    let mut best_id = candidates[0];
    let mut best_mean = cmp.worst_possible();

    for &i in candidates {
        let row_i = data.get(i as usize)?.to_f32_vec();
        let fixed = fix_argument(metric, &row_i);
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for &j in candidates {
            if i == j {
                continue;
            }
            let view_j = data.get(j as usize)?;
            sum += score_view(metric, &fixed, &view_j);
            count += 1;
        }
        let mean = if count > 0 { sum / count as f32 } else { 0.0 };
        if cmp.is_better(mean, best_mean) {
            best_mean = mean;
            best_id = i;
        }
    }
    Ok(best_id)
}
