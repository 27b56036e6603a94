//! Distance kernels: per-metric scoring functors over `(query, point)`
//! pairs, an argument-fixing hook for metrics that want to precompute
//! something about the query, and a broadcast helper that hands one
//! functor copy to each worker thread.

/// Which comparator orders scores for a metric: smaller-is-closer or
/// larger-is-closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Less,
    Greater,
}

impl Comparator {
    /// Returns true if `candidate` is strictly better than `incumbent`
    /// under this comparator.
    #[inline]
    pub fn is_better(self, candidate: f32, incumbent: f32) -> bool {
        match self {
            Comparator::Less => candidate < incumbent,
            Comparator::Greater => candidate > incumbent,
        }
    }

    /// The identity element to seed a running "best so far" with.
    #[inline]
    pub fn worst_possible(self) -> f32 {
        match self {
            Comparator::Less => f32::INFINITY,
            Comparator::Greater => f32::NEG_INFINITY,
        }
    }
}

/// The distance metrics supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    L2,
    InnerProduct,
    Cosine,
}

impl Metric {
    #[inline]
    pub fn comparator(self) -> Comparator {
        match self {
            Metric::L2 | Metric::Cosine => Comparator::Less,
            Metric::InnerProduct => Comparator::Greater,
        }
    }

    /// Whether skipping `fix_argument` before `compute` is a logic error
    /// for this metric. Cosine must fix the query to know its norm; L2 and
    /// inner product tolerate an unfixed argument.
    #[inline]
    pub fn must_fix_argument(self) -> bool {
        matches!(self, Metric::Cosine)
    }

    /// Score `a` against `b` under this metric. Lower is better for
    /// `L2`/`Cosine`, higher is better for `InnerProduct` (see
    /// [`Metric::comparator`]). Never panics.
    #[inline]
    pub fn compute(self, a: &FixedQuery<'_>, b: &[f32]) -> f32 {
        match self {
            Metric::L2 => squared_l2(a.raw, b),
            Metric::InnerProduct => dot_product_unrolled(a.raw, b),
            Metric::Cosine => {
                let dot = dot_product_unrolled(a.raw, b);
                let inv_query_norm = a.inv_norm.unwrap_or(1.0);
                let b_norm = l2_norm(b);
                let inv_b_norm = if b_norm > 1e-12 { 1.0 / b_norm } else { 1.0 };
                // 1 - cosine_similarity, so that "less is closer" holds.
                1.0 - dot * inv_query_norm * inv_b_norm
            }
        }
    }
}

/// A query that has been pre-processed by [`fix_argument`] for repeated use
/// against many points.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuery<'a> {
    raw: &'a [f32],
    inv_norm: Option<f32>,
}

impl<'a> FixedQuery<'a> {
    pub fn raw(&self) -> &'a [f32] {
        self.raw
    }
}

/// Precompute whatever a metric needs from the query ahead of a batch of
/// `compute` calls. For `Cosine` this is the query's inverse L2 norm; for
/// `L2`/`InnerProduct` it is a transparent wrapper.
#[inline]
pub fn fix_argument(metric: Metric, query: &[f32]) -> FixedQuery<'_> {
    let inv_norm = match metric {
        Metric::Cosine => {
            let n = l2_norm(query);
            Some(if n > 1e-12 { 1.0 / n } else { 1.0 })
        }
        Metric::L2 | Metric::InnerProduct => None,
    };
    FixedQuery { raw: query, inv_norm }
}

/// Score a fixed query against a dataset row of any representation.
///
/// `F32` rows go straight through [`Metric::compute`]. Every other
/// [`crate::data::VectorView`] variant (half-precision, quantized codes,
/// owned decodes) is widened to `f32` first via
/// [`crate::data::VectorView::to_f32_vec`] and then scored the same way.
/// This keeps one code path correct for every dataset variant; a kernel
/// specialized to consume encoded bytes directly (the "typed dispatcher"
/// of the redesign notes) would skip the widening for the hot quantized
/// paths, but is not required for correctness.
#[inline]
pub fn score_view(metric: Metric, fixed: &FixedQuery<'_>, view: &crate::data::VectorView<'_>) -> f32 {
    match view {
        crate::data::VectorView::F32(slice) => metric.compute(fixed, slice),
        other => {
            let owned = other.to_f32_vec();
            metric.compute(fixed, &owned)
        }
    }
}

/// `n` independent copies of a (stateless) metric for concurrent per-thread
/// use. `Metric` carries no per-query state itself (that lives in
/// [`FixedQuery`]), so broadcasting collapses to `n` copies of a `Copy`
/// value.
#[derive(Debug, Clone)]
pub struct BroadcastDistance {
    metric: Metric,
    copies: usize,
}

impl BroadcastDistance {
    pub fn new(metric: Metric, n: usize) -> Self {
        Self { metric, copies: n.max(1) }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// One (logically independent, cheap-to-clone) functor per worker.
    pub fn per_worker(&self) -> Vec<Metric> {
        vec![self.metric; self.copies]
    }
}

#[inline]
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Squared Euclidean distance. Left un-rooted because every caller only
/// compares distances against each other, and `sqrt` is monotonic, so
/// skipping it preserves ordering while saving a transcendental call per
/// comparison.
#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len().min(b.len());
    let chunks = len / 8;

    let mut acc = [0.0f32; 8];
    // SAFETY: `chunks * 8 <= len <= a.len(), b.len()`.
    unsafe {
        for i in 0..chunks {
            let base = i * 8;
            for lane in 0..8 {
                let d = a.get_unchecked(base + lane) - b.get_unchecked(base + lane);
                acc[lane] += d * d;
            }
        }
    }
    let mut result: f32 = acc.iter().sum();
    for i in (chunks * 8)..len {
        let d = a[i] - b[i];
        result += d * d;
    }
    result
}

/// Hand-unrolled dot product: eight independent accumulators so the
/// hardware can overlap FMA latency instead of stalling on one dependency
/// chain.
#[inline(always)]
pub(crate) fn dot_product_unrolled(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len().min(b.len());
    let chunks = len / 8;

    let mut acc0 = 0.0f32;
    let mut acc1 = 0.0f32;
    let mut acc2 = 0.0f32;
    let mut acc3 = 0.0f32;
    let mut acc4 = 0.0f32;
    let mut acc5 = 0.0f32;
    let mut acc6 = 0.0f32;
    let mut acc7 = 0.0f32;

    // SAFETY: `i * 8 + 7 < chunks * 8 <= len <= a.len(), b.len()`.
    unsafe {
        for i in 0..chunks {
            let base = i * 8;
            acc0 += a.get_unchecked(base) * b.get_unchecked(base);
            acc1 += a.get_unchecked(base + 1) * b.get_unchecked(base + 1);
            acc2 += a.get_unchecked(base + 2) * b.get_unchecked(base + 2);
            acc3 += a.get_unchecked(base + 3) * b.get_unchecked(base + 3);
            acc4 += a.get_unchecked(base + 4) * b.get_unchecked(base + 4);
            acc5 += a.get_unchecked(base + 5) * b.get_unchecked(base + 5);
            acc6 += a.get_unchecked(base + 6) * b.get_unchecked(base + 6);
            acc7 += a.get_unchecked(base + 7) * b.get_unchecked(base + 7);
        }
    }

    let mut result = acc0 + acc1 + acc2 + acc3 + acc4 + acc5 + acc6 + acc7;
    for i in (chunks * 8)..len {
        result += a[i] * b[i];
    }
    result
}
