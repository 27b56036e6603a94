//! Build and search parameters for the Vamana index (§4.6/§4.5), plus the
//! versioned load path for build parameters: artifacts saved at schema
//! version `v0.0.0` omit `prune_to`, and loading one substitutes
//! `prune_to = graph_max_degree` (§8 scenario 2).

use crate::error::{Error, Result};
use crate::version::Version;

/// Parameters driving a Vamana build round (C6). `alpha` is typically
/// 1.0-1.2 for L2 and <1.0 for MIP/cosine (see `robust_prune`'s
/// comparator-aware threshold in `build.rs`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildParameters {
    /// Prune threshold.
    pub alpha: f32,
    /// Maximum out-degree `R`.
    pub graph_max_degree: usize,
    /// Construction search window `W`.
    pub window_size: usize,
    /// Maximum candidate pool size `M` before pruning.
    pub max_candidates: usize,
    /// Degree to prune down to, `P <= R`.
    pub prune_to: usize,
    /// Whether to keep the whole visited set from construction search
    /// (`H=true`) rather than just the final buffer contents (`H=false`).
    pub use_full_search_history: bool,
}

impl BuildParameters {
    pub fn new(alpha: f32, graph_max_degree: usize, window_size: usize) -> Self {
        Self {
            alpha,
            graph_max_degree,
            window_size,
            max_candidates: window_size.max(graph_max_degree),
            prune_to: graph_max_degree,
            use_full_search_history: true,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_prune_to(mut self, prune_to: usize) -> Self {
        self.prune_to = prune_to;
        self
    }

    pub fn with_full_search_history(mut self, use_full_search_history: bool) -> Self {
        self.use_full_search_history = use_full_search_history;
        self
    }

    /// Validate parameter relationships, matching §7's `InvalidInput`
    /// ("malformed parameters (e.g., `prune_to > graph_max_degree`)").
    pub fn validate(&self) -> Result<()> {
        if self.prune_to > self.graph_max_degree {
            return Err(Error::invalid_input(format!(
                "prune_to ({}) must not exceed graph_max_degree ({})",
                self.prune_to, self.graph_max_degree
            )));
        }
        if self.alpha <= 0.0 {
            return Err(Error::invalid_input(format!("alpha must be positive, got {}", self.alpha)));
        }
        if self.max_candidates < self.window_size {
            return Err(Error::invalid_input(format!(
                "max_candidates ({}) must be >= window_size ({})",
                self.max_candidates, self.window_size
            )));
        }
        Ok(())
    }

    /// Load build parameters from their saved representation, applying the
    /// `v0.0.0` -> current substitution: that version never wrote
    /// `prune_to`, so the loader fills it in as `graph_max_degree`.
    pub fn from_saved(
        version: Version,
        alpha: f32,
        graph_max_degree: usize,
        window_size: usize,
        max_candidates: usize,
        prune_to: Option<usize>,
        use_full_search_history: bool,
    ) -> Result<Self> {
        let prune_to = match (version, prune_to) {
            (v, None) if v == Version::new(0, 0, 0) => graph_max_degree,
            (_, Some(p)) => p,
            (v, None) => {
                return Err(Error::serialization(
                    None,
                    format!("build parameters at version {v} are missing required field prune_to"),
                ))
            }
        };
        let params = Self {
            alpha,
            graph_max_degree,
            window_size,
            max_candidates,
            prune_to,
            use_full_search_history,
        };
        params.validate()?;
        Ok(params)
    }
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self::new(1.2, 64, 128)
    }
}

/// Parameters driving a single greedy search (C5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParameters {
    /// Window size `w`: how many top entries drive stopping.
    pub search_window_size: usize,
    /// Capacity `c >= w`: how many candidates are retained in total.
    pub search_buffer_capacity: usize,
    /// Prefetch lookahead distance `L`, in neighbor-list positions.
    pub prefetch_lookahead: usize,
    /// Prefetch stride `s`.
    pub prefetch_step: usize,
}

impl SearchParameters {
    pub fn new(search_window_size: usize) -> Self {
        Self {
            search_window_size,
            search_buffer_capacity: search_window_size,
            prefetch_lookahead: 4,
            prefetch_step: 1,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.search_buffer_capacity = capacity.max(self.search_window_size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_buffer_capacity < self.search_window_size {
            return Err(Error::invalid_input(format!(
                "search_buffer_capacity ({}) must be >= search_window_size ({})",
                self.search_buffer_capacity, self.search_window_size
            )));
        }
        Ok(())
    }
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_prune_to_exceeding_max_degree() {
        let p = BuildParameters::new(1.2, 16, 32).with_prune_to(32);
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn v0_0_0_build_params_substitute_prune_to() {
        let p = BuildParameters::from_saved(
            Version::new(0, 0, 0),
            1.2,
            128,
            200,
            750,
            None,
            true,
        )
        .unwrap();
        assert_eq!(p.prune_to, 128);
    }

    #[test]
    fn current_version_requires_explicit_prune_to() {
        let err = BuildParameters::from_saved(
            Version::new(0, 0, 2),
            1.2,
            128,
            200,
            750,
            None,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn search_params_reject_capacity_below_window() {
        let p = SearchParameters { search_window_size: 10, search_buffer_capacity: 5, prefetch_lookahead: 0, prefetch_step: 1 };
        assert!(p.validate().is_err());
    }
}
