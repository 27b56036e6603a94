//! Dimensionality-reduced dataset variant: a linear transform projects
//! full-dimensional rows down to a smaller "primary" dimensionality used
//! for the bulk of distance comparisons during search, while an optional
//! full-dimensional (or less-reduced) "secondary" copy backs reranking.
//!
//! The transform is a dense `out_dim x in_dim` matrix applied to every row
//! at encode time; no particular construction method (PCA, learned,
//! random projection) is assumed here — callers supply the matrix.

use crate::data::{Dataset, MutableDataset, VectorView};
use crate::data::dense::DenseDataset;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeanVecKind {
    Primary,
    Secondary,
}

/// A dense linear transform `out = M * in`, stored row-major as
/// `out_dim` rows of `in_dim` coefficients.
#[derive(Debug, Clone)]
pub struct TransformMatrix {
    in_dim: usize,
    out_dim: usize,
    coefficients: Vec<f32>,
}

impl TransformMatrix {
    pub fn new(in_dim: usize, out_dim: usize, coefficients: Vec<f32>) -> Result<Self> {
        if coefficients.len() != in_dim * out_dim {
            return Err(Error::invalid_input(format!(
                "transform matrix expects {} coefficients for {out_dim}x{in_dim}, got {}",
                in_dim * out_dim,
                coefficients.len()
            )));
        }
        Ok(Self { in_dim, out_dim, coefficients })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn apply(&self, row: &[f32]) -> Vec<f32> {
        debug_assert_eq!(row.len(), self.in_dim);
        let mut out = vec![0.0f32; self.out_dim];
        for (o, out_val) in out.iter_mut().enumerate() {
            let base = o * self.in_dim;
            let mut acc = 0.0f32;
            for (k, &x) in row.iter().enumerate() {
                acc += self.coefficients[base + k] * x;
            }
            *out_val = acc;
        }
        out
    }
}

/// A reduced-dimensionality dataset holding a primary (reduced) copy used
/// for the main search loop, and optionally a secondary (full-fidelity or
/// less-reduced) copy used only by the rerank hook.
///
/// Queries arrive full-dimensional (`in_dim`); a separate `query_transform`
/// (spec §3's `query_matrix`) projects them into the same reduced space the
/// rows live in before any distance is computed. When the asymmetric
/// two-matrix scheme isn't needed, `query_transform` defaults to the same
/// matrix used to build `primary`.
#[derive(Debug, Clone)]
pub struct LeanVecDataset {
    kind: LeanVecKind,
    transform: TransformMatrix,
    query_transform: TransformMatrix,
    primary: DenseDataset,
    secondary: Option<DenseDataset>,
}

impl LeanVecDataset {
    pub fn build(transform: TransformMatrix, rows: &[Vec<f32>], keep_secondary: bool) -> Result<Self> {
        let query_transform = transform.clone();
        Self::build_asymmetric(transform, query_transform, rows, keep_secondary)
    }

    /// Like [`Self::build`], but with a distinct matrix projecting queries
    /// (as opposed to stored rows) into the reduced space — the asymmetric
    /// LeanVec scheme spec §3 and §9 allow for.
    pub fn build_asymmetric(
        transform: TransformMatrix,
        query_transform: TransformMatrix,
        rows: &[Vec<f32>],
        keep_secondary: bool,
    ) -> Result<Self> {
        for row in rows {
            if row.len() != transform.in_dim() {
                return Err(Error::DimensionMismatch { expected: transform.in_dim(), got: row.len() });
            }
        }
        if query_transform.in_dim() != transform.in_dim() || query_transform.out_dim() != transform.out_dim() {
            return Err(Error::invalid_input(format!(
                "query transform shape {}x{} must match data transform shape {}x{}",
                query_transform.out_dim(),
                query_transform.in_dim(),
                transform.out_dim(),
                transform.in_dim()
            )));
        }
        let mut primary = DenseDataset::with_capacity(transform.out_dim(), rows.len());
        for row in rows {
            primary.push(&transform.apply(row))?;
        }
        let secondary = keep_secondary
            .then(|| DenseDataset::from_rows(transform.in_dim(), rows))
            .transpose()?;
        Ok(Self { kind: LeanVecKind::Primary, transform, query_transform, primary, secondary })
    }

    pub fn kind(&self) -> LeanVecKind {
        self.kind
    }

    pub fn transform(&self) -> &TransformMatrix {
        &self.transform
    }

    pub fn query_transform(&self) -> &TransformMatrix {
        &self.query_transform
    }

    pub fn reduced_dimensions(&self) -> usize {
        self.transform.out_dim()
    }

    pub fn full_dimensions(&self) -> usize {
        self.transform.in_dim()
    }
}

impl Dataset for LeanVecDataset {
    fn size(&self) -> usize {
        self.primary.size()
    }

    fn dimensions(&self) -> usize {
        self.primary.dimensions()
    }

    fn get(&self, i: usize) -> Result<VectorView<'_>> {
        self.primary.get(i)
    }

    fn prefetch(&self, i: usize) {
        self.primary.prefetch(i);
    }

    fn uses_reranking(&self) -> bool {
        self.secondary.is_some()
    }

    fn get_primary(&self, i: usize) -> Result<VectorView<'_>> {
        match &self.secondary {
            Some(s) => s.get(i),
            None => self.primary.get(i),
        }
    }

    fn project_query(&self, query: &[f32]) -> Vec<f32> {
        self.query_transform.apply(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(dim: usize) -> TransformMatrix {
        let mut coeffs = vec![0.0; dim * dim];
        for i in 0..dim {
            coeffs[i * dim + i] = 1.0;
        }
        TransformMatrix::new(dim, dim, coeffs).unwrap()
    }

    #[test]
    fn rejects_malformed_matrix() {
        assert!(TransformMatrix::new(4, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn projects_to_reduced_dimension() {
        let mut coeffs = vec![0.0; 2 * 4];
        coeffs[0] = 1.0; // out[0] = in[0]
        coeffs[4 + 1] = 1.0; // out[1] = in[1]
        let transform = TransformMatrix::new(4, 2, coeffs).unwrap();
        let out = transform.apply(&[3.0, 5.0, 9.0, 9.0]);
        assert_eq!(out, vec![3.0, 5.0]);
    }

    #[test]
    fn rerank_uses_secondary_copy_when_retained() {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let ds = LeanVecDataset::build(identity(4), &rows, true).unwrap();
        assert!(ds.uses_reranking());
        assert_eq!(ds.get_primary(1).unwrap().to_f32_vec(), rows[1]);
    }

    #[test]
    fn no_reranking_without_secondary() {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let ds = LeanVecDataset::build(identity(4), &rows, false).unwrap();
        assert!(!ds.uses_reranking());
    }

    #[test]
    fn rejects_row_dimension_mismatch() {
        let rows = vec![vec![1.0, 2.0]];
        assert!(matches!(
            LeanVecDataset::build(identity(4), &rows, false),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn project_query_matches_row_transform_by_default() {
        let mut coeffs = vec![0.0; 2 * 4];
        coeffs[0] = 1.0;
        coeffs[4 + 1] = 1.0;
        let transform = TransformMatrix::new(4, 2, coeffs).unwrap();
        let rows = vec![vec![3.0, 5.0, 9.0, 9.0]];
        let ds = LeanVecDataset::build(transform, &rows, false).unwrap();

        // The stored row and a query projected through `project_query`
        // land in the same reduced space and are directly comparable.
        let projected = ds.project_query(&[3.0, 5.0, 9.0, 9.0]);
        assert_eq!(projected, ds.get(0).unwrap().to_f32_vec());
    }

    #[test]
    fn asymmetric_query_transform_projects_independently() {
        let data_transform = identity(4);
        // Query transform only keeps the first two coordinates, scaled.
        let mut query_coeffs = vec![0.0; 2 * 4];
        query_coeffs[0] = 2.0;
        query_coeffs[4 + 1] = 2.0;
        let query_transform = TransformMatrix::new(4, 2, query_coeffs).unwrap();
        let rows = vec![vec![1.0, 1.0, 1.0, 1.0]];
        let ds = LeanVecDataset::build_asymmetric(data_transform, query_transform, &rows, false).unwrap();

        assert_eq!(ds.project_query(&[1.0, 1.0, 1.0, 1.0]), vec![2.0, 2.0]);
        assert_eq!(ds.get(0).unwrap().to_f32_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn rejects_mismatched_asymmetric_transform_shapes() {
        let data_transform = identity(4);
        let query_transform = TransformMatrix::new(3, 2, vec![0.0; 6]).unwrap();
        let rows = vec![vec![1.0, 1.0, 1.0, 1.0]];
        assert!(LeanVecDataset::build_asymmetric(data_transform, query_transform, &rows, false).is_err());
    }
}
