//! Flat, contiguous vector storage — the uncompressed dataset variant.
//!
//! One contiguous `Vec<f32>` where vector `i` occupies
//! `data[i*dim..(i+1)*dim]`, avoiding the pointer-chasing of
//! `Vec<Vec<f32>>`. Rows are stored exactly as given: normalization is
//! metric-specific and belongs to [`crate::distance`], not the storage
//! layer.

use crate::data::{Dataset, ElementKind, MutableDataset, VectorView};
use crate::error::{Error, Result};

/// Dense, uncompressed, row-major vector storage.
#[derive(Debug, Clone)]
pub struct DenseDataset {
    dim: usize,
    kind: ElementKind,
    data_f32: Vec<f32>,
}

impl DenseDataset {
    pub fn zeros(dim: usize, n: usize) -> Self {
        assert!(dim > 0, "dimension must be > 0");
        Self { dim, kind: ElementKind::F32, data_f32: vec![0.0; dim * n] }
    }

    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        assert!(dim > 0, "dimension must be > 0");
        Self { dim, kind: ElementKind::F32, data_f32: Vec::with_capacity(dim * capacity) }
    }

    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Result<Self> {
        let mut ds = Self::with_capacity(dim, rows.len());
        for row in rows {
            ds.push(row)?;
        }
        Ok(ds)
    }

    /// Append a new row, growing the backing storage. Used by dynamic
    /// insert and by builders that assemble a dataset incrementally.
    pub fn push(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: row.len() });
        }
        self.data_f32.extend_from_slice(row);
        Ok(())
    }

    pub fn element_kind(&self) -> ElementKind {
        self.kind
    }

    /// Raw access to the whole backing buffer — used by the save/load
    /// framework and by rayon-parallel scans that want to chunk the flat
    /// buffer directly instead of going through `get()` per row.
    pub fn raw(&self) -> &[f32] {
        &self.data_f32
    }

    /// Reconstruct a dataset from an already-flat, row-major buffer (the
    /// save/load framework's inverse of [`Self::raw`]), without the
    /// per-row copy that `from_rows` would otherwise pay.
    pub fn from_flat(dim: usize, data_f32: Vec<f32>) -> Result<Self> {
        if dim == 0 || data_f32.len() % dim != 0 {
            return Err(Error::invalid_input(format!(
                "flat buffer length {} is not a multiple of dim {dim}",
                data_f32.len()
            )));
        }
        Ok(Self { dim, kind: ElementKind::F32, data_f32 })
    }
}

impl Dataset for DenseDataset {
    fn size(&self) -> usize {
        self.data_f32.len() / self.dim
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn get(&self, i: usize) -> Result<VectorView<'_>> {
        let size = self.size();
        if i >= size {
            return Err(Error::OutOfBounds { index: i, size });
        }
        let base = i * self.dim;
        Ok(VectorView::F32(&self.data_f32[base..base + self.dim]))
    }

    fn prefetch(&self, i: usize) {
        if i >= self.size() {
            return;
        }
        let base = i * self.dim;
        prefetch_hint(&self.data_f32[base]);
    }
}

impl MutableDataset for DenseDataset {
    fn set(&mut self, i: usize, v: &[f32]) -> Result<()> {
        if v.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: v.len() });
        }
        let size = self.size();
        if i >= size {
            return Err(Error::OutOfBounds { index: i, size });
        }
        let base = i * self.dim;
        self.data_f32[base..base + self.dim].copy_from_slice(v);
        Ok(())
    }
}

/// Software prefetch hint: issues a real hardware prefetch where the
/// target supports it, an inert no-op elsewhere.
#[inline]
fn prefetch_hint(addr: &f32) {
    #[cfg(all(feature = "prefetch", target_arch = "x86_64"))]
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch(addr as *const f32 as *const i8, _MM_HINT_T0);
    }
    #[cfg(not(all(feature = "prefetch", target_arch = "x86_64")))]
    {
        let _ = addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_get_roundtrips() {
        let mut ds = DenseDataset::with_capacity(4, 2);
        ds.push(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(ds.size(), 1);
        match ds.get(0).unwrap() {
            VectorView::F32(v) => assert_eq!(v, &[1.0, 2.0, 3.0, 4.0]),
            _ => panic!("expected F32 view"),
        }
    }

    #[test]
    fn push_rejects_wrong_dimension() {
        let mut ds = DenseDataset::with_capacity(4, 1);
        assert!(matches!(ds.push(&[1.0, 2.0]), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn get_out_of_bounds_errors() {
        let ds = DenseDataset::zeros(4, 2);
        assert!(matches!(ds.get(5), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut ds = DenseDataset::zeros(2, 2);
        ds.set(1, &[9.0, 9.0]).unwrap();
        assert_eq!(ds.get(1).unwrap().to_f32_vec(), vec![9.0, 9.0]);
        assert_eq!(ds.get(0).unwrap().to_f32_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn prefetch_on_out_of_bounds_is_a_noop() {
        let ds = DenseDataset::zeros(4, 1);
        ds.prefetch(100); // must not panic
    }
}
