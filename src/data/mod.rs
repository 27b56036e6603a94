//! The immutable dataset protocol every search algorithm in this crate is
//! generic over, plus the concrete variants (dense, scalar-quantized,
//! LVQ, LeanVec) that implement it.

pub mod dense;
pub mod file_formats;
pub mod leanvec;
pub mod lvq;
pub mod scalar_quant;

use crate::error::{Error, Result};

/// One stored vector's values, tagged by representation, borrowed from the
/// owning dataset. Quantized variants return `Encoded` with a descriptor
/// the caller's distance kernel knows how to interpret.
#[derive(Debug, Clone)]
pub enum VectorView<'a> {
    F32(&'a [f32]),
    F16(&'a [half::f16]),
    Bf16(&'a [half::bf16]),
    I8(&'a [i8]),
    U8(&'a [u8]),
    Encoded(&'a [u8], &'a EncodingDescriptor),
    /// A row reconstructed on the fly (e.g. LVQ decode, where the decode
    /// parameters are per-row rather than dataset-global), handed back
    /// owned since there is no borrow to return instead.
    Owned(Vec<f32>),
}

impl<'a> VectorView<'a> {
    /// Decode to an owned `f32` row. Used by callers (rerank, save) that
    /// need plain floats regardless of storage representation.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            VectorView::F32(v) => v.to_vec(),
            VectorView::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            VectorView::Bf16(v) => v.iter().map(|x| x.to_f32()).collect(),
            VectorView::I8(v) => v.iter().map(|&x| x as f32).collect(),
            VectorView::U8(v) => v.iter().map(|&x| x as f32).collect(),
            VectorView::Encoded(bytes, desc) => desc.decode(bytes),
            VectorView::Owned(v) => v.clone(),
        }
    }
}

/// How to turn an `Encoded` byte slice back into floats. Quantized
/// dataset variants attach one of these to every view they hand out.
#[derive(Debug, Clone)]
pub struct EncodingDescriptor {
    pub scale: f32,
    pub bias: f32,
    pub bits: u8,
}

impl EncodingDescriptor {
    pub fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        bytes.iter().map(|&b| (b as f32) * self.scale + self.bias).collect()
    }
}

/// Element representation tag, used by the typed-dispatcher registry to
/// select a monomorphized kernel at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F16,
    Bf16,
    I8,
    U8,
}

/// The immutable dataset protocol.
pub trait Dataset: Send + Sync {
    /// Number of rows (vectors) in this dataset.
    fn size(&self) -> usize;

    /// Dimensionality shared by every row.
    fn dimensions(&self) -> usize;

    /// Borrow row `i`. Errors with `OutOfBounds` if `i >= size()`.
    fn get(&self, i: usize) -> Result<VectorView<'_>>;

    /// Hint that row `i` will be accessed soon. May no-op.
    fn prefetch(&self, i: usize);

    /// Whether this dataset wants the rerank hook in greedy search: after
    /// the main search completes, re-score the buffer against
    /// [`Dataset::get_primary`] and re-sort.
    fn uses_reranking(&self) -> bool {
        false
    }

    /// The higher-fidelity accessor used by the rerank hook. Defaults to
    /// [`Dataset::get`]; quantized variants override it to reach back to
    /// an unquantized (or less-quantized) copy.
    fn get_primary(&self, i: usize) -> Result<VectorView<'_>> {
        self.get(i)
    }

    /// Map an external, full-dimensional query into the space this
    /// dataset's rows are stored/compared in. Defaults to an identity
    /// copy; [`leanvec::LeanVecDataset`] overrides it to apply its query
    /// transform, since its rows live in a reduced dimensionality that a
    /// raw query cannot be compared against directly.
    fn project_query(&self, query: &[f32]) -> Vec<f32> {
        query.to_vec()
    }
}

/// The mutable refinement: adds in-place row replacement.
pub trait MutableDataset: Dataset {
    /// Overwrite row `i` with `v`. Errors with `DimensionMismatch` if
    /// `v.len() != dimensions()`.
    fn set(&mut self, i: usize, v: &[f32]) -> Result<()>;
}

/// Copy every row of `src` into `dst`, erroring on a dimension mismatch
/// before performing any writes.
pub fn copy<S: Dataset + ?Sized, D: MutableDataset + ?Sized>(src: &S, dst: &mut D) -> Result<()> {
    if src.dimensions() != dst.dimensions() {
        return Err(Error::DimensionMismatch { expected: dst.dimensions(), got: src.dimensions() });
    }
    if src.size() != dst.size() {
        return Err(Error::invalid_input(format!(
            "copy size mismatch: src has {} rows, dst has {} rows",
            src.size(),
            dst.size()
        )));
    }
    for i in 0..src.size() {
        let row = src.get(i)?.to_f32_vec();
        dst.set(i, &row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dense::DenseDataset;

    #[test]
    fn copy_rejects_dimension_mismatch() {
        let src = DenseDataset::from_rows(4, &[vec![1.0; 4]]).unwrap();
        let mut dst = DenseDataset::zeros(3, 1);
        assert!(matches!(copy(&src, &mut dst), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn copy_transfers_rows() {
        let src = DenseDataset::from_rows(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let mut dst = DenseDataset::zeros(2, 2);
        copy(&src, &mut dst).unwrap();
        assert_eq!(dst.get(1).unwrap().to_f32_vec(), vec![3.0, 4.0]);
    }
}
