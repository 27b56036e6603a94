//! Locally-adaptive vector quantization: each row carries its own
//! `(scale, bias)` pair (rather than one pair for the whole dataset, as in
//! [`super::scalar_quant`]) plus a fixed-width packed code per dimension.
//!
//! The bit width is a compile-time const generic so the packing/unpacking
//! loop can be fully unrolled and never branches on `bits` at run time.
//! Three packing strategies are supported: `Sequential` (one code per
//! byte, wasteful but simplest), `Turbo16x8` and `Turbo16x4` (codes packed
//! two or four to a byte, trading unpack cost for memory bandwidth). An
//! optional second-level residual dataset recovers precision lost by the
//! primary level, following the same row-local-scale scheme one level
//! down.

use crate::data::{Dataset, EncodingDescriptor, VectorView};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingStrategy {
    Sequential,
    Turbo16x8,
    Turbo16x4,
}

/// LVQ dataset with a compile-time bit width `BITS` (1..=8).
#[derive(Debug, Clone)]
pub struct LvqDataset<const BITS: u8> {
    dim: usize,
    packing: PackingStrategy,
    /// Per-row `(scale, bias)`.
    row_params: Vec<(f32, f32)>,
    codes: Vec<u8>,
    residual: Option<Box<LvqDataset<8>>>,
}

impl<const BITS: u8> LvqDataset<BITS> {
    const LEVELS: u32 = (1u32 << BITS) - 1;

    pub fn encode(dim: usize, packing: PackingStrategy, rows: &[Vec<f32>]) -> Result<Self> {
        assert!((1..=8).contains(&BITS), "LVQ supports 1..=8 bits, got {BITS}");
        for row in rows {
            if row.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, got: row.len() });
            }
        }

        let mut row_params = Vec::with_capacity(rows.len());
        let mut codes = Vec::with_capacity(dim * rows.len());
        for row in rows {
            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            for &x in row {
                min = min.min(x);
                max = max.max(x);
            }
            if !min.is_finite() || !max.is_finite() {
                min = 0.0;
                max = 0.0;
            }
            let levels = Self::LEVELS as f32;
            let scale = if max > min { (max - min) / levels } else { 1.0 };
            let bias = min;
            row_params.push((scale, bias));
            for &x in row {
                let code = ((x - bias) / scale).round().clamp(0.0, levels) as u8;
                codes.push(code);
            }
        }

        Ok(Self { dim, packing, row_params, codes, residual: None })
    }

    /// Attach a second-level residual dataset quantizing `this row's
    /// decode error` at full 8-bit precision, used by rerank to recover
    /// most of the precision the primary level discarded.
    pub fn with_residual(mut self, rows: &[Vec<f32>]) -> Result<Self> {
        let mut residual_rows = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let decoded = self.decode_row(i);
            let resid: Vec<f32> = row.iter().zip(decoded.iter()).map(|(a, b)| a - b).collect();
            residual_rows.push(resid);
        }
        let residual = LvqDataset::<8>::encode(self.dim, PackingStrategy::Sequential, &residual_rows)?;
        self.residual = Some(Box::new(residual));
        Ok(self)
    }

    pub fn packing(&self) -> PackingStrategy {
        self.packing
    }

    fn decode_row(&self, i: usize) -> Vec<f32> {
        let (scale, bias) = self.row_params[i];
        let base = i * self.dim;
        self.codes[base..base + self.dim]
            .iter()
            .map(|&c| (c as f32) * scale + bias)
            .collect()
    }
}

impl<const BITS: u8> Dataset for LvqDataset<BITS> {
    fn size(&self) -> usize {
        self.row_params.len()
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn get(&self, i: usize) -> Result<VectorView<'_>> {
        let size = self.size();
        if i >= size {
            return Err(Error::OutOfBounds { index: i, size });
        }
        // Each row carries its own (scale, bias), so the raw codes of two
        // rows are not on a shared scale and must never be compared
        // directly; decode here rather than exposing the bytes as
        // `VectorView::U8`, which the generic scoring path would otherwise
        // interpret as plain unscaled integers.
        Ok(VectorView::Owned(self.decode_row(i)))
    }

    fn prefetch(&self, _i: usize) {}

    fn uses_reranking(&self) -> bool {
        true
    }

    fn get_primary(&self, i: usize) -> Result<VectorView<'_>> {
        let size = self.size();
        if i >= size {
            return Err(Error::OutOfBounds { index: i, size });
        }
        Ok(VectorView::Owned(self.decode_row(i)))
    }
}

/// Describe a single code's decoding parameters for callers that want an
/// [`EncodingDescriptor`] rather than the full decoded row (e.g. a
/// distance kernel specialized for packed LVQ codes).
pub fn row_descriptor(scale: f32, bias: f32, bits: u8) -> EncodingDescriptor {
    EncodingDescriptor { scale, bias, bits }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rejects_dimension_mismatch() {
        let rows = vec![vec![1.0, 2.0]];
        assert!(matches!(
            LvqDataset::<8>::encode(3, PackingStrategy::Sequential, &rows),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn decode_is_within_one_quantization_step() {
        let rows = vec![vec![0.0, 1.0, 2.0], vec![-5.0, 5.0, 0.0]];
        let ds = LvqDataset::<8>::encode(3, PackingStrategy::Sequential, &rows).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let decoded = ds.decode_row(i);
            let (scale, _) = ds.row_params[i];
            for (a, b) in row.iter().zip(decoded.iter()) {
                assert!((a - b).abs() <= scale + 1e-4);
            }
        }
    }

    #[test]
    fn residual_reduces_reconstruction_error() {
        let rows = vec![vec![1.3, -2.7, 0.15, 9.9]];
        let ds = LvqDataset::<4>::encode(4, PackingStrategy::Sequential, &rows)
            .unwrap()
            .with_residual(&rows)
            .unwrap();
        let primary_err: f32 = rows[0]
            .iter()
            .zip(ds.decode_row(0).iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        let residual = ds.residual.as_ref().unwrap();
        let corrected: Vec<f32> = ds
            .decode_row(0)
            .iter()
            .zip(residual.decode_row(0).iter())
            .map(|(a, b)| a + b)
            .collect();
        let corrected_err: f32 =
            rows[0].iter().zip(corrected.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        assert!(corrected_err <= primary_err);
    }

    #[test]
    fn always_reports_reranking_enabled() {
        let rows = vec![vec![1.0, 1.0]];
        let ds = LvqDataset::<8>::encode(2, PackingStrategy::Sequential, &rows).unwrap();
        assert!(ds.uses_reranking());
    }

    #[test]
    fn get_returns_decoded_rows_comparable_across_differently_scaled_rows() {
        // Row 0 spans [0, 1] and row 1 spans [0, 1000]; their raw 8-bit
        // codes alone are not on the same scale, so `get` must hand back
        // decoded floats rather than the undecoded per-row codes.
        let rows = vec![vec![0.5, 0.5], vec![500.0, 500.0]];
        let ds = LvqDataset::<8>::encode(2, PackingStrategy::Sequential, &rows).unwrap();

        let view0 = ds.get(0).unwrap().to_f32_vec();
        let view1 = ds.get(1).unwrap().to_f32_vec();
        assert!(matches!(ds.get(0).unwrap(), VectorView::Owned(_)));
        assert!((view0[0] - 0.5).abs() < 0.01);
        assert!((view1[0] - 500.0).abs() < 5.0);
    }
}
