//! Scalar-quantized dataset variant: one dataset-global `(scale, bias)`
//! pair and a per-dimension k-bit code per row.
//!
//! Codes are stored as `u8` regardless of the nominal bit width (the
//! low-order `bits` bits are significant); this keeps row addressing a
//! plain `dim`-stride lookup identical to [`super::dense::DenseDataset`]
//! while still letting a distance kernel that understands the encoding
//! save bandwidth relative to unpacking to `f32` first.

use crate::data::{Dataset, EncodingDescriptor, VectorView};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ScalarQuantized {
    dim: usize,
    descriptor: EncodingDescriptor,
    codes: Vec<u8>,
    /// Unquantized copy used for reranking, if retained.
    primary: Option<Vec<f32>>,
}

impl ScalarQuantized {
    /// Quantize `rows` uniformly: `scale`/`bias` are derived from the
    /// global min/max across all rows so that `code = round((x - bias) /
    /// scale)` fits in `bits` bits.
    pub fn encode(dim: usize, bits: u8, rows: &[Vec<f32>], keep_primary: bool) -> Result<Self> {
        assert!((1..=8).contains(&bits), "scalar quantization supports 1..=8 bits, got {bits}");
        for row in rows {
            if row.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, got: row.len() });
            }
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for row in rows {
            for &x in row {
                min = min.min(x);
                max = max.max(x);
            }
        }
        if !min.is_finite() || !max.is_finite() {
            min = 0.0;
            max = 0.0;
        }
        let levels = ((1u32 << bits) - 1) as f32;
        let scale = if max > min { (max - min) / levels } else { 1.0 };
        let bias = min;

        let mut codes = Vec::with_capacity(dim * rows.len());
        for row in rows {
            for &x in row {
                let code = ((x - bias) / scale).round().clamp(0.0, levels) as u8;
                codes.push(code);
            }
        }
        let primary = keep_primary.then(|| rows.iter().flatten().copied().collect());

        Ok(Self { dim, descriptor: EncodingDescriptor { scale, bias, bits }, codes, primary })
    }
}

impl Dataset for ScalarQuantized {
    fn size(&self) -> usize {
        self.codes.len() / self.dim
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
        Ok(VectorView::Encoded(&self.codes[base..base + self.dim], &self.descriptor))
    }

    fn prefetch(&self, _i: usize) {}

    fn uses_reranking(&self) -> bool {
        self.primary.is_some()
    }

    fn get_primary(&self, i: usize) -> Result<VectorView<'_>> {
        match &self.primary {
            Some(p) => {
                let size = p.len() / self.dim;
                if i >= size {
                    return Err(Error::OutOfBounds { index: i, size });
                }
                let base = i * self.dim;
                Ok(VectorView::F32(&p[base..base + self.dim]))
            }
            None => self.get(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rejects_dimension_mismatch() {
        let rows = vec![vec![1.0, 2.0, 3.0]];
        assert!(matches!(
            ScalarQuantized::encode(4, 8, &rows, false),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn encode_decode_is_within_one_quantization_step() {
        let rows = vec![vec![0.0, 1.0], vec![10.0, -5.0], vec![5.0, 3.0]];
        let ds = ScalarQuantized::encode(2, 8, &rows, false).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let decoded = ds.get(i).unwrap().to_f32_vec();
            for (a, b) in row.iter().zip(decoded.iter()) {
                assert!((a - b).abs() <= ds.descriptor.scale, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn constant_column_does_not_divide_by_zero() {
        let rows = vec![vec![3.0, 3.0], vec![3.0, 3.0]];
        let ds = ScalarQuantized::encode(2, 4, &rows, false).unwrap();
        let decoded = ds.get(0).unwrap().to_f32_vec();
        assert_eq!(decoded, vec![3.0, 3.0]);
    }

    #[test]
    fn reranking_uses_retained_primary_copy() {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let ds = ScalarQuantized::encode(4, 4, &rows, true).unwrap();
        assert!(ds.uses_reranking());
        assert_eq!(ds.get_primary(0).unwrap().to_f32_vec(), rows[0]);
    }

    #[test]
    fn get_out_of_bounds_errors() {
        let rows = vec![vec![1.0, 2.0]];
        let ds = ScalarQuantized::encode(2, 8, &rows, false).unwrap();
        assert!(matches!(ds.get(5), Err(Error::OutOfBounds { .. })));
    }
}
