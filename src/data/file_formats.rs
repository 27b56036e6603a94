//! Readers/writers for the three canonical on-disk vector file shapes
//! spec §6 requires the cores to accept, independent of the save/load
//! framework's own `svs_config.toml` + sidecar-blob layout (§4.11):
//!
//! - `vecs`: a sequence of `(length: u32, element[length])` records, all
//!   of the same element type and length (the `.fvecs`/`.ivecs` family).
//! - `binary`: one header `(num_vectors: u32, vector_dim: u32)` followed
//!   by `num_vectors * vector_dim` densely packed `f32` elements.
//! - `internal`: one header `(num_vectors: u64, vector_dim: u64,
//!   element_size: u64, padding to 64 bytes)` followed by fixed-stride
//!   rows.
//!
//! Adapters and legacy converters are out of scope (spec §1), but the
//! cores must still *read* these canonical shapes, so only readers and
//! the matching writers (for round-trip tests) live here — no format
//! detection or CLI plumbing.

use std::io::{Read, Write};

use crate::data::dense::DenseDataset;
use crate::error::{Error, Result};

const INTERNAL_HEADER_BYTES: usize = 64;

/// Read a `vecs`-style file: each row is `[dim: u32][dim * f32]`. Every
/// row must declare the same dimension; a mismatch is an error rather
/// than silently truncating or padding.
pub fn read_vecs<R: Read>(mut reader: R) -> Result<DenseDataset> {
    let mut rows: Vec<Vec<f32>> = Vec::new();
    let mut expected_dim: Option<usize> = None;

    loop {
        let mut dim_buf = [0u8; 4];
        match reader.read_exact(&mut dim_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::io(None, e)),
        }
        let dim = u32::from_le_bytes(dim_buf) as usize;
        match expected_dim {
            Some(d) if d != dim => {
                return Err(Error::invalid_input(format!(
                    "vecs row declares dimension {dim}, expected {d}"
                )))
            }
            None => expected_dim = Some(dim),
            _ => {}
        }

        let mut row_buf = vec![0u8; dim * 4];
        reader.read_exact(&mut row_buf).map_err(|e| Error::io(None, e))?;
        rows.push(decode_f32_le(&row_buf));
    }

    let dim = expected_dim.unwrap_or(0);
    DenseDataset::from_rows(dim, &rows)
}

/// Write a `vecs`-style file from a dataset whose rows decode to `f32`.
pub fn write_vecs<W: Write>(dataset: &DenseDataset, mut writer: W) -> Result<()> {
    let dim = dataset.dimensions();
    for i in 0..dataset.size() {
        let row = dataset.get(i)?.to_f32_vec();
        writer.write_all(&(dim as u32).to_le_bytes()).map_err(|e| Error::io(None, e))?;
        for x in row {
            writer.write_all(&x.to_le_bytes()).map_err(|e| Error::io(None, e))?;
        }
    }
    Ok(())
}

/// Read a `binary`-format file: header `(num_vectors: u32, vector_dim:
/// u32)` followed by `num_vectors * vector_dim` densely packed `f32`
/// elements.
pub fn read_binary<R: Read>(mut reader: R) -> Result<DenseDataset> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).map_err(|e| Error::io(None, e))?;
    let num_vectors = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let dim = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

    let mut buf = vec![0u8; num_vectors * dim * 4];
    reader.read_exact(&mut buf).map_err(|e| Error::io(None, e))?;
    let rows: Vec<Vec<f32>> = decode_f32_le(&buf).chunks_exact(dim).map(|c| c.to_vec()).collect();
    if rows.len() != num_vectors {
        return Err(Error::invalid_input(format!(
            "binary file header declares {num_vectors} vectors but {} rows were read",
            rows.len()
        )));
    }
    DenseDataset::from_rows(dim.max(1), &rows)
}

/// Write a `binary`-format file: header plus the dataset's rows, dense
/// and `f32`.
pub fn write_binary<W: Write>(dataset: &DenseDataset, mut writer: W) -> Result<()> {
    let dim = dataset.dimensions();
    writer.write_all(&(dataset.size() as u32).to_le_bytes()).map_err(|e| Error::io(None, e))?;
    writer.write_all(&(dim as u32).to_le_bytes()).map_err(|e| Error::io(None, e))?;
    for i in 0..dataset.size() {
        let row = dataset.get(i)?.to_f32_vec();
        for x in row {
            writer.write_all(&x.to_le_bytes()).map_err(|e| Error::io(None, e))?;
        }
    }
    Ok(())
}

/// Read an `internal`-format file: header `(num_vectors: u64, vector_dim:
/// u64, element_size: u64, padding to 64 bytes)` followed by fixed-stride
/// rows. Only `element_size == 4` (`f32`) is supported; any other value
/// is `InvalidInput` since this crate has no generic-width row decoder
/// at this boundary.
pub fn read_internal<R: Read>(mut reader: R) -> Result<DenseDataset> {
    let mut header = [0u8; INTERNAL_HEADER_BYTES];
    reader.read_exact(&mut header).map_err(|e| Error::io(None, e))?;
    let num_vectors = u64::from_le_bytes(header[0..8].try_into().unwrap()) as usize;
    let dim = u64::from_le_bytes(header[8..16].try_into().unwrap()) as usize;
    let element_size = u64::from_le_bytes(header[16..24].try_into().unwrap());
    if element_size != 4 {
        return Err(Error::invalid_input(format!(
            "internal format element_size {element_size} is not supported (only 4-byte f32 rows)"
        )));
    }

    let mut buf = vec![0u8; num_vectors * dim * 4];
    reader.read_exact(&mut buf).map_err(|e| Error::io(None, e))?;
    let rows: Vec<Vec<f32>> = decode_f32_le(&buf).chunks_exact(dim).map(|c| c.to_vec()).collect();
    DenseDataset::from_rows(dim.max(1), &rows)
}

/// Write an `internal`-format file with the 64-byte padded header.
pub fn write_internal<W: Write>(dataset: &DenseDataset, mut writer: W) -> Result<()> {
    let dim = dataset.dimensions();
    let mut header = [0u8; INTERNAL_HEADER_BYTES];
    header[0..8].copy_from_slice(&(dataset.size() as u64).to_le_bytes());
    header[8..16].copy_from_slice(&(dim as u64).to_le_bytes());
    header[16..24].copy_from_slice(&4u64.to_le_bytes());
    writer.write_all(&header).map_err(|e| Error::io(None, e))?;
    for i in 0..dataset.size() {
        let row = dataset.get(i)?.to_f32_vec();
        for x in row {
            writer.write_all(&x.to_le_bytes()).map_err(|e| Error::io(None, e))?;
        }
    }
    Ok(())
}

fn decode_f32_le(buf: &[u8]) -> Vec<f32> {
    buf.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vecs_roundtrips() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let ds = DenseDataset::from_rows(3, &rows).unwrap();
        let mut buf = Vec::new();
        write_vecs(&ds, &mut buf).unwrap();
        let read_back = read_vecs(buf.as_slice()).unwrap();
        assert_eq!(read_back.size(), 2);
        assert_eq!(read_back.get(1).unwrap().to_f32_vec(), rows[1]);
    }

    #[test]
    fn vecs_rejects_inconsistent_dimensions() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        buf.extend_from_slice(&2.0f32.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        buf.extend_from_slice(&2.0f32.to_le_bytes());
        buf.extend_from_slice(&3.0f32.to_le_bytes());
        assert!(read_vecs(buf.as_slice()).is_err());
    }

    #[test]
    fn binary_roundtrips() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let ds = DenseDataset::from_rows(2, &rows).unwrap();
        let mut buf = Vec::new();
        write_binary(&ds, &mut buf).unwrap();
        let read_back = read_binary(buf.as_slice()).unwrap();
        assert_eq!(read_back.size(), 3);
        assert_eq!(read_back.get(2).unwrap().to_f32_vec(), rows[2]);
    }

    #[test]
    fn binary_rejects_header_row_count_mismatch() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_le_bytes()); // claims 5 rows
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2 * 4]); // only 1 row's worth of data
        assert!(read_binary(buf.as_slice()).is_err());
    }

    #[test]
    fn internal_roundtrips_with_padded_header() {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let ds = DenseDataset::from_rows(4, &rows).unwrap();
        let mut buf = Vec::new();
        write_internal(&ds, &mut buf).unwrap();
        assert_eq!(&buf[0..8], &2u64.to_le_bytes());
        assert_eq!(&buf[8..16], &4u64.to_le_bytes());
        assert_eq!(&buf[16..24], &4u64.to_le_bytes());
        let read_back = read_internal(buf.as_slice()).unwrap();
        assert_eq!(read_back.size(), 2);
        assert_eq!(read_back.get(0).unwrap().to_f32_vec(), rows[0]);
    }

    #[test]
    fn internal_rejects_unsupported_element_size() {
        let mut header = [0u8; INTERNAL_HEADER_BYTES];
        header[0..8].copy_from_slice(&1u64.to_le_bytes());
        header[8..16].copy_from_slice(&4u64.to_le_bytes());
        header[16..24].copy_from_slice(&8u64.to_le_bytes()); // f64, unsupported
        assert!(read_internal(header.as_slice()).is_err());
    }
}
