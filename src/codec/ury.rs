//! URY/MRY: the zero-preserving siblings of URX/MRX.
//!
//! The on-disk layout is identical to URX/MRX except that the per-plane
//! scale pair stores (offset, scale) rather than (offset, extent).  On
//! decode, when some integer code `k` satisfies `offset + k·scale ≈ 0`, the
//! codes are re-centered on `k` so that a stored zero comes back as exactly
//! 0.0 instead of picking up the offset's rounding error.

use std::io::{Read, Seek, Write};

use super::urx::{self, Dequant};
use super::Elem;
use crate::error::Result;
use crate::mask::DataMask;

/// The integer code decoding to zero, when the scaling interval admits one.
pub(crate) fn zero_index(offset: f64, scale: f64, count: u32) -> Option<i64> {
    const EPS: f64 = 1e-7;

    if offset != 0.0 && scale != 0.0 {
        let k = (-offset / scale + 0.5).floor() as i64;
        if k > 0 && k <= i64::from(count) && (offset + k as f64 * scale).abs() < EPS * scale.abs() {
            return Some(k);
        }
    }
    None
}

/// Read the whole z-plane `z` of a URY chunk into `out`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_plane<T: Elem, R: Read + Seek>(
    out: &mut [T],
    r: &mut R,
    chunk_off: u64,
    dims: [usize; 3],
    nbits: u32,
    z: usize,
    miss: f64,
    path: &str,
) -> Result<()> {
    urx::read_plane(
        out,
        r,
        chunk_off,
        dims,
        nbits,
        z,
        miss,
        Dequant::ZeroCentered,
        path,
    )
}

/// Read the whole z-plane `z` of an MRY chunk into `out`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_masked_plane<T: Elem, R: Read + Seek>(
    out: &mut [T],
    r: &mut R,
    chunk_off: u64,
    chunk: usize,
    dims: [usize; 3],
    nbits: u32,
    z: usize,
    miss: f64,
    mask: &mut DataMask,
    path: &str,
) -> Result<()> {
    urx::read_masked_plane(
        out,
        r,
        chunk_off,
        chunk,
        dims,
        nbits,
        z,
        miss,
        mask,
        Dequant::ZeroCentered,
        path,
    )
}

/// Write a URY body.
pub(crate) fn write_packed<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelem: usize,
    nz: usize,
    nbits: u32,
    miss: f64,
) -> Result<()> {
    urx::write_packed(w, data, zelem, nz, nbits, miss, Dequant::ZeroCentered)
}

/// Write an MRY body.
pub(crate) fn write_masked_packed<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelem: usize,
    nz: usize,
    nbits: u32,
    miss: f64,
) -> Result<()> {
    urx::write_masked_packed(w, data, zelem, nz, nbits, miss, Dequant::ZeroCentered)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt::HEADER_FRAME;
    use std::io::Cursor;

    #[test]
    fn zero_index_detection() {
        // offset -3, scale 1: code 3 decodes to zero
        assert_eq!(zero_index(-3.0, 1.0, 100), Some(3));
        // zero not inside the interval
        assert_eq!(zero_index(1.0, 1.0, 100), None);
        assert_eq!(zero_index(-200.0, 1.0, 100), None);
        // degenerate plane
        assert_eq!(zero_index(0.0, 0.0, 100), None);
        // off-grid zero crossing
        assert_eq!(zero_index(-2.5, 1.0, 100), None);
    }

    #[test]
    fn ury_reconstructs_exact_zero() {
        let miss = -999.0;
        let nbits = 8;
        // a range straddling zero with zero on the quantization grid
        let n = 255usize;
        let data: Vec<f64> = (0..n).map(|i| (i as f64) * 0.5 - 32.0).collect();
        assert!(data.contains(&0.0));

        let mut body = Vec::new();
        write_packed(&mut body, &data, n, 1, nbits, miss).unwrap();
        let mut file = vec![0u8; HEADER_FRAME as usize];
        file.extend_from_slice(&body);

        let mut out = vec![0f64; n];
        read_plane(
            &mut out,
            &mut Cursor::new(&file),
            0,
            [n, 1, 1],
            nbits,
            0,
            miss,
            "mem",
        )
        .unwrap();

        let zero_pos = data.iter().position(|&v| v == 0.0).unwrap();
        assert_eq!(out[zero_pos], 0.0);

        let tol = (data[n - 1] - data[0]) / f64::from((1u32 << nbits) - 2);
        for (a, b) in out.iter().zip(&data) {
            assert!((a - b).abs() <= tol);
        }
    }
}
