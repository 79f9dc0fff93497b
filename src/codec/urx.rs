//! URX/MRX: per-plane auto-scaled N-bit packed encodings.
//!
//! Each z-plane stores an (offset, extent) pair of doubles followed by its
//! quantized values packed N bits each; the all-ones code is the missing
//! value.  The masked variant keeps per-plane population counts and packed
//! lengths up front, a bitmap per plane, and packs only the non-missing
//! cells.
//!
//! The zero-preserving URY/MRY formats share this module's plumbing; they
//! differ only in what the stored scale pair means and in the dequantization
//! map (see [`super::ury`]).

use std::io::{Read, Seek, SeekFrom, Write};

use super::{scale, ury, Elem};
use crate::error::{broken, read_failure, sys, Result};
use crate::fmt::HEADER_FRAME;
use crate::mask::DataMask;
use crate::pack::{pack32_len, pack_bits_into32, unpack_bits_from32};
use crate::record::{self, RECORD_MARK};
use crate::wire;

/// How stored codes map back to values.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dequant {
    /// `offset + code · extent/(2^N - 2)` (URX/MRX: the pair stores the
    /// plane extent).
    Linear,
    /// `offset + code · scale`, or `(code - k) · scale` when a zero index
    /// `k` exists (URY/MRY: the pair stores the scale itself).
    ZeroCentered,
}

fn dequantize<T: Elem>(out: &mut [T], codes: &[u32], dma: [f64; 2], nbits: u32, miss: f64, dq: Dequant) {
    let imiss = (1u32 << nbits) - 1;
    let vmiss = T::from_f64(miss);

    match dq {
        Dequant::Linear => {
            let scale = if imiss == 1 {
                0.0
            } else {
                dma[1] / f64::from(imiss - 1)
            };
            for (o, &q) in out.iter_mut().zip(codes) {
                *o = if q != imiss {
                    T::from_f64(dma[0] + f64::from(q) * scale)
                } else {
                    vmiss
                };
            }
        }
        Dequant::ZeroCentered => match ury::zero_index(dma[0], dma[1], imiss - 1) {
            Some(k) => {
                for (o, &q) in out.iter_mut().zip(codes) {
                    *o = if q != imiss {
                        T::from_f64(dma[1] * (i64::from(q) - k) as f64)
                    } else {
                        vmiss
                    };
                }
            }
            None => {
                for (o, &q) in out.iter_mut().zip(codes) {
                    *o = if q != imiss {
                        T::from_f64(dma[0] + f64::from(q) * dma[1])
                    } else {
                        vmiss
                    };
                }
            }
        },
    }
}

// ── Plane readers ─────────────────────────────────────────────────────────────

/// Read the whole z-plane `z` of a URX/URY chunk into `out`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_plane<T: Elem, R: Read + Seek>(
    out: &mut [T],
    r: &mut R,
    chunk_off: u64,
    dims: [usize; 3],
    nbits: u32,
    z: usize,
    miss: f64,
    dq: Dequant,
    path: &str,
) -> Result<()> {
    let plane = dims[0] * dims[1];

    r.seek(SeekFrom::Start(chunk_off + HEADER_FRAME))
        .map_err(|e| sys(path, e))?;
    let mut dma = [0f64; 2];
    record::read_doubles(r, 2 * z, &mut dma)?;

    let plen = pack32_len(plane, nbits);
    r.seek(SeekFrom::Current(RECORD_MARK as i64 + (4 * z * plen) as i64))
        .map_err(|e| sys(path, e))?;

    let mut packed = vec![0u32; plen];
    wire::read_u32_into(r, &mut packed).map_err(|e| read_failure(e, path))?;

    let mut codes = vec![0u32; plane];
    unpack_bits_from32(&mut codes, &packed, nbits);
    dequantize(&mut out[..plane], &codes, dma, nbits, miss, dq);
    Ok(())
}

/// Read the whole z-plane `z` of an MRX/MRY chunk into `out`.
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
    dq: Dequant,
    path: &str,
) -> Result<()> {
    let nz = dims[2];
    mask.load_for_plane(r, chunk_off, chunk, dims, z, path)?;

    // past the total-packed-length record, then the per-plane preamble
    r.seek(SeekFrom::Start(
        chunk_off + HEADER_FRAME + 4 + 2 * RECORD_MARK,
    ))
    .map_err(|e| sys(path, e))?;

    let mut counts = vec![0u32; nz];
    record::read_words(r, 0, &mut counts)?;
    record::skip_record(r)?; // per-plane packed lengths
    let mut dma = [0f64; 2];
    record::read_doubles(r, 2 * z, &mut dma)?;
    record::skip_record(r)?; // bitmaps

    let nnn = counts[z] as usize;
    if mask.count() != nnn {
        return Err(broken(format!(
            "{path}: population count {nnn} disagrees with bitmap ({})",
            mask.count()
        )));
    }

    let skip_words: usize = counts[..z]
        .iter()
        .map(|&c| pack32_len(c as usize, nbits))
        .sum();
    r.seek(SeekFrom::Current(
        RECORD_MARK as i64 + (4 * skip_words) as i64,
    ))
    .map_err(|e| sys(path, e))?;

    let plen = pack32_len(nnn, nbits);
    let mut packed = vec![0u32; plen];
    wire::read_u32_into(r, &mut packed).map_err(|e| read_failure(e, path))?;

    let mut codes = vec![0u32; nnn];
    unpack_bits_from32(&mut codes, &packed, nbits);
    let mut compact = vec![T::default(); nnn];
    dequantize(&mut compact, &codes, dma, nbits, miss, dq);

    let plane = dims[0] * dims[1];
    let vmiss = T::from_f64(miss);
    let mut n = 0;
    for i in 0..plane {
        out[i] = if mask.get(i) {
            n += 1;
            compact[n - 1]
        } else {
            vmiss
        };
    }
    debug_assert_eq!(n, nnn);
    Ok(())
}

// ── Chunk writers ─────────────────────────────────────────────────────────────

fn plane_params<T: Elem>(plane: &[T], miss: f64, nbits: u32, dq: Dequant) -> (f64, f64) {
    match dq {
        Dequant::Linear => scale::urx_plane_params(plane, miss, nbits),
        Dequant::ZeroCentered => scale::ury_plane_params(plane, miss, nbits),
    }
}

fn quantize_scale(stored: f64, imiss: u32, dq: Dequant) -> f64 {
    match dq {
        Dequant::Linear => {
            let scale0 = if imiss == 1 {
                1.0
            } else {
                1.0 / f64::from(imiss - 1)
            };
            stored * scale0
        }
        Dequant::ZeroCentered => stored,
    }
}

/// Write a URX/URY body: the per-plane scale pairs in one record, then all
/// planes' packed arrays concatenated in one record.
pub(crate) fn write_packed<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelem: usize,
    nz: usize,
    nbits: u32,
    miss: f64,
    dq: Dequant,
) -> Result<()> {
    let imiss = (1u32 << nbits) - 1;

    let mut dma = vec![0f64; 2 * nz];
    for i in 0..nz {
        let plane = &data[i * zelem..(i + 1) * zelem];
        let (offset, spread) = plane_params(plane, miss, nbits, dq);
        dma[2 * i] = offset;
        dma[2 * i + 1] = spread;
    }
    record::write_doubles_record(w, &dma)?;

    let plen = pack32_len(zelem, nbits);
    let nbytes = (4 * plen * nz) as u32;
    record::write_record_sep(w, nbytes)?;

    let mut codes = vec![0u32; zelem];
    let mut packed = vec![0u32; plen];
    for i in 0..nz {
        let plane = &data[i * zelem..(i + 1) * zelem];
        let qscale = quantize_scale(dma[2 * i + 1], imiss, dq);
        scale::quantize(&mut codes, plane, dma[2 * i], qscale, imiss, miss);
        pack_bits_into32(&mut packed, &codes, nbits);
        record::write_words_payload(w, &packed)?;
    }
    record::write_record_sep(w, nbytes)
}

/// Write an MRX/MRY body: total packed length, per-plane populations,
/// per-plane packed lengths, scale pairs, bitmaps, packed values.
pub(crate) fn write_masked_packed<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelem: usize,
    nz: usize,
    nbits: u32,
    miss: f64,
    dq: Dequant,
) -> Result<()> {
    let imiss = (1u32 << nbits) - 1;

    let mut counts = vec![0u32; nz];
    let mut plens = vec![0u32; nz];
    let mut dma = vec![0f64; 2 * nz];
    let mut plen_all = 0u64;
    for i in 0..nz {
        let plane = &data[i * zelem..(i + 1) * zelem];
        counts[i] = scale::masked_count(plane, miss) as u32;
        plens[i] = pack32_len(counts[i] as usize, nbits) as u32;
        plen_all += u64::from(plens[i]);

        let (offset, spread) = plane_params(plane, miss, nbits, dq);
        dma[2 * i] = offset;
        dma[2 * i + 1] = spread;
    }

    record::write_words_record(w, &[plen_all as u32])?;
    record::write_words_record(w, &counts)?;
    record::write_words_record(w, &plens)?;
    record::write_doubles_record(w, &dma)?;
    super::masked::write_mask(w, data, zelem, nz, miss)?;

    let nbytes = (4 * plen_all) as u32;
    record::write_record_sep(w, nbytes)?;

    let mut codes = vec![0u32; zelem];
    let mut packed = vec![0u32; pack32_len(zelem, nbits)];
    for i in 0..nz {
        let plane = &data[i * zelem..(i + 1) * zelem];
        let qscale = quantize_scale(dma[2 * i + 1], imiss, dq);
        let n = scale::quantize_masked(&mut codes, plane, dma[2 * i], qscale, imiss, miss);
        debug_assert_eq!(n as u32, counts[i]);
        let nwords = pack_bits_into32(&mut packed, &codes[..n], nbits);
        record::write_words_payload(w, &packed[..nwords])?;
    }
    record::write_record_sep(w, nbytes)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn with_header_frame(body: Vec<u8>) -> Vec<u8> {
        let mut file = vec![0u8; HEADER_FRAME as usize];
        file.extend_from_slice(&body);
        file
    }

    #[test]
    fn urx_roundtrip_bounded_by_quantum() {
        let miss = -999.0;
        let nbits = 12;
        let n = 256;
        let data: Vec<f32> = (0..n).map(|i| i as f32 / (n - 1) as f32).collect();

        let mut body = Vec::new();
        write_packed(&mut body, &data, n, 1, nbits, miss, Dequant::Linear).unwrap();
        let file = with_header_frame(body);

        let mut out = vec![0f32; n];
        read_plane(
            &mut out,
            &mut Cursor::new(&file),
            0,
            [n, 1, 1],
            nbits,
            0,
            miss,
            Dequant::Linear,
            "mem",
        )
        .unwrap();

        let tol = 1.0 / f64::from((1u32 << nbits) - 2);
        for (a, b) in out.iter().zip(&data) {
            assert!((f64::from(*a) - f64::from(*b)).abs() <= tol);
        }
    }

    #[test]
    fn urx_missing_codes_decode_to_the_sentinel() {
        let miss = -999.0;
        let data = [1.0f32, miss as f32, 2.0, 3.0];
        let mut body = Vec::new();
        write_packed(&mut body, &data, 4, 1, 8, miss, Dequant::Linear).unwrap();
        let file = with_header_frame(body);

        let mut out = [0f32; 4];
        read_plane(
            &mut out,
            &mut Cursor::new(&file),
            0,
            [4, 1, 1],
            8,
            0,
            miss,
            Dequant::Linear,
            "mem",
        )
        .unwrap();
        assert_eq!(out[1], miss as f32);
        assert!(out[0] != miss as f32);
    }

    #[test]
    fn mrx_roundtrip_with_mask() {
        let miss = -999.0;
        let nbits = 10;
        let data = [
            0.5f64,
            miss,
            1.5,
            miss,
            2.5,
            3.5, // plane 0
            miss,
            miss,
            4.0,
            5.0,
            6.0,
            7.0, // plane 1
        ];

        let mut body = Vec::new();
        write_masked_packed(&mut body, &data, 6, 2, nbits, miss, Dequant::Linear).unwrap();
        let file = with_header_frame(body);

        let mut mask = DataMask::new();
        let tol = 7.0 / f64::from((1u32 << nbits) - 2);
        for z in 0..2 {
            let mut out = [0f64; 6];
            read_masked_plane(
                &mut out,
                &mut Cursor::new(&file),
                0,
                0,
                [3, 2, 2],
                nbits,
                z,
                miss,
                &mut mask,
                Dequant::Linear,
                "mem",
            )
            .unwrap();
            for (i, v) in out.iter().enumerate() {
                let want = data[6 * z + i];
                if want == miss {
                    assert_eq!(*v, miss);
                } else {
                    assert!((v - want).abs() <= tol, "z={z} i={i}: {v} vs {want}");
                }
            }
        }
    }
}
