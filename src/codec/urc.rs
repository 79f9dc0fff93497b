//! The legacy block-quantized 16-bit codec (URC1 and URC2).
//!
//! Each z-plane is quantized against three parameters: a reference value
//! (the plane minimum times a power of ten), a decimal factor `D = 10^nd`
//! and a binary factor `E = 2^ne`, chosen so `D · 2^ne` tightly covers the
//! plane's range in 65533 steps.  Code 0xFFFE is reserved for the missing
//! value.
//!
//! Version 2 rounds to the nearest code and decodes linearly.  Version 1
//! truncates on encode and decodes at half-quantum centers, with a special
//! case when the reference is exactly zero that keeps code 0 decoding to
//! exactly 0.0.  The two versions are not interchangeable; files say which
//! one they carry.

use std::io::{Read, Seek, SeekFrom, Write};

use super::Elem;
use crate::error::{broken, read_failure, sys, Result};
use crate::fmt::HEADER_FRAME;
use crate::record::{self, RECORD_MARK};
use crate::wire;

/// Reserved 16-bit code for the missing value.
pub(crate) const IMISS: u32 = 65534;
/// Largest usable code.
const MAX_AVAIL: f64 = 65533.0;

/// Binary exponent of `x` (the IEEE exponent field, unbiased).
fn ilogb(x: f64) -> i32 {
    let e = ((x.to_bits() >> 52) & 0x7ff) as i32;
    if e == 0 {
        // subnormal
        x.log2().floor() as i32
    } else {
        e - 1023
    }
}

/// Quantization parameters of one plane.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UrcParam {
    pub rmin: f64,
    pub fac_e: f64,
    pub fac_d: f64,
    pub ne: i32,
    pub nd: i32,
}

impl UrcParam {
    /// The reference value written to disk.
    pub fn reference(&self) -> f64 {
        self.rmin * self.fac_d
    }
}

/// Search the decimal/binary factor pair minimizing the quantum
/// `2^ne / 10^nd` that still covers `[rmin, rmax]` in 65533 steps.
fn scalefac(rmin: f64, rmax: f64) -> (f64, f64, i32, i32) {
    let mut rdelta = f64::INFINITY;
    let mut best = (f64::INFINITY, 1.0, IMISS as i32, 0);

    let mut fac = 1e-16;
    for nd in -16..17 {
        let ne = ilogb((rmax - rmin) * fac / MAX_AVAIL) + 1;
        let fac_e = 2f64.powi(ne);
        let r = fac_e / fac;
        if r < rdelta {
            rdelta = r;
            best = (fac_e, fac, ne, nd);
        }
        fac *= 10.0;
    }
    best
}

/// Scan a plane and derive its packing parameters.
pub(crate) fn calc_param(data: &[f32], miss: f64) -> UrcParam {
    let vmiss = miss as f32;
    let mut rmin = f64::INFINITY;
    let mut rmax = f64::NEG_INFINITY;
    for &v in data {
        if v != vmiss {
            rmin = rmin.min(f64::from(v));
            rmax = rmax.max(f64::from(v));
        }
    }

    let (mut fac_e, mut fac_d, mut ne, mut nd) = (f64::INFINITY, 1.0, IMISS as i32, 0);
    if rmax - rmin > 0.0 {
        (fac_e, fac_d, ne, nd) = scalefac(rmin, rmax);
        debug_assert!(rmin + MAX_AVAIL * fac_e / fac_d >= rmax);
    }
    UrcParam {
        rmin,
        fac_e,
        fac_d,
        ne,
        nd,
    }
}

/// Version-1 quantization: truncate toward zero.
pub(crate) fn pack_v1(out: &mut [u16], data: &[f32], miss: f64, p: &UrcParam) {
    let vmiss = miss as f32;
    for (o, &v) in out.iter_mut().zip(data) {
        *o = if v == vmiss {
            IMISS as u16
        } else {
            (p.fac_d * (f64::from(v) - p.rmin) / p.fac_e) as u16
        };
    }
}

/// Version-2 quantization: round to nearest.
pub(crate) fn pack_v2(out: &mut [u16], data: &[f32], miss: f64, p: &UrcParam) {
    let vmiss = miss as f32;
    for (o, &v) in out.iter_mut().zip(data) {
        *o = if v == vmiss {
            IMISS as u16
        } else {
            (p.fac_d * (f64::from(v) - p.rmin) / p.fac_e).round_ties_even() as u16
        };
    }
}

/// Version-1 dequantization: half-quantum centers; when the reference is
/// exactly zero, code 0 decodes to exactly 0.0.
pub(crate) fn unpack_v1(out: &mut [f32], packed: &[u16], reference: f64, ne: i32, nd: i32, miss: f64) {
    let vmiss = miss as f32;
    let (base, scal) = if ne != IMISS as i32 {
        (2f64.powi(ne), 10f64.powi(-nd))
    } else {
        (0.0, 1.0)
    };

    if reference != 0.0 {
        for (o, &code) in out.iter_mut().zip(packed) {
            *o = if u32::from(code) != IMISS {
                ((reference + (f64::from(code) + 0.5) * base) * scal) as f32
            } else {
                vmiss
            };
        }
    } else {
        for (o, &code) in out.iter_mut().zip(packed) {
            *o = if u32::from(code) != IMISS {
                let centered = if code == 0 { 0.0 } else { f64::from(code) + 0.5 };
                (centered * base * scal) as f32
            } else {
                vmiss
            };
        }
    }
}

/// Version-2 dequantization: linear.
pub(crate) fn unpack_v2(out: &mut [f32], packed: &[u16], reference: f64, ne: i32, nd: i32, miss: f64) {
    let vmiss = miss as f32;
    let (base, scal) = if ne != IMISS as i32 {
        (2f64.powi(ne), 10f64.powi(-nd))
    } else {
        (0.0, 1.0)
    };
    for (o, &code) in out.iter_mut().zip(packed) {
        *o = if u32::from(code) != IMISS {
            ((reference + f64::from(code) * base) * scal) as f32
        } else {
            vmiss
        };
    }
}

// ── Chunk writer ──────────────────────────────────────────────────────────────

/// Write one quantized plane: the three parameter mini-records followed by
/// the framed 16-bit body.
fn write_plane<W: Write>(w: &mut W, data: &[f32], miss: f64, version1: bool) -> Result<()> {
    let p = calc_param(data, miss);
    record::write_doubles_record(w, &[p.reference()])?;
    record::write_words_record(w, &[p.nd as u32])?;
    record::write_words_record(w, &[p.ne as u32])?;

    let mut codes = vec![0u16; data.len()];
    if version1 {
        pack_v1(&mut codes, data, miss, &p);
    } else {
        pack_v2(&mut codes, data, miss, &p);
    }

    let nbytes = (2 * data.len()) as u32;
    record::write_record_sep(w, nbytes)?;
    record::write_u16_payload(w, &codes)?;
    record::write_record_sep(w, nbytes)
}

/// Write a whole URC1/URC2 body.  Quantization always happens in `f32`, so
/// double input narrows first.
pub(crate) fn write_body<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelem: usize,
    nz: usize,
    miss: f64,
    version1: bool,
) -> Result<()> {
    let mut plane = vec![0f32; zelem];
    for i in 0..nz {
        for (p, &v) in plane.iter_mut().zip(&data[i * zelem..(i + 1) * zelem]) {
            *p = v.to_f32();
        }
        write_plane(w, &plane, miss, version1)?;
    }
    Ok(())
}

// ── Plane reader ──────────────────────────────────────────────────────────────

/// Byte size of one z-plane's block: parameter mini-records plus the framed
/// 16-bit body.
fn plane_stride(plane: u64) -> u64 {
    8 + 4 + 4 + 2 * plane + 8 * RECORD_MARK
}

/// Read one z-plane of a URC1/URC2 chunk into `out[skip..]`.
///
/// `skip` and `nelem` are element counts; both are widened to the 16-bit
/// pair boundary the on-disk words are aligned to, so `out` must be padded
/// to an even element count.
pub(crate) fn read_plane<R: Read + Seek>(
    out: &mut [f32],
    r: &mut R,
    chunk_off: u64,
    dims: [usize; 3],
    z: usize,
    skip: usize,
    nelem: usize,
    miss: f64,
    version1: bool,
    path: &str,
) -> Result<()> {
    let plane = (dims[0] * dims[1]) as u64;
    let off = chunk_off + HEADER_FRAME + plane_stride(plane) * z as u64;
    r.seek(SeekFrom::Start(off)).map_err(|e| sys(path, e))?;

    // the three parameter records plus the body prefix, read as one block
    let mut pbuf = [0u8; 8 + 4 + 4 + 7 * RECORD_MARK as usize];
    r.read_exact(&mut pbuf).map_err(|e| read_failure(e, path))?;

    let reference = wire::read_be_f64(&pbuf, 4);
    let nd = wire::read_be32(&pbuf, 20) as i32;
    let ne = wire::read_be32(&pbuf, 32) as i32;

    let body_len = wire::read_be32(&pbuf, pbuf.len() - 4) as u64;
    if body_len != 2 * plane {
        return Err(broken(format!("{path}: quantized plane length {body_len}")));
    }

    // the 16-bit stream is word-aligned in pairs
    let skip = skip & !1;
    let nelem = (nelem + 1) & !1;

    if skip != 0 {
        r.seek(SeekFrom::Current(2 * skip as i64))
            .map_err(|e| sys(path, e))?;
    }

    let mut codes = vec![0u16; nelem];
    wire::read_u16_into(r, &mut codes).map_err(|e| read_failure(e, path))?;

    let out = &mut out[skip..skip + nelem];
    if version1 {
        unpack_v1(out, &codes, reference, ne, nd, miss);
    } else {
        unpack_v2(out, &codes, reference, ne, nd, miss);
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_v2(data: &[f32], miss: f64) -> Vec<f32> {
        let p = calc_param(data, miss);
        let mut codes = vec![0u16; data.len()];
        pack_v2(&mut codes, data, miss, &p);
        let mut out = vec![0f32; data.len()];
        unpack_v2(&mut out, &codes, p.reference(), p.ne, p.nd, miss);
        out
    }

    #[test]
    fn constant_plane_is_exact() {
        let cval = 1.234_567_9_f32;
        let out = roundtrip_v2(&[cval; 4], -999.0);
        assert_eq!(out, [cval; 4]);
    }

    #[test]
    fn missing_values_survive() {
        let miss = -999.0;
        let cval = 1.234_567_9_f32;

        let out = roundtrip_v2(&[miss as f32; 4], miss);
        assert_eq!(out, [miss as f32; 4]);

        let out = roundtrip_v2(&[miss as f32, cval, miss as f32, cval], miss);
        assert_eq!(out, [miss as f32, cval, miss as f32, cval]);
    }

    #[test]
    fn error_is_bounded_by_the_quantum() {
        let cases: &[(&[f32], f64)] = &[
            (&[0.0, 0.123456789, 0.987654321, 0.999999], 1.0 / 65000.0),
            (
                &[0.123456789, 0.234567891, 0.345678912, -0.123456789],
                0.25 / 65000.0,
            ),
            (&[0.1234567, 0.1234568, 0.1234569, 0.1234570], 0.1 / 65000.0),
            (&[1e1, 1e2, 1e4, 1e6], 1e6 / 65000.0),
        ];
        for (data, tol) in cases {
            let out = roundtrip_v2(data, -999.0);
            for (a, b) in out.iter().zip(data.iter()) {
                assert!((f64::from(*a) - f64::from(*b)).abs() <= *tol);
            }
        }
    }

    #[test]
    fn repacking_decoded_data_is_stable() {
        let miss = -999.0;
        let data = [
            -1.23456789e-4f32,
            -2.34567891e-2,
            3.456789123e1,
            4.567891234e2,
        ];

        let p = calc_param(&data, miss);
        let mut codes = vec![0u16; 4];
        pack_v2(&mut codes, &data, miss, &p);
        let mut once = vec![0f32; 4];
        unpack_v2(&mut once, &codes, p.reference(), p.ne, p.nd, miss);

        let p2 = calc_param(&once, miss);
        assert_eq!(p.reference(), p2.reference());
        assert_eq!(p.ne, p2.ne);
        assert_eq!(p.nd, p2.nd);

        let mut codes2 = vec![0u16; 4];
        pack_v2(&mut codes2, &once, miss, &p2);
        let mut twice = vec![0f32; 4];
        unpack_v2(&mut twice, &codes2, p2.reference(), p2.ne, p2.nd, miss);
        assert_eq!(once, twice);
    }

    #[test]
    fn v1_preserves_exact_zero_with_zero_reference() {
        let miss = -999.0;
        let data = [0.0f32, 0.25, 0.5, 1.0];
        let p = calc_param(&data, miss);
        assert_eq!(p.reference(), 0.0);

        let mut codes = vec![0u16; 4];
        pack_v1(&mut codes, &data, miss, &p);
        let mut out = vec![0f32; 4];
        unpack_v1(&mut out, &codes, p.reference(), p.ne, p.nd, miss);

        assert_eq!(out[0], 0.0);
        let quantum = p.fac_e / p.fac_d;
        for (a, b) in out.iter().zip(&data).skip(1) {
            assert!((f64::from(*a) - f64::from(*b)).abs() <= quantum);
        }
    }

    #[test]
    fn ilogb_matches_exponent_field() {
        assert_eq!(ilogb(1.0), 0);
        assert_eq!(ilogb(1.9), 0);
        assert_eq!(ilogb(2.0), 1);
        assert_eq!(ilogb(0.5), -1);
        assert_eq!(ilogb(3e-5), -16);
    }
}
