//! Big-endian primitives for the on-disk word format.
//!
//! Everything in the container is big-endian regardless of host order: record
//! marks and packed words are 32-bit, scaling parameters are 64-bit IEEE
//! doubles.  This module provides the slice-level helpers plus bulk
//! stream readers used by the codecs.

use std::io::{self, Read};

// ── Slice helpers ─────────────────────────────────────────────────────────────

/// Read a big-endian `u32` from `src` at byte `offset`.
#[inline]
pub fn read_be32(src: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        src[offset],
        src[offset + 1],
        src[offset + 2],
        src[offset + 3],
    ])
}

/// Write a big-endian `u32` into `dst` at byte `offset`.
#[inline]
pub fn write_be32(dst: &mut [u8], offset: usize, value: u32) {
    dst[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Read a big-endian `u64` from `src` at byte `offset`.
#[inline]
pub fn read_be64(src: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&src[offset..offset + 8]);
    u64::from_be_bytes(b)
}

/// Read a big-endian IEEE-754 binary64 from `src` at byte `offset`.
#[inline]
pub fn read_be_f64(src: &[u8], offset: usize) -> f64 {
    f64::from_bits(read_be64(src, offset))
}

// ── Bulk stream readers ───────────────────────────────────────────────────────

/// Fill `out` with big-endian `u32` words read from `r`.
pub fn read_u32_into<R: Read>(r: &mut R, out: &mut [u32]) -> io::Result<()> {
    let mut buf = [0u8; 4];
    for v in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *v = u32::from_be_bytes(buf);
    }
    Ok(())
}

/// Fill `out` with big-endian `u16` values read from `r`.
pub fn read_u16_into<R: Read>(r: &mut R, out: &mut [u16]) -> io::Result<()> {
    let mut buf = [0u8; 2];
    for v in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *v = u16::from_be_bytes(buf);
    }
    Ok(())
}

/// Fill `out` with big-endian binary32 values read from `r`.
pub fn read_f32_into<R: Read>(r: &mut R, out: &mut [f32]) -> io::Result<()> {
    let mut buf = [0u8; 4];
    for v in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *v = f32::from_bits(u32::from_be_bytes(buf));
    }
    Ok(())
}

/// Fill `out` with big-endian binary64 values read from `r`.
pub fn read_f64_into<R: Read>(r: &mut R, out: &mut [f64]) -> io::Result<()> {
    let mut buf = [0u8; 8];
    for v in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *v = f64::from_bits(u64::from_be_bytes(buf));
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be32_roundtrip_and_layout() {
        let mut buf = [0u8; 4];
        write_be32(&mut buf, 0, 0xDEAD_BEEF);
        // MSB first
        assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(read_be32(&buf, 0), 0xDEAD_BEEF);
    }

    #[test]
    fn be_f64_reads_ieee_bits() {
        let bits = 1.5f64.to_bits().to_be_bytes();
        assert_eq!(read_be_f64(&bits, 0), 1.5);
    }

    #[test]
    fn bulk_readers_consume_in_order() {
        let bytes: Vec<u8> = [1u32, 2, 0xffff_fffe]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let mut out = [0u32; 3];
        read_u32_into(&mut bytes.as_slice(), &mut out).unwrap();
        assert_eq!(out, [1, 2, 0xffff_fffe]);

        let bytes: Vec<u8> = [0.0f32, -2.5, 1e30]
            .iter()
            .flat_map(|v| v.to_bits().to_be_bytes())
            .collect();
        let mut out = [0f32; 3];
        read_f32_into(&mut bytes.as_slice(), &mut out).unwrap();
        assert_eq!(out, [0.0, -2.5, 1e30]);
    }

    #[test]
    fn short_input_is_unexpected_eof() {
        let bytes = [0u8; 6];
        let mut out = [0u32; 2];
        let err = read_u32_into(&mut bytes.as_slice(), &mut out).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
