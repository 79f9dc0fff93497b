//! MR4/MR8: a population count, a bitmap over the whole grid, and the
//! compacted non-missing values.
//!
//! The bitmap writer here is shared with the masked packed formats, which
//! store one bitmap per z-plane back to back in a single record (each plane
//! starting on a word boundary).

use std::io::{Read, Seek, SeekFrom, Write};

use super::{scale, Elem};
use crate::error::{broken, sys, Result};
use crate::fmt::HEADER_FRAME;
use crate::mask::DataMask;
use crate::pack::{pack32_len, pack_bools_into32};
use crate::record::{self, RECORD_MARK};

/// Read one z-plane of an MR4/MR8 chunk into `out[skip..]`.  `T` is both
/// the on-disk and the buffer width.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_plane<T: Elem, R: Read + Seek>(
    out: &mut [T],
    r: &mut R,
    chunk_off: u64,
    chunk: usize,
    dims: [usize; 3],
    z: usize,
    skip: usize,
    nelem: usize,
    miss: f64,
    mask: &mut DataMask,
    path: &str,
) -> Result<()> {
    mask.load_for_chunk(r, chunk_off, chunk, dims, path)?;

    // cross-check the stored population count against the bitmap
    r.seek(SeekFrom::Start(chunk_off + HEADER_FRAME))
        .map_err(|e| sys(path, e))?;
    let mut cnt = [0u32; 1];
    record::read_words(r, 0, &mut cnt)?;
    if cnt[0] as usize != mask.count() {
        return Err(broken(format!(
            "{path}: population count {} disagrees with bitmap ({})",
            cnt[0],
            mask.count()
        )));
    }

    mask.update_index();

    let plane = dims[0] * dims[1];
    let idx0 = z * plane + skip;
    let nread = mask.index(idx0 + nelem) - mask.index(idx0);
    debug_assert!(nread <= nelem);

    let esize = std::mem::size_of::<T>() as u64;
    let mlen = pack32_len(mask.len(), 1) as u64;
    let off = chunk_off
        + HEADER_FRAME
        + (4 + 2 * RECORD_MARK)
        + (4 * mlen + 2 * RECORD_MARK)
        + RECORD_MARK
        + esize * mask.index(idx0) as u64;
    r.seek(SeekFrom::Start(off)).map_err(|e| sys(path, e))?;

    let mut compact = vec![T::default(); nread];
    T::read_be_into(r, &mut compact).map_err(|e| crate::error::read_failure(e, path))?;

    let mut n = 0;
    for i in 0..nelem {
        out[skip + i] = if mask.get(idx0 + i) {
            n += 1;
            compact[n - 1]
        } else {
            T::from_f64(miss)
        };
    }
    debug_assert_eq!(n, nread);
    Ok(())
}

/// Write the bitmap record: `nsets` bitmaps of `zelems` cells each, back to
/// back, every bitmap starting on a word boundary.
pub(crate) fn write_mask<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    zelems: usize,
    nsets: usize,
    miss: f64,
) -> Result<()> {
    let mlen = pack32_len(zelems, 1);
    let nbytes = (4 * mlen * nsets) as u32;
    record::write_record_sep(w, nbytes)?;

    let mut flags = vec![false; zelems];
    let mut words = vec![0u32; mlen];
    for set in 0..nsets {
        let plane = &data[set * zelems..(set + 1) * zelems];
        for (f, v) in flags.iter_mut().zip(plane) {
            *f = !v.is_miss(miss);
        }
        pack_bools_into32(&mut words, &flags);
        record::write_words_payload(w, &words)?;
    }
    record::write_record_sep(w, nbytes)
}

/// Write a whole MR4 body: count, bitmap, compacted binary32 values.
pub(crate) fn write_mr4<T: Elem, W: Write>(w: &mut W, data: &[T], miss: f64) -> Result<()> {
    let cnt = scale::masked_count(data, miss);
    record::write_words_record(w, &[cnt as u32])?;
    write_mask(w, data, data.len(), 1, miss)?;

    let nbytes = (4 * cnt) as u32;
    record::write_record_sep(w, nbytes)?;
    let mut buf = Vec::with_capacity(4096);
    for &v in data {
        if !v.is_miss(miss) {
            buf.push(v.to_f32());
            if buf.len() == 4096 {
                record::write_f32_payload(w, &buf)?;
                buf.clear();
            }
        }
    }
    record::write_f32_payload(w, &buf)?;
    record::write_record_sep(w, nbytes)
}

/// Write a whole MR8 body: count, bitmap, compacted binary64 values.
pub(crate) fn write_mr8<T: Elem, W: Write>(w: &mut W, data: &[T], miss: f64) -> Result<()> {
    let cnt = scale::masked_count(data, miss);
    record::write_words_record(w, &[cnt as u32])?;
    write_mask(w, data, data.len(), 1, miss)?;

    let nbytes = (8 * cnt) as u32;
    record::write_record_sep(w, nbytes)?;
    let mut buf = Vec::with_capacity(2048);
    for &v in data {
        if !v.is_miss(miss) {
            buf.push(v.to_f64());
            if buf.len() == 2048 {
                record::write_f64_payload(w, &buf)?;
                buf.clear();
            }
        }
    }
    record::write_f64_payload(w, &buf)?;
    record::write_record_sep(w, nbytes)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_record_layout() {
        let miss = -999.0;
        let data = [1.0f32, miss as f32, 2.0, miss as f32, 3.0];
        let mut body = Vec::new();
        write_mask(&mut body, &data, 5, 1, miss).unwrap();

        assert_eq!(&body[0..4], &4u32.to_be_bytes());
        // bits 1 0 1 0 1, MSB first
        assert_eq!(&body[4..8], &0xa800_0000u32.to_be_bytes());
        assert_eq!(&body[8..12], &4u32.to_be_bytes());
    }

    #[test]
    fn per_plane_bitmaps_are_word_aligned() {
        let miss = -999.0;
        // two planes of 3 cells each: each bitmap takes its own word
        let data = [1.0f32, miss as f32, 1.0, miss as f32, 1.0, miss as f32];
        let mut body = Vec::new();
        write_mask(&mut body, &data, 3, 2, miss).unwrap();

        assert_eq!(&body[0..4], &8u32.to_be_bytes());
        assert_eq!(&body[4..8], &0xa000_0000u32.to_be_bytes());
        assert_eq!(&body[8..12], &0x4000_0000u32.to_be_bytes());
    }

    #[test]
    fn mr8_body_counts_and_compacts() {
        let miss = -999.0;
        let data = [miss, 1.5, miss, 2.5];
        let mut body = Vec::new();
        write_mr8::<f64, _>(&mut body, &data, miss).unwrap();

        // count record
        assert_eq!(&body[0..4], &4u32.to_be_bytes());
        assert_eq!(&body[4..8], &2u32.to_be_bytes());
        // compacted data record holds exactly two doubles
        let data_record_start = 12 + (4 + 4 + 4);
        assert_eq!(
            &body[data_record_start..data_record_start + 4],
            &16u32.to_be_bytes()
        );
        assert_eq!(
            &body[data_record_start + 4..data_record_start + 12],
            &1.5f64.to_bits().to_be_bytes()
        );
    }
}
