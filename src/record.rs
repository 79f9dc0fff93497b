//! Framed-record I/O.
//!
//! Every logical record on disk is bracketed by a 32-bit big-endian byte
//! count written twice: once before the payload and once after.  Readers
//! honor both marks: the prefix drives the seek to the end of the record and
//! the suffix is cross-checked against it, a mismatch meaning the file is
//! broken.
//!
//! Entry points:
//! - [`read_words`] / [`read_doubles`] — element reads with an element skip
//!   and count clamp, always leaving the stream at the end of the record
//! - [`skip_record`] — step over a record, validating its frame
//! - [`write_bytes_record`] / [`write_words_record`] / [`write_doubles_record`]
//!   — framed writes
//! - [`write_record_sep`] plus the `*_payload` writers — for bodies built
//!   from several pieces inside one frame
//!
//! Writers convert to big-endian through a fixed staging buffer, so a large
//! record never needs a whole-payload copy.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{broken, read_failure, sys, Result};

/// Size of one record mark (prefix or suffix) in bytes.
pub const RECORD_MARK: u64 = 4;

/// Staging buffer size for byte-order conversion on the write path.
const STAGE_SIZE: usize = 16 * 1024;

// ── Read side ─────────────────────────────────────────────────────────────────

/// Read the record prefix at the current position.
fn begin_record<R: Read>(r: &mut R) -> Result<u32> {
    let mut mark = [0u8; 4];
    r.read_exact(&mut mark)
        .map_err(|e| read_failure(e, "record prefix"))?;
    Ok(u32::from_be_bytes(mark))
}

/// Validate the suffix against `recsiz` and leave the stream just past it.
fn finish_record<R: Read + Seek>(r: &mut R, payload_end: u64, recsiz: u32) -> Result<()> {
    r.seek(SeekFrom::Start(payload_end))
        .map_err(|e| sys("seek to record end", e))?;
    let mut mark = [0u8; 4];
    r.read_exact(&mut mark)
        .map_err(|e| read_failure(e, "record suffix"))?;
    let suffix = u32::from_be_bytes(mark);
    if suffix != recsiz {
        return Err(broken(format!(
            "record marks disagree ({recsiz} vs {suffix})"
        )));
    }
    Ok(())
}

fn read_record_elems<R, T, F>(
    r: &mut R,
    skip: usize,
    out: &mut [T],
    elem_size: usize,
    read_into: F,
) -> Result<usize>
where
    R: Read + Seek,
    F: Fn(&mut R, &mut [T]) -> std::io::Result<()>,
{
    let recsiz = begin_record(r)?;
    if recsiz as usize % elem_size != 0 {
        return Err(broken(format!(
            "record length {recsiz} not a multiple of {elem_size}"
        )));
    }
    let in_record = recsiz as usize / elem_size;
    let payload_start = r
        .stream_position()
        .map_err(|e| sys("record position", e))?;
    let payload_end = payload_start + u64::from(recsiz);

    let skip = skip.min(in_record);
    let nelem = out.len().min(in_record - skip);

    if nelem > 0 {
        if skip != 0 {
            r.seek(SeekFrom::Current((elem_size * skip) as i64))
                .map_err(|e| sys("seek within record", e))?;
        }
        read_into(r, &mut out[..nelem]).map_err(|e| read_failure(e, "record payload"))?;
    }

    finish_record(r, payload_end, recsiz)?;
    Ok(nelem)
}

/// Read up to `out.len()` 32-bit words from the record at the current
/// position, skipping the first `skip` elements.  Returns the number of
/// elements actually read (clamped to the record length); the stream is left
/// at the end of the record either way.
pub fn read_words<R: Read + Seek>(r: &mut R, skip: usize, out: &mut [u32]) -> Result<usize> {
    read_record_elems(r, skip, out, 4, crate::wire::read_u32_into)
}

/// Like [`read_words`] for 64-bit reals.
pub fn read_doubles<R: Read + Seek>(r: &mut R, skip: usize, out: &mut [f64]) -> Result<usize> {
    read_record_elems(r, skip, out, 8, crate::wire::read_f64_into)
}

/// Step over one record, validating its frame.  Returns the payload length
/// in bytes.
pub fn skip_record<R: Read + Seek>(r: &mut R) -> Result<u32> {
    let recsiz = begin_record(r)?;
    let payload_start = r
        .stream_position()
        .map_err(|e| sys("record position", e))?;
    finish_record(r, payload_start + u64::from(recsiz), recsiz)?;
    Ok(recsiz)
}

// ── Write side ────────────────────────────────────────────────────────────────

/// Write one record mark (used as both prefix and suffix).
pub fn write_record_sep<W: Write>(w: &mut W, nbytes: u32) -> Result<()> {
    w.write_all(&nbytes.to_be_bytes())
        .map_err(|e| sys("write record mark", e))
}

/// Write the payload of `data` as big-endian words, no framing.
pub fn write_words_payload<W: Write>(w: &mut W, data: &[u32]) -> Result<()> {
    let mut stage = [0u8; STAGE_SIZE];
    for piece in data.chunks(STAGE_SIZE / 4) {
        for (i, v) in piece.iter().enumerate() {
            stage[4 * i..4 * i + 4].copy_from_slice(&v.to_be_bytes());
        }
        w.write_all(&stage[..4 * piece.len()])
            .map_err(|e| sys("write record payload", e))?;
    }
    Ok(())
}

/// Write the payload of `data` as big-endian 16-bit values, no framing.
pub fn write_u16_payload<W: Write>(w: &mut W, data: &[u16]) -> Result<()> {
    let mut stage = [0u8; STAGE_SIZE];
    for piece in data.chunks(STAGE_SIZE / 2) {
        for (i, v) in piece.iter().enumerate() {
            stage[2 * i..2 * i + 2].copy_from_slice(&v.to_be_bytes());
        }
        w.write_all(&stage[..2 * piece.len()])
            .map_err(|e| sys("write record payload", e))?;
    }
    Ok(())
}

/// Write the payload of `data` as big-endian binary32, no framing.
pub fn write_f32_payload<W: Write>(w: &mut W, data: &[f32]) -> Result<()> {
    let mut stage = [0u8; STAGE_SIZE];
    for piece in data.chunks(STAGE_SIZE / 4) {
        for (i, v) in piece.iter().enumerate() {
            stage[4 * i..4 * i + 4].copy_from_slice(&v.to_bits().to_be_bytes());
        }
        w.write_all(&stage[..4 * piece.len()])
            .map_err(|e| sys("write record payload", e))?;
    }
    Ok(())
}

/// Write the payload of `data` as big-endian binary64, no framing.
pub fn write_f64_payload<W: Write>(w: &mut W, data: &[f64]) -> Result<()> {
    let mut stage = [0u8; STAGE_SIZE];
    for piece in data.chunks(STAGE_SIZE / 8) {
        for (i, v) in piece.iter().enumerate() {
            stage[8 * i..8 * i + 8].copy_from_slice(&v.to_bits().to_be_bytes());
        }
        w.write_all(&stage[..8 * piece.len()])
            .map_err(|e| sys("write record payload", e))?;
    }
    Ok(())
}

/// Write a whole framed record of raw bytes.
pub fn write_bytes_record<W: Write>(w: &mut W, data: &[u8]) -> Result<()> {
    write_record_sep(w, data.len() as u32)?;
    w.write_all(data).map_err(|e| sys("write record payload", e))?;
    write_record_sep(w, data.len() as u32)
}

/// Write a whole framed record of 32-bit words.
pub fn write_words_record<W: Write>(w: &mut W, data: &[u32]) -> Result<()> {
    let nbytes = (4 * data.len()) as u32;
    write_record_sep(w, nbytes)?;
    write_words_payload(w, data)?;
    write_record_sep(w, nbytes)
}

/// Write a whole framed record of 64-bit reals.
pub fn write_doubles_record<W: Write>(w: &mut W, data: &[f64]) -> Result<()> {
    let nbytes = (8 * data.len()) as u32;
    write_record_sep(w, nbytes)?;
    write_f64_payload(w, data)?;
    write_record_sep(w, nbytes)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn words_record_roundtrip() {
        let mut buf = Vec::new();
        write_words_record(&mut buf, &[0x11223344, 0xAABBCCDD]).unwrap();
        assert_eq!(buf.len(), 4 + 8 + 4);
        assert_eq!(&buf[0..4], &8u32.to_be_bytes());
        assert_eq!(&buf[12..16], &8u32.to_be_bytes());
        assert_eq!(&buf[4..8], &[0x11, 0x22, 0x33, 0x44]);

        let mut r = Cursor::new(buf);
        let mut out = [0u32; 2];
        let n = read_words(&mut r, 0, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(out, [0x11223344, 0xAABBCCDD]);
        // stream left at end of record
        assert_eq!(r.position(), 16);
    }

    #[test]
    fn read_with_skip_and_clamp() {
        let mut buf = Vec::new();
        write_doubles_record(&mut buf, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let mut r = Cursor::new(&buf);
        let mut out = [0f64; 2];
        let n = read_doubles(&mut r, 1, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(out, [2.0, 3.0]);
        assert_eq!(r.position(), buf.len() as u64);

        // skip beyond the record yields zero elements
        let mut r = Cursor::new(&buf);
        let n = read_doubles(&mut r, 10, &mut out).unwrap();
        assert_eq!(n, 0);
        assert_eq!(r.position(), buf.len() as u64);
    }

    #[test]
    fn mismatched_suffix_is_broken() {
        let mut buf = Vec::new();
        write_words_record(&mut buf, &[7]).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let mut r = Cursor::new(&buf);
        let mut out = [0u32; 1];
        let err = read_words(&mut r, 0, &mut out).unwrap_err();
        assert!(matches!(err, crate::error::Gt3Error::Broken(_)));
    }

    #[test]
    fn length_not_multiple_of_elem_is_broken() {
        let mut buf = Vec::new();
        write_bytes_record(&mut buf, &[1, 2, 3]).unwrap();
        let mut r = Cursor::new(&buf);
        let mut out = [0u32; 1];
        assert!(read_words(&mut r, 0, &mut out).is_err());
    }

    #[test]
    fn skip_record_steps_over() {
        let mut buf = Vec::new();
        write_words_record(&mut buf, &[1, 2, 3]).unwrap();
        write_words_record(&mut buf, &[9]).unwrap();

        let mut r = Cursor::new(&buf);
        assert_eq!(skip_record(&mut r).unwrap(), 12);
        let mut out = [0u32; 1];
        read_words(&mut r, 0, &mut out).unwrap();
        assert_eq!(out[0], 9);
    }

    #[test]
    fn payload_writer_streams_past_stage_size() {
        let data: Vec<u32> = (0..10_000).collect();
        let mut buf = Vec::new();
        write_words_record(&mut buf, &data).unwrap();
        assert_eq!(buf.len(), 8 + 4 * data.len());

        let mut r = Cursor::new(buf);
        let mut out = vec![0u32; data.len()];
        read_words(&mut r, 0, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
