//! UR4/UR8: one record of unpacked big-endian words.

use std::io::{Read, Seek, SeekFrom, Write};

use super::Elem;
use crate::error::{read_failure, sys, Result};
use crate::fmt::HEADER_FRAME;
use crate::record::{self, RECORD_MARK};

/// Read `nelem` values of the plane `z`, starting `skip` elements in, into
/// `out[skip..]`.  `T` is the on-disk width (f32 for UR4, f64 for UR8).
pub(crate) fn read_plane<T: Elem, R: Read + Seek>(
    out: &mut [T],
    r: &mut R,
    chunk_off: u64,
    dims: [usize; 3],
    z: usize,
    skip: usize,
    nelem: usize,
    path: &str,
) -> Result<()> {
    let plane = dims[0] * dims[1];
    let esize = std::mem::size_of::<T>() as u64;
    let off = chunk_off + HEADER_FRAME + RECORD_MARK + esize * (z * plane + skip) as u64;

    r.seek(SeekFrom::Start(off)).map_err(|e| sys(path, e))?;
    T::read_be_into(r, &mut out[skip..skip + nelem]).map_err(|e| read_failure(e, path))
}

/// Write the whole chunk body as one record of binary32.
pub(crate) fn write_ur4<T: Elem, W: Write>(w: &mut W, data: &[T]) -> Result<()> {
    let nbytes = (4 * data.len()) as u32;
    record::write_record_sep(w, nbytes)?;

    let mut buf = [0f32; 4096];
    for piece in data.chunks(buf.len()) {
        for (b, &v) in buf.iter_mut().zip(piece) {
            *b = v.to_f32();
        }
        record::write_f32_payload(w, &buf[..piece.len()])?;
    }
    record::write_record_sep(w, nbytes)
}

/// Write the whole chunk body as one record of binary64.
pub(crate) fn write_ur8<T: Elem, W: Write>(w: &mut W, data: &[T]) -> Result<()> {
    let nbytes = (8 * data.len()) as u32;
    record::write_record_sep(w, nbytes)?;

    let mut buf = [0f64; 2048];
    for piece in data.chunks(buf.len()) {
        for (b, &v) in buf.iter_mut().zip(piece) {
            *b = v.to_f64();
        }
        record::write_f64_payload(w, &buf[..piece.len()])?;
    }
    record::write_record_sep(w, nbytes)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ur8_body_layout_and_readback() {
        let mut body = Vec::new();
        write_ur8::<f64, _>(&mut body, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(body.len(), 8 + 32);
        assert_eq!(&body[0..4], &32u32.to_be_bytes());
        assert_eq!(&body[4..12], &1.0f64.to_bits().to_be_bytes());

        // prepend a fake header frame so the plane reader's offsets apply
        let mut file = vec![0u8; HEADER_FRAME as usize];
        file.extend_from_slice(&body);

        let mut out = [0f64; 4];
        read_plane(&mut out, &mut Cursor::new(&file), 0, [2, 2, 1], 0, 0, 4, "mem").unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn ur4_narrows_doubles_on_write() {
        let mut body = Vec::new();
        write_ur4::<f64, _>(&mut body, &[0.1f64]).unwrap();
        let expected = (0.1f64 as f32).to_bits().to_be_bytes();
        assert_eq!(&body[4..8], &expected);
    }

    #[test]
    fn skip_addresses_into_the_plane() {
        let mut body = Vec::new();
        write_ur4::<f32, _>(&mut body, &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]).unwrap();
        let mut file = vec![0u8; HEADER_FRAME as usize];
        file.extend_from_slice(&body);

        // dims 3x1x2: plane 1 starts at element 3; read its last two
        let mut out = [0f32; 3];
        read_plane(&mut out, &mut Cursor::new(&file), 0, [3, 1, 2], 1, 1, 2, "mem").unwrap();
        assert_eq!(out[1], 14.0);
        assert_eq!(out[2], 15.0);
    }
}
