//! The chunk writer.
//!
//! A caller supplies the array, its dimensions, a metadata block, and a
//! format name; the writer resolves the format, overwrites the size-derived
//! header slots (DFMT, SIZE, AEND1..3), emits the framed header, and hands
//! the body to the format's encoder.  Input may be `f32` or `f64`
//! regardless of the target format; encoders convert as they go.

use std::io::Write;

use crate::codec::{masked, unpacked, urc, urx, ury, Elem};
use crate::codec::urx::Dequant;
use crate::error::{bad_call, Result};
use crate::fmt::{Family, Format};
use crate::header::Gt3Header;
use crate::record;

/// Borrowed input array for [`write_chunk`].
#[derive(Debug, Clone, Copy)]
pub enum DataRef<'a> {
    Float(&'a [f32]),
    Double(&'a [f64]),
}

impl<'a> From<&'a [f32]> for DataRef<'a> {
    fn from(v: &'a [f32]) -> Self {
        DataRef::Float(v)
    }
}

impl<'a> From<&'a [f64]> for DataRef<'a> {
    fn from(v: &'a [f64]) -> Self {
        DataRef::Double(v)
    }
}

impl DataRef<'_> {
    fn len(&self) -> usize {
        match self {
            DataRef::Float(v) => v.len(),
            DataRef::Double(v) => v.len(),
        }
    }
}

fn write_body<T: Elem, W: Write>(
    w: &mut W,
    data: &[T],
    fmt: Format,
    dims: [usize; 3],
    miss: f64,
) -> Result<()> {
    let [nx, ny, nz] = dims;
    let zelem = nx * ny;

    match fmt.family {
        Family::Ur4 => unpacked::write_ur4(w, data),
        Family::Ur8 => unpacked::write_ur8(w, data),
        Family::Urc2 => urc::write_body(w, data, zelem, nz, miss, false),
        Family::Urc1 => urc::write_body(w, data, zelem, nz, miss, true),
        Family::Urx => urx::write_packed(w, data, zelem, nz, fmt.nbits, miss, Dequant::Linear),
        Family::Ury => ury::write_packed(w, data, zelem, nz, fmt.nbits, miss),
        Family::Mr4 => masked::write_mr4(w, data, miss),
        Family::Mr8 => masked::write_mr8(w, data, miss),
        Family::Mrx => {
            urx::write_masked_packed(w, data, zelem, nz, fmt.nbits, miss, Dequant::Linear)
        }
        Family::Mry => ury::write_masked_packed(w, data, zelem, nz, fmt.nbits, miss),
    }
}

/// Write one chunk: the framed header followed by the encoded body.
///
/// `dfmt` names the target format (`"UR4"`, `"URC"`, `"URX16"`, …); `None`
/// keeps the input precision unpacked (UR4 for `f32` input, UR8 for `f64`).
/// The header is taken as-is except for DFMT, SIZE, and the axis ranges:
/// `ASTRn` defaults to 1 when absent and `AENDn` is derived from it and the
/// dimensions.
pub fn write_chunk<W: Write>(
    w: &mut W,
    data: DataRef<'_>,
    nx: usize,
    ny: usize,
    nz: usize,
    head_in: &Gt3Header,
    dfmt: Option<&str>,
) -> Result<()> {
    if nx < 1 || ny < 1 || nz < 1 {
        return Err(bad_call(format!("write_chunk: {nx} {ny} {nz}")));
    }
    if data.len() != nx * ny * nz {
        return Err(bad_call(format!(
            "write_chunk: {} values for a {nx}x{ny}x{nz} chunk",
            data.len()
        )));
    }

    let fmt = match dfmt {
        None => match data {
            DataRef::Float(_) => Format::UR4,
            DataRef::Double(_) => Format::UR8,
        },
        Some(s) => Format::output_format(s)
            .ok_or_else(|| bad_call(format!("write_chunk: {s:?} unknown format")))?,
    };

    let mut head = head_in.clone();
    head.set_str("DFMT", &fmt.to_string())?;
    head.set_int("SIZE", (nx * ny * nz) as i32)?;

    for (i, dim) in [nx, ny, nz].into_iter().enumerate() {
        let astr_key = format!("ASTR{}", i + 1);
        let astr = match head.get_int(&astr_key) {
            Ok(v) => v,
            Err(_) => {
                head.set_int(&astr_key, 1)?;
                1
            }
        };
        head.set_int(&format!("AEND{}", i + 1), astr - 1 + dim as i32)?;
    }

    let miss = head.get_double("MISS").unwrap_or(-999.0);

    record::write_bytes_record(w, head.as_bytes())?;

    let dims = [nx, ny, nz];
    match data {
        DataRef::Float(v) => write_body(w, v, fmt, dims, miss),
        DataRef::Double(v) => write_body(w, v, fmt, dims, miss),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt::HEADER_FRAME;
    use crate::header::HEADER_SIZE;

    #[test]
    fn header_frame_and_patched_slots() {
        let mut head = Gt3Header::new();
        head.set_str("ITEM", "T2").unwrap();

        let mut buf = Vec::new();
        write_chunk(
            &mut buf,
            DataRef::Float(&[1.0, 2.0, 3.0, 4.0]),
            2,
            2,
            1,
            &head,
            None,
        )
        .unwrap();

        assert_eq!(&buf[0..4], &(HEADER_SIZE as u32).to_be_bytes());
        assert_eq!(
            &buf[4 + HEADER_SIZE..8 + HEADER_SIZE],
            &(HEADER_SIZE as u32).to_be_bytes()
        );

        let mut block = [0u8; HEADER_SIZE];
        block.copy_from_slice(&buf[4..4 + HEADER_SIZE]);
        let written = Gt3Header::from_bytes(block);
        assert_eq!(written.get_str("DFMT").unwrap(), "UR4");
        assert_eq!(written.get_int("SIZE").unwrap(), 4);
        assert_eq!(written.get_int("AEND1").unwrap(), 2);
        assert_eq!(written.get_int("AEND3").unwrap(), 1);
        assert_eq!(written.get_str("ITEM").unwrap(), "T2");

        // UR4 body: one record of 16 bytes
        let body = &buf[HEADER_FRAME as usize..];
        assert_eq!(&body[0..4], &16u32.to_be_bytes());
        assert_eq!(body.len(), 4 + 16 + 4);
    }

    #[test]
    fn default_format_follows_input_precision() {
        let head = Gt3Header::new();
        let mut buf = Vec::new();
        write_chunk(&mut buf, DataRef::Double(&[1.0]), 1, 1, 1, &head, None).unwrap();
        let mut block = [0u8; HEADER_SIZE];
        block.copy_from_slice(&buf[4..4 + HEADER_SIZE]);
        assert_eq!(
            Gt3Header::from_bytes(block).get_str("DFMT").unwrap(),
            "UR8"
        );
    }

    #[test]
    fn astr_offsets_shift_aend() {
        let mut head = Gt3Header::new();
        head.set_int("ASTR1", 101).unwrap();
        let mut buf = Vec::new();
        write_chunk(&mut buf, DataRef::Float(&[0.0; 6]), 3, 2, 1, &head, None).unwrap();
        let mut block = [0u8; HEADER_SIZE];
        block.copy_from_slice(&buf[4..4 + HEADER_SIZE]);
        let written = Gt3Header::from_bytes(block);
        assert_eq!(written.get_int("ASTR1").unwrap(), 101);
        assert_eq!(written.get_int("AEND1").unwrap(), 103);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let head = Gt3Header::new();
        let mut buf = Vec::new();
        assert!(write_chunk(&mut buf, DataRef::Float(&[]), 0, 1, 1, &head, None).is_err());
        assert!(write_chunk(&mut buf, DataRef::Float(&[1.0]), 2, 1, 1, &head, None).is_err());
        assert!(
            write_chunk(&mut buf, DataRef::Float(&[1.0]), 1, 1, 1, &head, Some("UR5")).is_err()
        );
    }
}
