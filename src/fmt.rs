//! Storage format tags and their size arithmetic.
//!
//! A format is a family discriminant plus a quantization width (meaningful
//! for the bit-packed families only).  The family fixes the byte layout of
//! a chunk body; together with the dimensions it determines the body size of
//! every unmasked format in closed form, which is what lets the navigator
//! predict chunk boundaries from the header alone.  Masked bodies also
//! depend on the data (their population counts); the navigator completes
//! those sizes by peeking the body's leading count record.

use crate::header::HEADER_SIZE;
use crate::pack::pack32_len;
use crate::record::RECORD_MARK;

/// Bytes of a framed header: the 1024-byte block plus both record marks.
pub const HEADER_FRAME: u64 = HEADER_SIZE as u64 + 2 * RECORD_MARK;

/// Storage format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Unpacked 32-bit floats.
    Ur4,
    /// Block-quantized 16-bit, round-to-nearest.
    Urc2,
    /// Block-quantized 16-bit, floor quantization (deprecated).
    Urc1,
    /// Unpacked 64-bit floats.
    Ur8,
    /// Auto-scaled N-bit packed.
    Urx,
    /// Masked 32-bit floats.
    Mr4,
    /// Masked 64-bit floats.
    Mr8,
    /// Masked N-bit packed.
    Mrx,
    /// N-bit packed, zero-preserving decode.
    Ury,
    /// Masked N-bit packed, zero-preserving decode.
    Mry,
}

/// A format tag: family plus quantization width (0 when not applicable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub family: Family,
    pub nbits: u32,
}

/// Element width of the numeric buffers a format decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind {
    Float,
    Double,
}

impl Format {
    pub const UR4: Format = Format { family: Family::Ur4, nbits: 0 };
    pub const UR8: Format = Format { family: Family::Ur8, nbits: 0 };

    fn packed(family: Family, nbits: u32) -> Option<Format> {
        if (1..=31).contains(&nbits) {
            Some(Format { family, nbits })
        } else {
            None
        }
    }

    /// Parse a format name as stored in the DFMT slot.  `"URC"` (and its
    /// ancient alias `"UI2"`) is the floor-quantizing version 1; `"URC2"`
    /// is the rounding version.
    pub fn parse(s: &str) -> Option<Format> {
        match s {
            "UR4" => return Some(Format::UR4),
            "UR8" => return Some(Format::UR8),
            "URC2" => return Some(Format { family: Family::Urc2, nbits: 0 }),
            "URC" | "UI2" => return Some(Format { family: Family::Urc1, nbits: 0 }),
            "MR4" => return Some(Format { family: Family::Mr4, nbits: 0 }),
            "MR8" => return Some(Format { family: Family::Mr8, nbits: 0 }),
            _ => {}
        }

        let (prefix, digits) = s.split_at(s.len().min(3));
        let family = match prefix {
            "URX" => Family::Urx,
            "URY" => Family::Ury,
            "MRX" => Family::Mrx,
            "MRY" => Family::Mry,
            _ => return None,
        };
        let nbits: u32 = digits.parse().ok()?;
        Format::packed(family, nbits)
    }

    /// Resolve a user-facing format request for the write path: plain
    /// `"URC"` means the current version 2, `"URC1"` asks for the legacy
    /// variant explicitly.
    pub fn output_format(s: &str) -> Option<Format> {
        match s {
            "URC1" => Some(Format { family: Family::Urc1, nbits: 0 }),
            "URC" => Some(Format { family: Family::Urc2, nbits: 0 }),
            _ => Format::parse(s),
        }
    }

    pub fn is_masked(self) -> bool {
        matches!(self.family, Family::Mr4 | Family::Mr8 | Family::Mrx | Family::Mry)
    }

    /// Width of the numeric type this format decodes into: double when the
    /// stored precision exceeds 24 bits, float otherwise.
    pub fn elem_kind(self) -> ElemKind {
        match self.family {
            Family::Ur8 | Family::Mr8 => ElemKind::Double,
            Family::Urx | Family::Ury | Family::Mrx | Family::Mry if self.nbits > 24 => {
                ElemKind::Double
            }
            _ => ElemKind::Float,
        }
    }

    /// Body size in bytes (records with their marks, header frame excluded)
    /// for the families whose size is a closed form of the dimensions.
    /// Masked families return `None`: their bodies depend on the data.
    pub fn fixed_body_size(self, dims: [usize; 3]) -> Option<u64> {
        let [nx, ny, nz] = dims;
        let plane = (nx * ny) as u64;
        let total = plane * nz as u64;
        let nz = nz as u64;
        let m = RECORD_MARK;

        match self.family {
            Family::Ur4 => Some(2 * m + 4 * total),
            Family::Ur8 => Some(2 * m + 8 * total),
            Family::Urc1 | Family::Urc2 => Some(nz * (8 + 4 + 4 + 2 * plane + 8 * m)),
            Family::Urx | Family::Ury => {
                let plen = pack32_len(nx * ny, self.nbits) as u64;
                Some((2 * m + 16 * nz) + (2 * m + 4 * plen * nz))
            }
            Family::Mr4 | Family::Mr8 | Family::Mrx | Family::Mry => None,
        }
    }

    /// Byte offset (from the chunk start) of the z-plane `z` for formats
    /// with a closed-form per-plane layout.
    pub fn zslice_offset(self, dims: [usize; 3], z: usize) -> Option<u64> {
        let [nx, ny, nz] = dims;
        let plane = (nx * ny) as u64;
        let z64 = z as u64;
        let m = RECORD_MARK;

        let body = match self.family {
            Family::Ur4 => m + 4 * plane * z64,
            Family::Ur8 => m + 8 * plane * z64,
            Family::Urc1 | Family::Urc2 => (8 + 4 + 4 + 2 * plane + 8 * m) * z64,
            Family::Urx | Family::Ury => {
                let plen = pack32_len(nx * ny, self.nbits) as u64;
                (2 * m + 16 * nz as u64) + m + 4 * plen * z64
            }
            Family::Mr4 | Family::Mr8 | Family::Mrx | Family::Mry => return None,
        };
        Some(HEADER_FRAME + body)
    }
}

impl std::fmt::Display for Format {
    /// Canonical DFMT spelling.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.family {
            Family::Ur4 => write!(f, "UR4"),
            Family::Ur8 => write!(f, "UR8"),
            Family::Urc2 => write!(f, "URC2"),
            Family::Urc1 => write!(f, "URC"),
            Family::Mr4 => write!(f, "MR4"),
            Family::Mr8 => write!(f, "MR8"),
            Family::Urx => write!(f, "URX{}", self.nbits),
            Family::Ury => write!(f, "URY{}", self.nbits),
            Family::Mrx => write!(f, "MRX{}", self.nbits),
            Family::Mry => write!(f, "MRY{}", self.nbits),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixed_names() {
        assert_eq!(Format::parse("UR4"), Some(Format::UR4));
        assert_eq!(Format::parse("UR8"), Some(Format::UR8));
        assert_eq!(Format::parse("URC2").unwrap().family, Family::Urc2);
        assert_eq!(Format::parse("URC").unwrap().family, Family::Urc1);
        assert_eq!(Format::parse("UI2").unwrap().family, Family::Urc1);
        assert_eq!(Format::parse("MR4").unwrap().family, Family::Mr4);
        assert!(Format::parse("XYZ").is_none());
    }

    #[test]
    fn parse_packed_names() {
        let f = Format::parse("URX12").unwrap();
        assert_eq!((f.family, f.nbits), (Family::Urx, 12));
        let f = Format::parse("MRY10").unwrap();
        assert_eq!((f.family, f.nbits), (Family::Mry, 10));

        assert!(Format::parse("URX").is_none());
        assert!(Format::parse("URX0").is_none());
        assert!(Format::parse("URX32").is_none());
        assert!(Format::parse("URX12x").is_none());
    }

    #[test]
    fn output_format_resolves_urc_versions() {
        let f = Format::output_format("URC").unwrap();
        assert_eq!(f.family, Family::Urc2);
        assert_eq!(f.to_string(), "URC2");

        let f = Format::output_format("URC1").unwrap();
        assert_eq!(f.family, Family::Urc1);
        assert_eq!(f.to_string(), "URC");

        assert_eq!(Format::output_format("URX12").unwrap().to_string(), "URX12");
        assert_eq!(Format::output_format("MR8").unwrap().to_string(), "MR8");
    }

    #[test]
    fn element_kind_follows_precision() {
        assert_eq!(Format::UR4.elem_kind(), ElemKind::Float);
        assert_eq!(Format::UR8.elem_kind(), ElemKind::Double);
        assert_eq!(Format::parse("URC2").unwrap().elem_kind(), ElemKind::Float);
        assert_eq!(Format::parse("URX24").unwrap().elem_kind(), ElemKind::Float);
        assert_eq!(Format::parse("URX25").unwrap().elem_kind(), ElemKind::Double);
        assert_eq!(Format::parse("MRY31").unwrap().elem_kind(), ElemKind::Double);
        assert_eq!(Format::parse("MR8").unwrap().elem_kind(), ElemKind::Double);
    }

    #[test]
    fn closed_form_sizes() {
        // one UR4 plane of 320x160
        let f = Format::UR4;
        assert_eq!(
            f.fixed_body_size([320, 160, 1]),
            Some(8 + 4 * 320 * 160)
        );

        // URC: per-plane parameter records plus the 16-bit body
        let f = Format::parse("URC2").unwrap();
        assert_eq!(
            f.fixed_body_size([4, 3, 2]),
            Some(2 * (8 + 4 + 4 + 2 * 12 + 32))
        );

        // URX12 of 65536 elements: 65536*12/32 = 24576 words per plane
        let f = Format::parse("URX12").unwrap();
        assert_eq!(
            f.fixed_body_size([256, 256, 2]),
            Some((8 + 16 * 2) + (8 + 4 * 24576 * 2))
        );

        assert_eq!(Format::parse("MR4").unwrap().fixed_body_size([2, 2, 1]), None);
    }

    #[test]
    fn zslice_offsets_step_by_plane() {
        let dims = [10, 5, 4];

        let f = Format::UR8;
        let step = f.zslice_offset(dims, 1).unwrap() - f.zslice_offset(dims, 0).unwrap();
        assert_eq!(step, 8 * 50);
        assert_eq!(f.zslice_offset(dims, 0).unwrap(), HEADER_FRAME + 4);

        let f = Format::parse("URX8").unwrap();
        let step = f.zslice_offset(dims, 1).unwrap() - f.zslice_offset(dims, 0).unwrap();
        assert_eq!(step, 4 * pack32_len(50, 8) as u64);

        assert!(Format::parse("MRX8").unwrap().zslice_offset(dims, 0).is_none());
    }
}
