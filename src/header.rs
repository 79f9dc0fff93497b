//! The 1024-byte textual metadata block heading every chunk.
//!
//! The block is 64 positional slots of 16 bytes addressed through a sorted
//! name directory.  Slots are typed (text, 32-byte wide text, integer,
//! real); a handful carry a default literal that stands in when the stored
//! slot is blank.  Text is space-padded on write and trimmed on read, with
//! control characters surrogated to `#` on the way out.  Integers serialize
//! right-justified; reals serialize in 16-column scientific notation with
//! seven fraction digits.
//!
//! Slot 0 holds the magic token `"            9010"` that identifies a valid
//! header.

use crate::error::{bad_call, bad_header, Result};
use crate::time::Date;

/// Byte size of a header block.
pub const HEADER_SIZE: usize = 1024;

/// Magic token stored in the first slot.
pub const MAGIC: &[u8; 16] = b"            9010";

const ELEM_SIZE: usize = 16;
const NUM_ELEM: usize = 64;

const TITL1_ID: usize = 13;

// ── Item directory ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum ItemType {
    Str,
    Str2,
    Int,
    Real,
}

struct Item {
    name: &'static str,
    id: usize,
    ty: ItemType,
    default: Option<&'static [u8; 16]>,
}

const ZERO: &[u8; 16] = b"               0";
const ONE: &[u8; 16] = b"               1";
const MISS: &[u8; 16] = b"  -9.9900000E+02";

macro_rules! item {
    ($name:literal, $id:expr, $ty:ident) => {
        Item { name: $name, id: $id, ty: ItemType::$ty, default: None }
    };
    ($name:literal, $id:expr, $ty:ident, $default:expr) => {
        Item { name: $name, id: $id, ty: ItemType::$ty, default: Some($default) }
    };
}

/// Sorted by name; looked up with a binary search.
#[rustfmt::skip]
static ITEMS: [Item; 65] = [
    item!("AEND1",  30, Int),
    item!("AEND2",  33, Int),
    item!("AEND3",  36, Int),
    item!("AITM1",  28, Str),
    item!("AITM2",  31, Str),
    item!("AITM3",  34, Str),
    item!("ASTR1",  29, Int, ONE),
    item!("ASTR2",  32, Int, ONE),
    item!("ASTR3",  35, Int, ONE),
    item!("CDATE",  59, Str),
    item!("COPTN",  44, Str),
    item!("CSIGN",  60, Str),
    item!("DATE",   26, Str),
    item!("DATE1",  47, Str),
    item!("DATE2",  48, Str),
    item!("DFMT",   37, Str, b"UR4             "),
    item!("DIVL",   42, Real, MISS),
    item!("DIVS",   41, Real, MISS),
    item!("DMAX",   40, Real, MISS),
    item!("DMIN",   39, Real, MISS),
    item!("DNUM",   12, Int, ZERO),
    item!("DSET",    1, Str),
    item!("EDIT1",   3, Str),
    item!("EDIT2",   4, Str),
    item!("EDIT3",   5, Str),
    item!("EDIT4",   6, Str),
    item!("EDIT5",   7, Str),
    item!("EDIT6",   8, Str),
    item!("EDIT7",   9, Str),
    item!("EDIT8",  10, Str),
    item!("ETTL1",  16, Str),
    item!("ETTL2",  17, Str),
    item!("ETTL3",  18, Str),
    item!("ETTL4",  19, Str),
    item!("ETTL5",  20, Str),
    item!("ETTL6",  21, Str),
    item!("ETTL7",  22, Str),
    item!("ETTL8",  23, Str),
    item!("FNUM",   11, Int, ZERO),
    item!("IDFM",    0, Int),
    item!("IOPTN",  45, Int, ZERO),
    item!("ITEM",    2, Str),
    item!("MDATE",  61, Str),
    item!("MEMO1",  49, Str),
    item!("MEMO10", 58, Str),
    item!("MEMO2",  50, Str),
    item!("MEMO3",  51, Str),
    item!("MEMO4",  52, Str),
    item!("MEMO5",  53, Str),
    item!("MEMO6",  54, Str),
    item!("MEMO7",  55, Str),
    item!("MEMO8",  56, Str),
    item!("MEMO9",  57, Str),
    item!("MISS",   38, Real, MISS),
    item!("MSIGN",  62, Str),
    item!("ROPTN",  46, Real, b"   0.0000000E+00"),
    item!("SIZE",   63, Int, ZERO),
    item!("STYP",   43, Int, ONE),
    item!("TDUR",   27, Int, ZERO),
    item!("TIME",   24, Int, ZERO),
    item!("TITL1",  13, Str),
    item!("TITL2",  14, Str),
    item!("TITLE",  13, Str2),
    item!("UNIT",   15, Str),
    item!("UTIM",   25, Str),
];

fn lookup(name: &str) -> Option<&'static Item> {
    ITEMS
        .binary_search_by(|item| item.name.cmp(name))
        .ok()
        .map(|i| &ITEMS[i])
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == b' ')
}

fn width(ty: ItemType) -> usize {
    if ty == ItemType::Str2 {
        2 * ELEM_SIZE
    } else {
        ELEM_SIZE
    }
}

// ── Lenient numeric parsing ───────────────────────────────────────────────────

/// Parse the longest leading numeric prefix of a trimmed slot, so values
/// followed by stray characters still decode.
fn parse_prefix<T: std::str::FromStr>(field: &str) -> Option<T> {
    let t = field.trim();
    if t.is_empty() {
        return None;
    }
    for end in (1..=t.len()).rev() {
        if let Ok(v) = t[..end].parse() {
            return Some(v);
        }
    }
    None
}

/// `%16.7E`-style rendering: seven fraction digits, `E`, signed two-digit
/// exponent, right-justified in 16 columns.
fn format_sci16(v: f64) -> [u8; 16] {
    let text = if v.is_finite() {
        let s = format!("{:.7e}", v);
        let (mant, exp) = s.split_once('e').expect("exponent marker");
        let exp: i32 = exp.parse().expect("exponent value");
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mant}E{sign}{:02}", exp.abs())
    } else if v.is_nan() {
        "NAN".to_owned()
    } else if v > 0.0 {
        "INF".to_owned()
    } else {
        "-INF".to_owned()
    };

    let mut out = [b' '; 16];
    let b = text.as_bytes();
    let n = b.len().min(16);
    out[16 - n..].copy_from_slice(&b[b.len() - n..]);
    out
}

// ── Header ────────────────────────────────────────────────────────────────────

/// One 1024-byte metadata block.
#[derive(Clone)]
pub struct Gt3Header {
    h: [u8; HEADER_SIZE],
}

impl Default for Gt3Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Gt3Header {
    /// A blank header: all spaces, default literals in place, magic set.
    pub fn new() -> Self {
        let mut h = [b' '; HEADER_SIZE];
        for item in &ITEMS {
            if let Some(default) = item.default {
                h[ELEM_SIZE * item.id..ELEM_SIZE * (item.id + 1)].copy_from_slice(default);
            }
        }
        h[..ELEM_SIZE].copy_from_slice(MAGIC);
        Self { h }
    }

    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self { h: bytes }
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.h
    }

    /// Does `bytes` start with the header magic in slot 0?
    pub fn magic_matches(bytes: &[u8]) -> bool {
        bytes.len() >= ELEM_SIZE && &bytes[..ELEM_SIZE] == MAGIC
    }

    /// Slot index of `name`, if known.
    pub fn item_id(name: &str) -> Option<usize> {
        lookup(name).map(|item| item.id)
    }

    fn field(&self, item: &Item) -> &[u8] {
        &self.h[ELEM_SIZE * item.id..ELEM_SIZE * item.id + width(item.ty)]
    }

    fn field_mut(&mut self, item: &Item) -> &mut [u8] {
        &mut self.h[ELEM_SIZE * item.id..ELEM_SIZE * item.id + width(item.ty)]
    }

    /// Raw slot bytes after default substitution.
    fn stored<'a>(&'a self, item: &'static Item) -> &'a [u8] {
        let f = self.field(item);
        match item.default {
            Some(default) if is_blank(f) => default,
            _ => f,
        }
    }

    // ── Typed getters ─────────────────────────────────────────────────────

    /// Trimmed text value of `key`; control characters come out as `#`.
    pub fn get_str(&self, key: &str) -> Result<String> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        let raw = self.stored(item);
        let trimmed = trim_ascii(raw);
        Ok(trimmed
            .iter()
            .map(|&b| if b < 0x20 || b == 0x7f { '#' } else { b as char })
            .collect())
    }

    pub fn get_int(&self, key: &str) -> Result<i32> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        if item.ty != ItemType::Int {
            return Err(bad_call(format!("{key}: not an integer item")));
        }
        let field = String::from_utf8_lossy(self.stored(item)).into_owned();
        parse_prefix(&field).ok_or_else(|| bad_header(format!("{key}: {:?}", field.trim())))
    }

    pub fn get_double(&self, key: &str) -> Result<f64> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        if item.ty != ItemType::Real {
            return Err(bad_call(format!("{key}: not a real item")));
        }
        let field = String::from_utf8_lossy(self.stored(item)).into_owned();
        parse_prefix(&field).ok_or_else(|| bad_header(format!("{key}: {:?}", field.trim())))
    }

    /// Decode a date slot of the form `YYYYMMDD HHMMSS`.
    pub fn get_date(&self, key: &str) -> Result<Date> {
        let text = self.get_str(key)?;
        let t = text.trim();
        let parse = |s: &str| -> Option<Date> {
            let (ymd, hms) = s.split_once(' ')?;
            if ymd.len() < 8 || hms.len() != 6 {
                return None;
            }
            let (y, md) = ymd.split_at(ymd.len() - 4);
            Some(Date {
                year: y.parse().ok()?,
                mon: md[..2].parse().ok()?,
                day: md[2..].parse().ok()?,
                hour: hms[..2].parse().ok()?,
                min: hms[2..4].parse().ok()?,
                sec: hms[4..].parse().ok()?,
            })
        };
        parse(t).ok_or_else(|| bad_header(format!("{key}: {t:?} is not a date")))
    }

    // ── Typed setters ─────────────────────────────────────────────────────

    /// Store `value` space-padded (and truncated to the slot width).
    pub fn set_str(&mut self, key: &str, value: &str) -> Result<()> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        let f = self.field_mut(item);
        f.fill(b' ');
        let bytes = value.as_bytes();
        let n = bytes.len().min(f.len());
        f[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }

    pub fn set_int(&mut self, key: &str, value: i32) -> Result<()> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        if item.ty != ItemType::Int {
            return Err(bad_call(format!("{key}: not an integer item")));
        }
        let text = format!("{value:>16}");
        self.field_mut(item).copy_from_slice(&text.as_bytes()[..ELEM_SIZE]);
        Ok(())
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> Result<()> {
        let item = lookup(key).ok_or_else(|| bad_call(format!("{key}: unknown header item")))?;
        if item.ty != ItemType::Real {
            return Err(bad_call(format!("{key}: not a real item")));
        }
        let text = format_sci16(value);
        self.field_mut(item).copy_from_slice(&text);
        Ok(())
    }

    pub fn set_date(&mut self, key: &str, date: &Date) -> Result<()> {
        let text = format!(
            "{:04}{:02}{:02} {:02}{:02}{:02}",
            date.year, date.mon, date.day, date.hour, date.min, date.sec
        );
        self.set_str(key, &text)
    }

    // ── Numbered-slot appenders ───────────────────────────────────────────

    fn append_numbered(&mut self, base: &str, count: usize, value: &str) -> Result<()> {
        for i in 1..=count {
            let key = format!("{base}{i}");
            let item = lookup(&key).expect("numbered item");
            if is_blank(self.field(item)) {
                return self.set_str(&key, value);
            }
        }
        Err(bad_call(format!("no blank {base} slot left")))
    }

    /// Fill the first blank EDIT slot.
    pub fn set_edit(&mut self, value: &str) -> Result<()> {
        self.append_numbered("EDIT", 8, value)
    }

    /// Fill the first blank ETTL slot.
    pub fn set_ettl(&mut self, value: &str) -> Result<()> {
        self.append_numbered("ETTL", 8, value)
    }

    /// Fill the first blank MEMO slot.
    pub fn set_memo(&mut self, value: &str) -> Result<()> {
        self.append_numbered("MEMO", 10, value)
    }

    // ── Linked setters ────────────────────────────────────────────────────

    /// Set MISS, rewriting DMIN/DMAX/DIVS/DIVL wherever they equal the
    /// previous missing value.
    pub fn set_miss(&mut self, miss: f64) -> Result<()> {
        let old = self.get_double("MISS").unwrap_or(-999.0);
        for key in ["DMIN", "DMAX", "DIVS", "DIVL"] {
            if let Ok(v) = self.get_double(key) {
                if v == old {
                    self.set_double(key, miss)?;
                }
            }
        }
        self.set_double("MISS", miss)
    }

    /// Set `ASTRn` (`dim` in 1..=3) and shift `AENDn` by the same delta so
    /// the axis length is preserved.
    pub fn set_axis_start(&mut self, dim: usize, start: i32) -> Result<()> {
        if !(1..=3).contains(&dim) {
            return Err(bad_call(format!("axis number {dim} out of 1..=3")));
        }
        let astr = format!("ASTR{dim}");
        let aend = format!("AEND{dim}");
        let old_start = self.get_int(&astr)?;
        let old_end = self.get_int(&aend).ok();
        self.set_int(&astr, start)?;
        if let Some(end) = old_end {
            self.set_int(&aend, end + (start - old_start))?;
        }
        Ok(())
    }

    // ── Whole-header operations ───────────────────────────────────────────

    /// Fill every blank slot of `self` from `src` (TITLE treated as one
    /// 32-byte field).
    pub fn merge(&mut self, src: &Gt3Header) {
        let mut id = 0;
        while id < NUM_ELEM {
            let len = if id == TITL1_ID { 2 * ELEM_SIZE } else { ELEM_SIZE };
            let range = ELEM_SIZE * id..ELEM_SIZE * id + len;
            if is_blank(&self.h[range.clone()]) {
                self.h[range.clone()].copy_from_slice(&src.h[range]);
            }
            id += len / ELEM_SIZE;
        }
    }
}

impl std::fmt::Debug for Gt3Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gt3Header")
            .field("item", &self.get_str("ITEM").unwrap_or_default())
            .field("dfmt", &self.get_str("DFMT").unwrap_or_default())
            .finish()
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_sorted_and_self_consistent() {
        for pair in ITEMS.windows(2) {
            assert!(pair[0].name < pair[1].name);
        }
        for item in &ITEMS {
            assert_eq!(lookup(item.name).unwrap().id, item.id);
        }
        assert_eq!(Gt3Header::item_id("IDFM"), Some(0));
        assert_eq!(Gt3Header::item_id("TITLE"), Some(13));
        assert_eq!(Gt3Header::item_id("SIZE"), Some(63));
        assert_eq!(Gt3Header::item_id("IDFMX"), None);
    }

    #[test]
    fn init_sets_magic_and_defaults() {
        let h = Gt3Header::new();
        assert!(Gt3Header::magic_matches(h.as_bytes()));
        assert_eq!(h.get_str("DFMT").unwrap(), "UR4");
        assert_eq!(h.get_int("ASTR1").unwrap(), 1);
        assert_eq!(h.get_double("MISS").unwrap(), -999.0);
        assert_eq!(h.get_double("ROPTN").unwrap(), 0.0);
        // blank item with no default reads as an empty string
        assert_eq!(h.get_str("AITM1").unwrap(), "");
    }

    #[test]
    fn string_set_trim_truncate() {
        let mut h = Gt3Header::new();

        h.set_str("ITEM", "GLTS").unwrap();
        assert_eq!(h.get_str("ITEM").unwrap(), "GLTS");

        h.set_str("DSET", "0123456789ABCDEFGHI").unwrap();
        assert_eq!(h.get_str("DSET").unwrap(), "0123456789ABCDEF");

        h.set_str("TITLE", "Surface Air Temperature").unwrap();
        assert_eq!(h.get_str("TITLE").unwrap(), "Surface Air Temperature");
    }

    #[test]
    fn control_characters_are_surrogated() {
        let mut h = Gt3Header::new();
        h.set_str("ITEM", "a\u{1}b").unwrap();
        assert_eq!(h.get_str("ITEM").unwrap(), "a#b");
    }

    #[test]
    fn int_roundtrip_right_justified() {
        let mut h = Gt3Header::new();
        h.set_int("AEND1", 320).unwrap();
        assert_eq!(h.get_int("AEND1").unwrap(), 320);
        let id = Gt3Header::item_id("AEND1").unwrap();
        assert_eq!(&h.as_bytes()[16 * id..16 * (id + 1)], b"             320");
    }

    #[test]
    fn real_format_matches_the_fixed_defaults() {
        assert_eq!(&format_sci16(-999.0), b"  -9.9900000E+02");
        assert_eq!(&format_sci16(0.0), b"   0.0000000E+00");
        assert_eq!(&format_sci16(1.0), b"   1.0000000E+00");
        assert_eq!(&format_sci16(-1.25e-7), b"  -1.2500000E-07");
    }

    #[test]
    fn double_roundtrip() {
        let mut h = Gt3Header::new();
        h.set_double("DMIN", -273.15).unwrap();
        let v = h.get_double("DMIN").unwrap();
        assert!((v - -273.15).abs() < 1e-4);
    }

    #[test]
    fn typed_accessor_rejects_wrong_type() {
        let h = Gt3Header::new();
        assert!(h.get_int("DFMT").is_err());
        assert!(h.get_double("TIME").is_err());
        assert!(h.get_int("NOSUCH").is_err());
    }

    #[test]
    fn date_roundtrip() {
        let mut h = Gt3Header::new();
        let d = Date::new(1999, 12, 31, 23, 59, 58);
        h.set_date("DATE", &d).unwrap();
        assert_eq!(h.get_str("DATE").unwrap(), "19991231 235958");
        assert_eq!(h.get_date("DATE").unwrap(), d);
    }

    #[test]
    fn merge_fills_only_blank_slots() {
        let mut src = Gt3Header::new();
        src.set_str("TITLE", "................................").unwrap();
        src.set_str("DSET", "CNTL").unwrap();

        let mut dst = Gt3Header::new();
        dst.set_str("TITLE", "Air Temperature").unwrap();
        dst.merge(&src);

        assert_eq!(dst.get_str("TITLE").unwrap(), "Air Temperature");
        assert_eq!(dst.get_str("DSET").unwrap(), "CNTL");
    }

    #[test]
    fn appenders_take_the_first_blank_slot() {
        let mut h = Gt3Header::new();
        h.set_edit("regrid").unwrap();
        h.set_edit("scaled").unwrap();
        assert_eq!(h.get_str("EDIT1").unwrap(), "regrid");
        assert_eq!(h.get_str("EDIT2").unwrap(), "scaled");

        h.set_memo("note").unwrap();
        assert_eq!(h.get_str("MEMO1").unwrap(), "note");
    }

    #[test]
    fn miss_propagates_to_matching_bounds() {
        let mut h = Gt3Header::new();
        h.set_double("DMAX", 42.0).unwrap();
        h.set_miss(-1e20).unwrap();

        assert_eq!(h.get_double("MISS").unwrap(), -1e20);
        // DMIN was still at the old missing value -> follows
        assert_eq!(h.get_double("DMIN").unwrap(), -1e20);
        // DMAX had a real bound -> untouched
        assert_eq!(h.get_double("DMAX").unwrap(), 42.0);
    }

    #[test]
    fn axis_start_shifts_axis_end() {
        let mut h = Gt3Header::new();
        h.set_int("ASTR1", 1).unwrap();
        h.set_int("AEND1", 320).unwrap();
        h.set_axis_start(1, 11).unwrap();
        assert_eq!(h.get_int("ASTR1").unwrap(), 11);
        assert_eq!(h.get_int("AEND1").unwrap(), 330);
    }

    #[test]
    fn lenient_numeric_parse() {
        assert_eq!(parse_prefix::<i32>("  320 "), Some(320));
        assert_eq!(parse_prefix::<i32>("320abc"), Some(320));
        assert_eq!(parse_prefix::<i32>("   "), None);
        assert_eq!(parse_prefix::<f64>(" -9.9900000E+02"), Some(-999.0));
        assert_eq!(parse_prefix::<f64>("1.5x"), Some(1.5));
    }
}
