//! Grid axes: built-in coordinate generators, integration weights, and the
//! axis-file lookup.
//!
//! An axis name is base + length + optional sub-division + flags, e.g.
//! `GGLA160Ix2`: Gaussian latitudes, 160 nodes, inverted (south to north),
//! each row split in two by interpolation.  Recognized bases are generated
//! in place; anything else is loaded from an axis file found through
//! `GTAX_PATH`, the working directory, `GTAXDIR`, and a built-in default
//! directory.  Axis files are themselves container files carrying one chunk
//! of coordinates (`GTAXLOC.*`) or weights (`GTAXWGT.*`).

use std::f64::consts::PI;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{record, Gt3Error, Result};
use crate::file::Gt3File;
use crate::gauss::gauss_legendre;
use crate::grid::{uniform_bnd, uniform_center};
use crate::header::Gt3Header;
use crate::varbuf::Varbuf;
use crate::write::{write_chunk, DataRef};

/// Directory searched first for axis files (colon-separated list).
pub const GTAX_PATH_ENV: &str = "GTAX_PATH";
/// Fallback directory searched when `GTAX_PATH` is unset.
pub const GTAXDIR_ENV: &str = "GTAXDIR";
/// Compile-time default axis directory.
pub const DEFAULT_AXIS_DIR: &str = "/usr/local/share/gtool/gt3";

const TWO_OVER_PI: f64 = 2.0 / PI;

/// One coordinate axis.
#[derive(Debug, Clone)]
pub struct Axis {
    pub name: String,
    pub values: Vec<f64>,
    /// Lower and upper bound.
    pub range: (f64, f64),
    pub cyclic: bool,
    pub title: Option<String>,
    pub unit: Option<String>,
}

impl Axis {
    fn bare(values: Vec<f64>) -> Axis {
        Axis {
            name: String::new(),
            values,
            range: (-999.0, -999.0),
            cyclic: false,
            title: None,
            unit: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Name parsing ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AxisFlags {
    /// `I`: ascending instead of the base's native direction.
    invert: bool,
    /// `M`: mid-cell samples.
    mid: bool,
    /// `C`: signed longitude range [-180, 180].
    signed: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct AxisName {
    base: String,
    len: usize,
    idiv: usize,
    flags: AxisFlags,
}

fn parse_axis_name(name: &str) -> Option<AxisName> {
    let s = name.trim_start_matches(' ');

    let base_end = s
        .char_indices()
        .find(|(i, c)| c.is_ascii_digit() || *i >= 16)
        .map_or(s.len(), |(i, _)| i);
    let base = s[..base_end].to_owned();
    let mut rest = &s[base_end..];

    let len = if rest.starts_with(|c: char| c.is_ascii_digit()) {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let n: usize = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        n
    } else {
        1
    };
    if len < 1 {
        return None;
    }

    let mut flags = AxisFlags::default();
    let mut idiv = 1usize;
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            'x' if rest[i + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                let tail = &rest[i + 1..];
                let digits = tail
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(tail.len());
                idiv = tail[..digits].parse().ok()?;
                rest = &tail[digits..];
                chars = rest.char_indices();
            }
            'I' => flags.invert = true,
            'M' => flags.mid = true,
            'C' => flags.signed = true,
            _ => return None,
        }
    }

    Some(AxisName {
        base,
        len,
        idiv,
        flags,
    })
}

// ── Built-in generators ───────────────────────────────────────────────────────

fn invert(grid: &mut [f64]) {
    grid.reverse();
}

/// Sub-divide Gaussian latitude rows: cell boundaries in mu space come from
/// the quadrature weights, get converted to degrees, and each cell is
/// linearly interpolated into `idiv` rows.
fn latitude_mosaic(grid: &mut [f64], wght: &[f64], len: usize, idiv: usize) {
    let mut bnd = vec![0.0; len + 1];

    bnd[0] = -1.0;
    bnd[len] = 1.0;
    for i in 1..len / 2 {
        bnd[i] = bnd[i - 1] + wght[i - 1];
        bnd[len - i] = -bnd[i];
    }
    if len % 2 == 0 && len >= 2 {
        bnd[len / 2] = 0.0;
    }

    for b in bnd.iter_mut() {
        *b = 90.0 * (1.0 - b.acos() * TWO_OVER_PI);
    }

    let rdiv = 1.0 / (2 * idiv) as f64;
    for m in 0..idiv {
        let coef = (2 * m + 1) as f64 * rdiv;
        for i in 0..len {
            grid[i * idiv + m] = (1.0 - coef) * bnd[i] + coef * bnd[i + 1];
        }
    }
}

/// Uniform longitude.  Cyclic: one extra sample repeats the first plus a
/// full turn.
fn make_glon(len: usize, idiv: usize, flags: AxisFlags) -> Option<Axis> {
    let mlen = len * idiv + 1;
    let mut grid = vec![0.0; mlen];

    let (bnd0, bnd1) = if flags.signed {
        (-180.0, 180.0)
    } else {
        (0.0, 360.0)
    };
    uniform_bnd(&mut grid, bnd0, bnd1);

    if idiv > 1 {
        let offset = (1.0 - 1.0 / idiv as f64) * 180.0 / len as f64;
        for g in grid.iter_mut() {
            *g -= offset;
        }
    }
    if flags.mid {
        let delta = 180.0 / (len * idiv) as f64;
        for g in grid.iter_mut() {
            *g += delta;
        }
    }

    Some(Axis {
        range: (bnd0, bnd1),
        cyclic: true,
        title: Some("longitude".to_owned()),
        unit: Some("degree".to_owned()),
        ..Axis::bare(grid)
    })
}

/// Uniform latitude, north to south: boundary samples for odd lengths,
/// cell centers otherwise (and always for `M`).
fn make_glat(len: usize, idiv: usize, flags: AxisFlags) -> Option<Axis> {
    if idiv > 1 {
        return None;
    }
    let mut grid = vec![0.0; len];

    if !flags.mid && len % 2 == 1 && len > 2 {
        uniform_bnd(&mut grid, 90.0, -90.0);
    } else {
        uniform_center(&mut grid, 90.0, -90.0);
    }
    if flags.invert {
        invert(&mut grid);
    }

    Some(Axis {
        range: (-90.0, 90.0),
        cyclic: false,
        title: Some("latitude".to_owned()),
        unit: Some("degree".to_owned()),
        ..Axis::bare(grid)
    })
}

/// Gaussian latitude: the Legendre roots mapped to degrees, north to south
/// unless inverted; sub-division interpolates within quadrature cells.
fn make_ggla(len: usize, idiv: usize, flags: AxisFlags) -> Option<Axis> {
    if flags.mid {
        return None;
    }
    let mlen = len * idiv;
    let mut grid = vec![0.0; mlen];
    let mut wght = vec![0.0; len];

    gauss_legendre(&mut grid[..len], &mut wght);

    if idiv > 1 {
        latitude_mosaic(&mut grid, &wght, len, idiv);
    } else {
        for g in grid.iter_mut() {
            *g = 90.0 * (1.0 - g.acos() * TWO_OVER_PI);
        }
    }

    debug_assert!(grid[0] > -90.0 && grid[0] < 90.0);
    debug_assert!(grid[mlen - 1] > -90.0 && grid[mlen - 1] < 90.0);

    if !flags.invert {
        invert(&mut grid);
    }

    Some(Axis {
        range: (-90.0, 90.0),
        cyclic: false,
        title: Some("latitude".to_owned()),
        unit: Some("degree".to_owned()),
        ..Axis::bare(grid)
    })
}

/// The single-level surface marker.
fn make_sfc(len: usize, idiv: usize, flags: AxisFlags) -> Option<Axis> {
    if len != 1 || idiv != 1 || flags != AxisFlags::default() {
        return None;
    }
    Some(Axis::bare(vec![1.0]))
}

/// Plain integer numbering.
fn make_num(len: usize, idiv: usize, flags: AxisFlags) -> Option<Axis> {
    if idiv != 1 {
        return None;
    }
    let mut grid: Vec<f64> = (0..len).map(|i| i as f64).collect();
    if flags.mid {
        for g in grid.iter_mut() {
            *g += 0.5;
        }
    }
    let range = (grid[0], grid[len - 1]);
    if flags.invert {
        invert(&mut grid);
    }

    Some(Axis {
        range,
        ..Axis::bare(grid)
    })
}

type Builder = fn(usize, usize, AxisFlags) -> Option<Axis>;

const BUILTIN: [(&str, Builder); 6] = [
    ("GLON", make_glon),
    ("GLAT", make_glat),
    ("GGLA", make_ggla),
    ("SFC", make_sfc),
    ("NUMBER", make_num),
    ("", make_num),
];

// ── Axis-file lookup ──────────────────────────────────────────────────────────

fn candidate_paths(name: &str, kind: &str) -> Vec<PathBuf> {
    let file = format!("{kind}.{name}");
    let mut paths = Vec::new();

    match std::env::var(GTAX_PATH_ENV) {
        Ok(list) => {
            for dir in list.split(':').filter(|d| !d.is_empty()) {
                paths.push(PathBuf::from(dir).join(&file));
            }
        }
        Err(_) => {
            paths.push(PathBuf::from(&file));
            if let Ok(dir) = std::env::var(GTAXDIR_ENV) {
                paths.push(PathBuf::from(dir).join(&file));
            }
        }
    }
    paths.push(PathBuf::from(DEFAULT_AXIS_DIR).join(&file));
    paths
}

/// Open `GTAXLOC.name` or `GTAXWGT.name` through the search path.
fn open_axis_file(name: &str, kind: &str) -> Result<Gt3File> {
    for path in candidate_paths(name, kind) {
        if path.is_file() {
            return Gt3File::open(path);
        }
    }
    Err(record(Gt3Error::Sys {
        ctx: format!("{kind}.{name}"),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }))
}

// ── Public entry points ───────────────────────────────────────────────────────

impl Axis {
    /// Build an axis by name: a built-in generator when the name matches
    /// one, the axis file otherwise.
    pub fn from_name(name: &str) -> Result<Axis> {
        if let Some(p) = parse_axis_name(name) {
            for (base, build) in BUILTIN {
                if p.base == base {
                    if let Some(mut axis) = build(p.len, p.idiv, p.flags) {
                        axis.name = name.to_owned();
                        return Ok(axis);
                    }
                    break;
                }
            }
        }
        Axis::load(name)
    }

    /// Load an axis from its `GTAXLOC.*` file.
    pub fn load(name: &str) -> Result<Axis> {
        let mut fp = open_axis_file(name, "GTAXLOC")?;
        let head = fp.read_header()?;
        let mut var = Varbuf::new(&mut fp)?;
        var.read_z(&mut fp, 0)?;

        let dset = head.get_str("DSET")?;
        let cyclic = dset.starts_with('C');
        let miss = var.miss();

        let len = fp.dimensions()[0];
        let mut values = vec![0.0; len];
        var.copy_into_f64(&mut values, 0, 1);

        let dmin = head.get_double("DMIN").unwrap_or(miss);
        let dmax = head.get_double("DMAX").unwrap_or(miss);

        let title = head.get_str("TITLE").ok().filter(|s| !s.is_empty());
        let unit = head.get_str("UNIT").ok().filter(|s| !s.is_empty());

        Ok(Axis {
            name: name.to_owned(),
            values,
            range: (
                if dmin != miss { dmin } else { f64::NEG_INFINITY },
                if dmax != miss { dmax } else { f64::INFINITY },
            ),
            cyclic,
            title,
            unit,
        })
    }

    /// Length of the axis `name` without materializing built-in values.
    pub fn len_of(name: &str) -> Result<usize> {
        if let Some(p) = parse_axis_name(name) {
            match p.base.as_str() {
                "GLON" => return Ok(p.len * p.idiv + 1),
                "GLAT" | "GGLA" => return Ok(p.len * p.idiv),
                "SFC" | "NUMBER" | "" => return Ok(p.len),
                _ => {}
            }
        }
        let fp = open_axis_file(name, "GTAXLOC")?;
        Ok(fp.dimensions()[0])
    }
}

// ── Weights ───────────────────────────────────────────────────────────────────

fn weight_glon(len: usize, idiv: usize, _flags: AxisFlags) -> Option<Vec<f64>> {
    let len = len * idiv;
    if len == 0 {
        return None;
    }
    let mut w = vec![360.0 / len as f64; len + 1];
    w[len] = 0.0;
    Some(w)
}

fn weight_ggla(len: usize, idiv: usize, _flags: AxisFlags) -> Option<Vec<f64>> {
    let mut grid = vec![0.0; len];
    let mut wght = vec![0.0; len];
    gauss_legendre(&mut grid, &mut wght);

    let fact = 0.5 / idiv as f64;
    Some((0..len * idiv).map(|i| fact * wght[i / idiv]).collect())
}

/// Weights from latitude samples: half the cosine difference of the cell
/// boundary colatitudes, mirrored about the equator.  Sums to 1.
fn weight_latitude(lat: &[f64]) -> Vec<f64> {
    let len = lat.len();
    if len < 2 {
        return vec![1.0; len];
    }

    let len2 = (len + 1) / 2;
    let mut bnd = vec![0.0; len2 + 1];
    let fact = if lat[0] < lat[1] { -0.5 } else { 0.5 };
    for i in 1..=len2 {
        let b = fact * (lat[i - 1] + lat[i]);
        bnd[i] = PI / 180.0 * (90.0 - b);
    }

    let mut wght = vec![0.0; len];
    for i in 0..len2 {
        wght[i] = 0.5 * (bnd[i].cos() - bnd[i + 1].cos());
    }
    for i in len2..len {
        wght[i] = wght[len - 1 - i];
    }
    wght
}

fn weight_glat(len: usize, idiv: usize, flags: AxisFlags) -> Option<Vec<f64>> {
    let axis = make_glat(len, idiv, flags)?;
    Some(weight_latitude(&axis.values))
}

type WeightBuilder = fn(usize, usize, AxisFlags) -> Option<Vec<f64>>;

const BUILTIN_WEIGHTS: [(&str, WeightBuilder); 3] = [
    ("GLON", weight_glon),
    ("GLAT", weight_glat),
    ("GGLA", weight_ggla),
];

/// Integration weights of the axis `name`: generated for the built-in
/// bases, loaded from the `GTAXWGT.*` file otherwise.
pub fn axis_weight(name: &str) -> Result<Vec<f64>> {
    if let Some(p) = parse_axis_name(name) {
        for (base, build) in BUILTIN_WEIGHTS {
            if p.base == base {
                if let Some(w) = build(p.len, p.idiv, p.flags) {
                    return Ok(w);
                }
                break;
            }
        }
    }
    load_weight(name)
}

/// Load weights from a `GTAXWGT.*` file.
pub fn load_weight(name: &str) -> Result<Vec<f64>> {
    let mut fp = open_axis_file(name, "GTAXWGT")?;
    let mut var = Varbuf::new(&mut fp)?;
    var.read_z(&mut fp, 0)?;

    let mut w = vec![0.0; fp.dimensions()[0]];
    var.copy_into_f64(&mut w, 0, 1);
    Ok(w)
}

// ── Axis-file writers ─────────────────────────────────────────────────────────

/// Write `axis` as a one-chunk `GTAXLOC.*` container.
pub fn write_axis_file<W: Write>(w: &mut W, axis: &Axis, dfmt: Option<&str>) -> Result<()> {
    let mut head = Gt3Header::new();
    head.set_str("DSET", if axis.cyclic { "CAXLOC" } else { "AXLOC" })?;
    head.set_str("ITEM", &axis.name)?;
    head.set_str("AITM1", &axis.name)?;
    head.set_double("DMIN", axis.range.0)?;
    head.set_double("DMAX", axis.range.1)?;
    if let Some(title) = &axis.title {
        head.set_str("TITLE", title)?;
    }
    if let Some(unit) = &axis.unit {
        head.set_str("UNIT", unit)?;
    }

    write_chunk(
        w,
        DataRef::Double(&axis.values),
        axis.values.len(),
        1,
        1,
        &head,
        dfmt,
    )
}

/// Write `axis`'s weights as a one-chunk `GTAXWGT.*` container.
pub fn write_weight_file<W: Write>(w: &mut W, axis: &Axis, dfmt: Option<&str>) -> Result<()> {
    let wght = axis_weight(&axis.name)?;

    let mut head = Gt3Header::new();
    head.set_str("DSET", if axis.cyclic { "CAXWGT" } else { "AXWGT" })?;
    head.set_str("ITEM", &axis.name)?;
    head.set_str("AITM1", &axis.name)?;

    write_chunk(
        w,
        DataRef::Double(&wght),
        wght.len(),
        1,
        1,
        &head,
        dfmt,
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn parsed(name: &str) -> AxisName {
        parse_axis_name(name).unwrap()
    }

    #[test]
    fn name_parsing() {
        let p = parsed("GLON320");
        assert_eq!((p.base.as_str(), p.len, p.idiv), ("GLON", 320, 1));
        assert_eq!(p.flags, AxisFlags::default());

        let p = parsed("GLON320x2");
        assert_eq!((p.base.as_str(), p.len, p.idiv), ("GLON", 320, 2));

        let p = parsed("GGLA160Ix2");
        assert_eq!((p.base.as_str(), p.len, p.idiv), ("GGLA", 160, 2));
        assert!(p.flags.invert && !p.flags.mid);

        // flag order does not matter
        let p = parsed("GGLA160x2I");
        assert_eq!(p.idiv, 2);
        assert!(p.flags.invert);

        let p = parsed("GGLA160x2IM");
        assert!(p.flags.invert && p.flags.mid);

        let p = parsed("@EXTAX01");
        assert_eq!((p.base.as_str(), p.len), ("@EXTAX", 1));

        let p = parsed("");
        assert_eq!((p.base.as_str(), p.len, p.idiv), ("", 1, 1));

        assert!(parse_axis_name("GLAT45I-GISS").is_none());
    }

    #[test]
    fn glon_shapes() {
        let d = make_glon(1, 1, AxisFlags::default()).unwrap();
        assert_eq!(d.values, [0.0, 360.0]);
        assert!(d.cyclic);

        let d = make_glon(2, 1, AxisFlags::default()).unwrap();
        assert_eq!(d.values, [0.0, 180.0, 360.0]);

        let d = make_glon(320, 1, AxisFlags::default()).unwrap();
        assert_eq!(d.len(), 321);
        for (i, v) in d.values.iter().enumerate() {
            assert_eq!(*v, 1.125 * i as f64);
        }

        let d = make_glon(320, 4, AxisFlags::default()).unwrap();
        assert_eq!(d.len(), 320 * 4 + 1);
        assert!(near(d.values[0], -0.421875, 1e-10));

        let d = make_glon(
            144,
            1,
            AxisFlags {
                mid: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(d.len(), 145);
        assert!(near(d.values[0], 180.0 / 144.0, 1e-10));
    }

    #[test]
    fn glon_cyclic_wraps_by_a_full_turn() {
        for (len, idiv) in [(8usize, 1usize), (12, 3), (320, 2)] {
            let d = make_glon(len, idiv, AxisFlags::default()).unwrap();
            assert_eq!(d.len(), len * idiv + 1);
            assert!(near(d.values[len * idiv], d.values[0] + 360.0, 1e-9));
        }
    }

    #[test]
    fn glat_shapes() {
        let mid = AxisFlags {
            mid: true,
            ..Default::default()
        };

        let d = make_glat(1, 1, mid).unwrap();
        assert_eq!(d.values[0], 0.0);

        let d = make_glat(180, 1, mid).unwrap();
        assert_eq!(d.values[0], 89.5);

        let d = make_glat(
            180,
            1,
            AxisFlags {
                mid: true,
                invert: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(d.values[0], -89.5);

        let d = make_glat(181, 1, AxisFlags::default()).unwrap();
        assert_eq!(d.values[0], 90.0);
        assert_eq!(d.values[1], 89.0);

        assert!(make_glat(10, 2, AxisFlags::default()).is_none());
    }

    #[test]
    fn ggla_shapes() {
        let d = make_ggla(1, 1, AxisFlags::default()).unwrap();
        assert!(near(d.values[0], 0.0, 1e-10));

        // north to south by default
        let d = make_ggla(160, 1, AxisFlags::default()).unwrap();
        assert!(near(d.values[0], 89.1415194, 1e-6));

        let inv = AxisFlags {
            invert: true,
            ..Default::default()
        };
        let d = make_ggla(160, 1, inv).unwrap();
        assert!(near(d.values[0], -89.1415194, 1e-6));

        // sub-divided and inverted: 320 rows starting deep south
        let d = make_ggla(160, 2, inv).unwrap();
        assert_eq!(d.len(), 320);
        assert!(near(d.values[0], -89.6561821394, 1e-6));
    }

    #[test]
    fn other_builtins() {
        let d = Axis::from_name("SFC1").unwrap();
        assert_eq!(d.values, [1.0]);

        let d = Axis::from_name("NUMBER50").unwrap();
        assert_eq!(d.len(), 50);
        for (i, v) in d.values.iter().enumerate() {
            assert_eq!(*v, i as f64);
        }

        let d = Axis::from_name("").unwrap();
        assert_eq!(d.values, [0.0]);
    }

    #[test]
    fn builtin_lengths() {
        assert_eq!(Axis::len_of("GLON320").unwrap(), 321);
        assert_eq!(Axis::len_of("GGLA160x2").unwrap(), 320);
        assert_eq!(Axis::len_of("SFC1").unwrap(), 1);
    }

    #[test]
    fn weights() {
        let sum = |w: &[f64]| w.iter().sum::<f64>();

        let w = weight_glon(320, 1, AxisFlags::default()).unwrap();
        assert!(near(w[0], 360.0 / 320.0, 1e-10));
        assert_eq!(w[320], 0.0);

        let w = weight_ggla(2, 1, AxisFlags::default()).unwrap();
        assert!(near(w[0], 0.5, 1e-10));
        assert!(near(w[1], 0.5, 1e-10));

        for n in [3usize, 320, 321] {
            let w = weight_ggla(n, 1, AxisFlags::default()).unwrap();
            assert!(near(sum(&w), 1.0, 1e-10), "GGLA{n}");
        }

        let w = weight_ggla(160, 2, AxisFlags::default()).unwrap();
        assert!(near(sum(&w), 1.0, 1e-10));

        let w = weight_glat(2, 1, AxisFlags::default()).unwrap();
        assert!(near(w[0], 0.5, 1e-10));
        assert!(near(w[1], 0.5, 1e-10));

        for n in [3usize, 161] {
            let w = weight_glat(n, 1, AxisFlags::default()).unwrap();
            assert!(near(sum(&w), 1.0, 1e-10), "GLAT{n}");
        }

        let mid = AxisFlags {
            mid: true,
            ..Default::default()
        };
        let w = weight_glat(160, 1, mid).unwrap();
        assert!(near(sum(&w), 1.0, 1e-10));
    }
}
