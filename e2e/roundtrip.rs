// End-to-end write/read round-trips over every storage format.
//
// Each case writes a chunk to a scratch file, reopens it through the
// navigator, decodes it through a variable buffer, and checks the values
// against the format's accuracy contract: exact for the unpacked and masked
// word formats, half a quantum for URC, extent/(2^N - 2) for the bit-packed
// families.  Missing cells must come back as the missing sentinel exactly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gt3::fmt::ElemKind;
use gt3::{write_chunk, DataRef, Gt3File, Gt3Header, Varbuf};
use tempfile::TempDir;

const MISS: f64 = -999.0;

fn write_one(path: &Path, data: DataRef<'_>, dims: [usize; 3], dfmt: Option<&str>) {
    let mut head = Gt3Header::new();
    head.set_str("ITEM", "TEST").unwrap();
    let mut w = BufWriter::new(File::create(path).unwrap());
    write_chunk(&mut w, data, dims[0], dims[1], dims[2], &head, dfmt).unwrap();
    w.flush().unwrap();
}

fn read_all(path: &Path) -> (Vec<f64>, [usize; 3], ElemKind) {
    let mut fp = Gt3File::open(path).unwrap();
    let dims = fp.dimensions();
    let mut var = Varbuf::new(&mut fp).unwrap();

    let plane = dims[0] * dims[1];
    let mut out = vec![0.0; plane * dims[2]];
    for z in 0..dims[2] {
        var.read_z(&mut fp, z).unwrap();
        var.copy_into_f64(&mut out[z * plane..(z + 1) * plane], 0, 1);
    }
    (out, dims, var.elem_kind())
}

fn roundtrip_f64(data: &[f64], dims: [usize; 3], dfmt: &str) -> Vec<f64> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(data), dims, Some(dfmt));
    let (out, rdims, _) = read_all(&path);
    assert_eq!(rdims, dims);
    out
}

fn assert_within(got: &[f64], want: &[f64], tol: f64, what: &str) {
    assert_eq!(got.len(), want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        if *w == MISS {
            assert_eq!(*g, MISS, "{what}[{i}]: missing cell came back {g}");
        } else {
            assert!(
                (g - w).abs() <= tol,
                "{what}[{i}]: {g} vs {w} (tol {tol})"
            );
        }
    }
}

fn ramp(n: usize, lo: f64, hi: f64) -> Vec<f64> {
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect()
}

// ── Unpacked formats ──────────────────────────────────────────────────────────

#[test]
fn ur8_is_exact() {
    let data = [1.0, 2.0, 3.0, 4.0];
    let out = roundtrip_f64(&data, [2, 2, 1], "UR8");
    assert_eq!(out, data);
}

#[test]
fn ur4_is_exact_within_f32() {
    let data: Vec<f64> = [1.5, -2.25, 0.0, 3.0e10, -999.0, 7.125]
        .iter()
        .map(|&v| f64::from(v as f32))
        .collect();
    let out = roundtrip_f64(&data, [3, 2, 1], "UR4");
    assert_eq!(out, data);
}

#[test]
fn default_format_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&[9.0, 8.0]), [2, 1, 1], None);

    let mut fp = Gt3File::open(&path).unwrap();
    let head = fp.read_header().unwrap();
    assert_eq!(head.get_str("DFMT").unwrap(), "UR8");
    assert_eq!(head.get_int("SIZE").unwrap(), 2);
}

// ── Legacy block-quantized ────────────────────────────────────────────────────

#[test]
fn urc_roundtrip_within_half_quantum() {
    let n = 100;
    let data = ramp(n, -5.0, 5.0);
    let out = roundtrip_f64(&data, [10, 10, 1], "URC");
    // quantum is range/65533; allow half on either side plus f32 noise
    let tol = 10.0 / 65533.0;
    assert_within(&out, &data, tol, "URC");
}

#[test]
fn urc1_roundtrip_and_missing() {
    let mut data = ramp(64, 0.0, 1.0);
    data[10] = MISS;
    data[33] = MISS;
    let out = roundtrip_f64(&data, [8, 8, 1], "URC1");
    assert_within(&out, &data, 1.0 / 65000.0, "URC1");
}

#[test]
fn urc_writes_version2_string() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&ramp(4, 0.0, 1.0)), [2, 2, 1], Some("URC"));
    let mut fp = Gt3File::open(&path).unwrap();
    assert_eq!(fp.read_header().unwrap().get_str("DFMT").unwrap(), "URC2");

    write_one(&path, DataRef::Double(&ramp(4, 0.0, 1.0)), [2, 2, 1], Some("URC1"));
    let mut fp = Gt3File::open(&path).unwrap();
    assert_eq!(fp.read_header().unwrap().get_str("DFMT").unwrap(), "URC");
}

// ── Auto-scaled bit-packed ────────────────────────────────────────────────────

#[test]
fn urx12_error_bound_on_a_unit_ramp() {
    let n = 65536;
    let data = ramp(n, 0.0, 1.0);
    let out = roundtrip_f64(&data, [256, 256, 1], "URX12");
    let tol = 1.0 / f64::from((1u32 << 12) - 2);
    assert_within(&out, &data, tol, "URX12");
}

#[test]
fn urx_various_widths() {
    let mut data = ramp(300, -40.0, 85.0);
    data[7] = MISS;
    data[250] = MISS;

    for nbits in [2u32, 8, 12, 16, 24] {
        let name = format!("URX{nbits}");
        let out = roundtrip_f64(&data, [30, 10, 1], &name);
        let tol = 125.0 / f64::from((1u32 << nbits) - 2).max(1.0);
        assert_within(&out, &data, tol, &name);
    }
}

#[test]
fn urx_above_24_bits_decodes_into_doubles() {
    let data = ramp(128, 0.0, 1.0);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&data), [128, 1, 1], Some("URX26"));

    let (out, _, kind) = read_all(&path);
    assert_eq!(kind, ElemKind::Double);
    assert_within(&out, &data, 1.0 / f64::from((1u32 << 26) - 2), "URX26");
}

#[test]
fn urx_multi_plane_scaling_is_per_plane() {
    // plane 0 spans [0,1], plane 1 spans [0,1000]; per-plane scaling keeps
    // plane 0 accurate
    let mut data = ramp(64, 0.0, 1.0);
    data.extend(ramp(64, 0.0, 1000.0));
    let out = roundtrip_f64(&data, [8, 8, 2], "URX16");

    let tol0 = 1.0 / f64::from((1u32 << 16) - 2);
    let tol1 = 1000.0 / f64::from((1u32 << 16) - 2);
    assert_within(&out[..64], &data[..64], tol0, "URX16 plane0");
    assert_within(&out[64..], &data[64..], tol1, "URX16 plane1");
}

#[test]
fn ury_preserves_exact_zero() {
    // a range straddling zero with zero exactly on the grid: 255 samples
    // spanning [-32, 95] give a scale of exactly 0.5
    let data: Vec<f64> = (0..255).map(|i| (i as f64) * 0.5 - 32.0).collect();
    assert!(data.contains(&0.0));
    let out = roundtrip_f64(&data, [85, 3, 1], "URY8");

    let zero_pos = data.iter().position(|&v| v == 0.0).unwrap();
    assert_eq!(out[zero_pos], 0.0);
    let tol = (data[254] - data[0]) / f64::from((1u32 << 8) - 2);
    assert_within(&out, &data, tol, "URY8");
}

#[test]
fn constant_plane_roundtrips() {
    for dfmt in ["URX8", "URY8", "URC"] {
        let data = vec![42.5; 16];
        let out = roundtrip_f64(&data, [4, 4, 1], dfmt);
        assert_within(&out, &data, 1e-5, dfmt);
    }
}

#[test]
fn all_missing_plane_roundtrips() {
    for dfmt in ["URX8", "URY8", "MR4", "MRX8"] {
        let data = vec![MISS; 16];
        let out = roundtrip_f64(&data, [4, 4, 1], dfmt);
        assert_eq!(out, data, "{dfmt}");
    }
}

// ── Masked formats ────────────────────────────────────────────────────────────

fn checkerboard(n: usize, value: impl Fn(usize) -> f64) -> Vec<f64> {
    (0..n)
        .map(|i| if i % 3 == 1 { MISS } else { value(i) })
        .collect()
}

#[test]
fn mr8_masked_values_are_exact() {
    let data = checkerboard(60, |i| i as f64 * 0.25 - 3.0);
    let out = roundtrip_f64(&data, [5, 4, 3], "MR8");
    assert_eq!(out, data);
}

#[test]
fn mr4_masked_values_are_exact_within_f32() {
    let data: Vec<f64> = checkerboard(60, |i| i as f64 * 0.25)
        .iter()
        .map(|&v| f64::from(v as f32))
        .collect();
    let out = roundtrip_f64(&data, [6, 10, 1], "MR4");
    assert_eq!(out, data);
}

#[test]
fn mrx_and_mry_roundtrip() {
    let data = checkerboard(96, |i| (i as f64).sin() * 50.0);
    for dfmt in ["MRX10", "MRY10", "MRX16", "MRY16"] {
        let out = roundtrip_f64(&data, [8, 6, 2], dfmt);
        let tol = 100.0 / f64::from((1u32 << 10) - 2);
        assert_within(&out, &data, tol, dfmt);
    }
}

#[test]
fn mask_bitmap_population_matches() {
    // property: the on-disk population count equals the non-missing count
    let data = checkerboard(40, |i| i as f64);
    let nonmiss = data.iter().filter(|&&v| v != MISS).count() as u32;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&data), [8, 5, 1], Some("MR8"));

    let raw = std::fs::read(&path).unwrap();
    // body starts after the 1032-byte header frame; first record is the count
    let body = &raw[1032..];
    assert_eq!(&body[0..4], &4u32.to_be_bytes());
    assert_eq!(&body[4..8], &nonmiss.to_be_bytes());
}

// ── Row-level reads ───────────────────────────────────────────────────────────

#[test]
fn row_reads_match_plane_reads() {
    // a plane big enough that UR4 row reads take the fine-grained path
    let nx = 64;
    let ny = 32;
    let data = ramp(nx * ny, -1.0, 1.0);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&data), [nx, ny, 1], Some("UR4"));

    let mut fp = Gt3File::open(&path).unwrap();
    let mut var = Varbuf::new(&mut fp).unwrap();

    let mut row = vec![0f64; nx];
    for y in (0..ny).rev() {
        var.read_zy(&mut fp, 0, y).unwrap();
        var.copy_into_f64(&mut row, (y * nx) as isize, 1);
        for (x, v) in row.iter().enumerate() {
            assert_eq!(*v, f64::from(data[y * nx + x] as f32));
        }
    }
}

#[test]
fn point_reads() {
    let data = ramp(24, 0.0, 23.0);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.gt3");
    write_one(&path, DataRef::Double(&data), [4, 3, 2], Some("UR8"));

    let mut fp = Gt3File::open(&path).unwrap();
    let mut var = Varbuf::new(&mut fp).unwrap();
    assert_eq!(var.read_point(&mut fp, 0, 0, 0).unwrap(), 0.0);
    assert_eq!(var.read_point(&mut fp, 3, 2, 1).unwrap(), 23.0);
    assert_eq!(var.read_point(&mut fp, 1, 1, 1).unwrap(), 17.0);
    assert!(var.read_point(&mut fp, 4, 0, 0).is_err());
}
