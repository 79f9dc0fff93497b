// End-to-end axis-file handling: write GTAXLOC/GTAXWGT containers, find
// them through GTAX_PATH, and load them back.
//
// Environment variables are process-wide, so everything that touches
// GTAX_PATH lives in a single test.

use std::fs::File;
use std::io::BufWriter;

use gt3::{axis_weight, write_axis_file, write_weight_file, Axis};
use tempfile::TempDir;

#[test]
fn axis_files_roundtrip_through_the_search_path() {
    let dir = TempDir::new().unwrap();

    // a hand-made pressure axis under a name no builtin generator matches
    let axis = Axis {
        name: "CSIG20".to_owned(),
        values: (0..20).map(|i| 1.0 - i as f64 / 20.0).collect(),
        range: (0.0, 1.0),
        cyclic: false,
        title: Some("sigma level".to_owned()),
        unit: Some("1".to_owned()),
    };

    let loc = dir.path().join("GTAXLOC.CSIG20");
    let mut w = BufWriter::new(File::create(&loc).unwrap());
    write_axis_file(&mut w, &axis, Some("UR8")).unwrap();
    drop(w);

    let wgt = dir.path().join("GTAXWGT.CSIG20");
    let mut w = BufWriter::new(File::create(&wgt).unwrap());
    // weights for a file-backed axis come from its own weight file, so
    // write explicit ones
    {
        use gt3::{write_chunk, DataRef, Gt3Header};
        let mut head = Gt3Header::new();
        head.set_str("DSET", "AXWGT").unwrap();
        head.set_str("ITEM", "CSIG20").unwrap();
        head.set_str("AITM1", "CSIG20").unwrap();
        let weights = vec![0.05f64; 20];
        write_chunk(&mut w, DataRef::Double(&weights), 20, 1, 1, &head, Some("UR8")).unwrap();
    }
    drop(w);

    std::env::set_var("GTAX_PATH", dir.path());

    // loads resolve through GTAX_PATH
    let loaded = Axis::from_name("CSIG20").unwrap();
    assert_eq!(loaded.len(), 20);
    assert_eq!(loaded.values, axis.values);
    assert_eq!(loaded.range, (0.0, 1.0));
    assert!(!loaded.cyclic);
    assert_eq!(loaded.title.as_deref(), Some("sigma level"));
    assert_eq!(loaded.unit.as_deref(), Some("1"));

    assert_eq!(Axis::len_of("CSIG20").unwrap(), 20);

    let weights = axis_weight("CSIG20").unwrap();
    assert_eq!(weights, vec![0.05f64; 20]);

    // a missing axis errors out even with the path set
    assert!(Axis::load("NOSUCH99").is_err());

    // built-in names never hit the filesystem
    let glon = Axis::from_name("GLON8").unwrap();
    assert_eq!(glon.len(), 9);
    assert!(glon.cyclic);

    std::env::remove_var("GTAX_PATH");
}

#[test]
fn cyclic_axes_are_marked_by_their_dataset_name() {
    let dir = TempDir::new().unwrap();

    let axis = Axis {
        name: "CIRC12".to_owned(),
        values: (0..13).map(|i| 30.0 * i as f64).collect(),
        range: (0.0, 360.0),
        cyclic: true,
        title: None,
        unit: Some("degree".to_owned()),
    };

    let loc = dir.path().join("GTAXLOC.CIRC12");
    let mut w = BufWriter::new(File::create(&loc).unwrap());
    write_axis_file(&mut w, &axis, Some("UR8")).unwrap();
    drop(w);

    // verify DSET directly rather than via the search path (GTAX_PATH is
    // exercised in the other test)
    let mut fp = gt3::Gt3File::open(&loc).unwrap();
    let head = fp.read_header().unwrap();
    assert_eq!(head.get_str("DSET").unwrap(), "CAXLOC");
    assert_eq!(head.get_str("AITM1").unwrap(), "CIRC12");
    assert_eq!(head.get_int("AEND1").unwrap(), 13);
}

#[test]
fn builtin_weight_files_roundtrip() {
    let dir = TempDir::new().unwrap();

    let axis = Axis::from_name("GGLA4").unwrap();
    let path = dir.path().join("GTAXWGT.GGLA4");
    let mut w = BufWriter::new(File::create(&path).unwrap());
    write_weight_file(&mut w, &axis, Some("UR8")).unwrap();
    drop(w);

    // read the container back directly and compare with the generator
    let mut fp = gt3::Gt3File::open(&path).unwrap();
    let mut var = gt3::Varbuf::new(&mut fp).unwrap();
    var.read_z(&mut fp, 0).unwrap();
    let mut stored = vec![0f64; 4];
    var.copy_into_f64(&mut stored, 0, 1);

    let generated = axis_weight("GGLA4").unwrap();
    assert_eq!(stored, generated);
    assert!((generated.iter().sum::<f64>() - 1.0).abs() < 1e-12);
}
