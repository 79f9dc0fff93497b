// End-to-end virtual catalog: several files presented as one chunk stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gt3::{write_chunk, DataRef, ErrorKind, Gt3File, Gt3Header, VCatFile, Varbuf};
use tempfile::TempDir;

fn write_file(path: &Path, bases: &[f64]) {
    let mut head = Gt3Header::new();
    head.set_str("ITEM", "CAT").unwrap();
    let mut w = BufWriter::new(File::create(path).unwrap());
    for base in bases {
        let data: Vec<f64> = (0..6).map(|i| base + i as f64).collect();
        write_chunk(&mut w, DataRef::Double(&data), 3, 2, 1, &head, Some("UR8")).unwrap();
    }
    w.flush().unwrap();
}

#[test]
fn chunks_concatenate_across_files() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.gt3");
    let b = dir.path().join("b.gt3");
    write_file(&a, &[0.0, 100.0]);
    write_file(&b, &[200.0, 300.0, 400.0]);

    let mut vf = VCatFile::new();
    vf.append(&a).unwrap();
    vf.append(&b).unwrap();

    assert_eq!(vf.num_files(), 2);
    assert_eq!(vf.num_chunks(), 5);

    // read every chunk's first value through one shared buffer
    let mut fp0 = Gt3File::open(&a).unwrap();
    let mut var = Varbuf::new(&mut fp0).unwrap();
    drop(fp0);

    for (t, want) in [(0usize, 0.0), (1, 100.0), (2, 200.0), (3, 300.0), (4, 400.0)] {
        vf.attach_varbuf(&mut var, t).unwrap();
        let fp = vf.opened_file().unwrap();
        var.read_z(fp, 0).unwrap();
        let mut v = [0.0];
        var.copy_into_f64(&mut v, 0, 1);
        assert_eq!(v[0], want, "chunk {t}");
    }

    // backward cross-file seek reopens the first file
    vf.attach_varbuf(&mut var, 0).unwrap();
    let fp = vf.opened_file().unwrap();
    assert_eq!(fp.chunk_index(), 0);
    var.read_z(fp, 0).unwrap();
    let mut v = [0.0];
    var.copy_into_f64(&mut v, 0, 1);
    assert_eq!(v[0], 0.0);
}

#[test]
fn headers_and_range_checks() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.gt3");
    let b = dir.path().join("b.gt3");
    write_file(&a, &[1.0]);
    write_file(&b, &[2.0]);

    let mut vf = VCatFile::new();
    vf.append(&a).unwrap();
    vf.append(&b).unwrap();

    let head = vf.read_header(1).unwrap();
    assert_eq!(head.get_str("ITEM").unwrap(), "CAT");

    let err = vf.read_header(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);

    // appending a non-container path fails and leaves the catalog intact
    let junk = dir.path().join("junk");
    std::fs::write(&junk, b"nope").unwrap();
    assert!(vf.append(&junk).is_err());
    assert_eq!(vf.num_files(), 2);
    assert_eq!(vf.num_chunks(), 2);
}
