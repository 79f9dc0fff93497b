// End-to-end chunk navigation: size prediction, seeking, uniform mode,
// heterogeneous files, and damage handling.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use gt3::fmt::HEADER_FRAME;
use gt3::{write_chunk, ChunkSeek, DataRef, ErrorKind, Gt3File, Gt3Header, Varbuf};
use tempfile::TempDir;

fn header() -> Gt3Header {
    let mut head = Gt3Header::new();
    head.set_str("ITEM", "NAV").unwrap();
    head
}

/// Write `chunks` one after another, returning each chunk's byte length.
fn write_file(path: &Path, chunks: &[(Vec<f64>, [usize; 3], &str)]) -> Vec<u64> {
    let mut w = BufWriter::new(File::create(path).unwrap());
    let mut sizes = Vec::new();
    let mut written = 0u64;
    for (data, dims, dfmt) in chunks {
        let mut buf = Vec::new();
        write_chunk(
            &mut buf,
            DataRef::Double(data),
            dims[0],
            dims[1],
            dims[2],
            &header(),
            Some(*dfmt),
        )
        .unwrap();
        w.write_all(&buf).unwrap();
        written += buf.len() as u64;
        sizes.push(buf.len() as u64);
    }
    w.flush().unwrap();
    drop(w);
    assert_eq!(std::fs::metadata(path).unwrap().len(), written);
    sizes
}

fn plane(n: usize, base: f64) -> Vec<f64> {
    (0..n).map(|i| base + i as f64).collect()
}

// ── Uniform files ─────────────────────────────────────────────────────────────

#[test]
fn three_chunk_history_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hist.gt3");
    let dims = [320, 160, 1];
    let n = 320 * 160;
    write_file(
        &path,
        &[
            (plane(n, 0.0), dims, "UR4"),
            (plane(n, 1.0), dims, "UR4"),
            (plane(n, 2.0), dims, "UR4"),
        ],
    );

    assert_eq!(Gt3File::count_chunks(&path).unwrap(), 3);

    let mut fp = Gt3File::open(&path).unwrap();
    assert_eq!(fp.chunk_index(), 0);
    assert_eq!(fp.dimensions(), dims);
    assert!(!fp.eof());

    fp.seek_chunk(ChunkSeek::Set(2)).unwrap();
    assert_eq!(fp.chunk_index(), 2);
    assert!(!fp.eof());

    fp.next().unwrap();
    assert_eq!(fp.chunk_index(), 3);
    assert!(fp.eof());
    assert_eq!(fp.num_chunks(), Some(3));

    // next at EOF stays put
    fp.next().unwrap();
    assert_eq!(fp.chunk_index(), 3);
}

#[test]
fn uniform_mode_seeks_directly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hist.gt3");
    let dims = [8, 4, 2];
    let n = 64;
    let sizes = write_file(
        &path,
        &[
            (plane(n, 0.0), dims, "UR8"),
            (plane(n, 100.0), dims, "UR8"),
            (plane(n, 200.0), dims, "UR8"),
            (plane(n, 300.0), dims, "UR8"),
        ],
    );
    assert!(sizes.windows(2).all(|w| w[0] == w[1]));

    let mut fp = Gt3File::open_uniform(&path).unwrap();
    assert!(fp.is_uniform());
    assert_eq!(fp.num_chunks(), Some(4));
    assert_eq!(fp.chunk_size(), sizes[0]);

    fp.seek_chunk(ChunkSeek::End(-1)).unwrap();
    assert_eq!(fp.chunk_index(), 3);
    let mut var = Varbuf::new(&mut fp).unwrap();
    var.read_z(&mut fp, 0).unwrap();
    let mut first = [0.0];
    var.copy_into_f64(&mut first, 0, 1);
    assert_eq!(first[0], 300.0);
}

// ── Size prediction ───────────────────────────────────────────────────────────

#[test]
fn predicted_sizes_match_written_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.gt3");
    let n = 12 * 5;
    let mut third = plane(n * 2, -7.0);
    third[3] = -999.0;
    third[40] = -999.0;
    let chunks: Vec<(Vec<f64>, [usize; 3], &str)> = vec![
        (plane(n, 0.0), [12, 5, 1], "UR4"),
        (plane(n * 3, 5.0), [12, 5, 3], "URX12"),
        (third.clone(), [12, 5, 2], "MRX8"),
        (third, [12, 5, 2], "MR8"),
        (plane(n, 9.0), [12, 5, 1], "URC"),
        (plane(n, 2.0), [12, 5, 1], "URY10"),
        (plane(n * 2, 1.0), [12, 5, 2], "MRY31"),
    ];
    let sizes = write_file(&path, &chunks);

    // navigating from first to last touches exactly the written byte ranges
    let mut fp = Gt3File::open(&path).unwrap();
    let mut offset = 0u64;
    for (i, size) in sizes.iter().enumerate() {
        assert_eq!(fp.chunk_index(), i);
        assert_eq!(fp.chunk_size(), *size, "chunk {i}");
        offset += size;
        fp.next().unwrap();
    }
    assert!(fp.eof());
    assert_eq!(offset, fp.file_size());
    assert_eq!(fp.num_chunks(), Some(sizes.len()));
}

#[test]
fn heterogeneous_file_rejects_uniform_mode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.gt3");
    write_file(
        &path,
        &[
            (plane(16 * 8 * 10, 0.0), [16, 8, 10], "UR4"),
            (plane(16 * 8 * 5, 0.0), [16, 8, 5], "URX8"),
        ],
    );

    let err = Gt3File::open_uniform(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Call);

    // the default mode navigates both
    assert_eq!(Gt3File::count_chunks(&path).unwrap(), 2);
    let mut fp = Gt3File::open(&path).unwrap();
    assert_eq!(fp.dimensions(), [16, 8, 10]);
    fp.next().unwrap();
    assert_eq!(fp.dimensions(), [16, 8, 5]);
}

// ── Seeking ───────────────────────────────────────────────────────────────────

#[test]
fn seek_whences_and_range_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("five.gt3");
    let dims = [4, 3, 1];
    let chunks: Vec<(Vec<f64>, [usize; 3], &str)> =
        (0..5).map(|i| (plane(12, i as f64), dims, "UR8")).collect();
    write_file(&path, &chunks);

    let mut fp = Gt3File::open(&path).unwrap();

    fp.seek_chunk(ChunkSeek::Set(3)).unwrap();
    assert_eq!(fp.chunk_index(), 3);

    fp.seek_chunk(ChunkSeek::Cur(-2)).unwrap();
    assert_eq!(fp.chunk_index(), 1);

    fp.seek_chunk(ChunkSeek::Cur(1)).unwrap();
    assert_eq!(fp.chunk_index(), 2);

    // from-end requires counting the chunks
    fp.seek_chunk(ChunkSeek::End(-5)).unwrap();
    assert_eq!(fp.chunk_index(), 0);
    assert_eq!(fp.num_chunks(), Some(5));

    // seeking to the end-of-file position is allowed
    fp.seek_chunk(ChunkSeek::End(0)).unwrap();
    assert_eq!(fp.chunk_index(), 5);
    assert!(fp.eof());

    let err = fp.seek_chunk(ChunkSeek::Set(-1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
    let err = fp.seek_chunk(ChunkSeek::Set(6)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);

    // rewind restores chunk 0
    fp.rewind().unwrap();
    assert_eq!(fp.chunk_index(), 0);
}

#[test]
fn skip_z_lands_on_the_plane_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("planes.gt3");
    let dims = [6, 5, 4];
    write_file(&path, &[(plane(6 * 5 * 4, 0.0), dims, "UR8")]);

    let mut fp = Gt3File::open(&path).unwrap();
    let off = fp.skip_z(2).unwrap();
    assert_eq!(off, HEADER_FRAME + 4 + 8 * (6 * 5) * 2);

    let err = fp.skip_z(4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
}

// ── Damage handling ───────────────────────────────────────────────────────────

#[test]
fn truncated_tail_reports_broken_and_reverts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trunc.gt3");
    let dims = [10, 10, 1];
    write_file(
        &path,
        &[
            (plane(100, 0.0), dims, "UR4"),
            (plane(100, 1.0), dims, "UR4"),
        ],
    );

    // chop off the last 10 bytes of the second chunk
    let full = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(full - 10)
        .unwrap();

    let mut fp = Gt3File::open(&path).unwrap();
    let err = fp.next().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Broken);

    // position reverted to the first chunk; its data is still readable
    assert_eq!(fp.chunk_index(), 0);
    let mut var = Varbuf::new(&mut fp).unwrap();
    var.read_z(&mut fp, 0).unwrap();
}

#[test]
fn garbage_is_not_a_container() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("junk.bin");
    std::fs::write(&path, b"this is not a container at all").unwrap();

    let err = Gt3File::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotGt3);
}

#[test]
fn corrupted_magic_is_not_a_container() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.gt3");
    write_file(&path, &[(plane(4, 0.0), [2, 2, 1], "UR4")]);

    let mut raw = std::fs::read(&path).unwrap();
    raw[4 + 15] = b'X'; // clobber the magic token
    std::fs::write(&path, &raw).unwrap();

    let err = Gt3File::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotGt3);
}

// ── Error stack ───────────────────────────────────────────────────────────────

#[test]
fn failures_land_on_the_error_stack() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("none.gt3");

    let before = gt3::error_count();
    let err = Gt3File::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sys);

    // recorded on the process-wide stack too (other threads may have
    // pushed in between, so only monotonicity is checked)
    assert!(gt3::error_count() > before);
    assert!(gt3::last_error().is_some());

    gt3::clear_last_error();
}
