//! The chunk navigator.
//!
//! A container file is an ordered sequence of chunks, each a framed header
//! followed by a format-dependent body.  There is no table of contents: the
//! navigator reads a chunk's header, predicts the chunk's byte size from it,
//! and reaches the next chunk by offset arithmetic.  Chunk sizes may vary
//! along the file; a file opened in uniform mode is validated to consist of
//! equally-sized chunks, which makes seeking O(1).
//!
//! For the masked formats the body size also depends on the data, so size
//! prediction peeks the body's leading count record (see
//! [`crate::fmt::Format::fixed_body_size`]).

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{bad_call, bad_header, broken, not_gt3, out_of_range, sys, Result};
use crate::fmt::{Family, Format, HEADER_FRAME};
use crate::header::{Gt3Header, HEADER_SIZE};
use crate::mask::DataMask;
use crate::pack::pack32_len;
use crate::record::{self, RECORD_MARK};

/// Target of a chunk-level seek.
#[derive(Debug, Clone, Copy)]
pub enum ChunkSeek {
    /// Absolute chunk index.
    Set(i64),
    /// Relative to the current chunk.
    Cur(i64),
    /// Relative to one-past-the-last chunk.
    End(i64),
}

/// An open container file positioned at one chunk.
pub struct Gt3File {
    path: PathBuf,
    pub(crate) pathname: String,
    pub(crate) f: BufReader<File>,
    uniform: bool,
    /// Current chunk index; equals the chunk count at end of file.
    pub(crate) curr: usize,
    pub(crate) fmt: Format,
    pub(crate) chsize: u64,
    pub(crate) dimlen: [usize; 3],
    num_chunks: Option<usize>,
    /// Byte offset of the current chunk.
    pub(crate) off: u64,
    size: u64,
    pub(crate) mask: Option<DataMask>,
}

/// Read one framed header block at the current position.  `Ok(None)` means
/// the bytes were readable but are not a header (bad marks or magic).
fn read_framed_header<R: Read>(r: &mut R) -> std::io::Result<Option<Gt3Header>> {
    let mut block = [0u8; HEADER_FRAME as usize];
    r.read_exact(&mut block)?;

    let mark = (HEADER_SIZE as u32).to_be_bytes();
    if block[..4] != mark || block[HEADER_FRAME as usize - 4..] != mark {
        return Ok(None);
    }
    if !Gt3Header::magic_matches(&block[4..]) {
        return Ok(None);
    }

    let mut h = [0u8; HEADER_SIZE];
    h.copy_from_slice(&block[4..4 + HEADER_SIZE]);
    Ok(Some(Gt3Header::from_bytes(h)))
}

impl Gt3File {
    // ── Opening ───────────────────────────────────────────────────────────

    /// Open a container file and position it at chunk 0.
    pub fn open(path: impl AsRef<Path>) -> Result<Gt3File> {
        let path = path.as_ref().to_path_buf();
        let pathname = path.display().to_string();

        let file = File::open(&path).map_err(|e| sys(&pathname, e))?;
        let size = file.metadata().map_err(|e| sys(&pathname, e))?.len();
        let mut f = BufReader::new(file);

        let head = match read_framed_header(&mut f) {
            Ok(Some(head)) => head,
            Ok(None) => return Err(not_gt3(pathname)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(not_gt3(pathname))
            }
            Err(e) => return Err(sys(&pathname, e)),
        };

        let mut fp = Gt3File {
            path,
            pathname,
            f,
            uniform: false,
            curr: 0,
            fmt: Format::UR4,
            chsize: 0,
            dimlen: [0; 3],
            num_chunks: None,
            off: 0,
            size,
            mask: None,
        };
        fp.enter_chunk(&head, 0)?;
        Ok(fp)
    }

    /// Open a file that must consist of equally-sized chunks.  The chunk
    /// count is known immediately and seeking becomes O(1).
    pub fn open_uniform(path: impl AsRef<Path>) -> Result<Gt3File> {
        let mut fp = Gt3File::open(path)?;
        if fp.size % fp.chsize != 0 {
            return Err(bad_call(format!("{}: not a uniform file", fp.pathname)));
        }
        fp.uniform = true;
        fp.num_chunks = Some((fp.size / fp.chsize) as usize);
        Ok(fp)
    }

    /// Count the chunks of a file by walking it once.
    pub fn count_chunks(path: impl AsRef<Path>) -> Result<usize> {
        let mut fp = Gt3File::open(path)?;
        while !fp.eof() {
            fp.next()?;
        }
        Ok(fp.curr)
    }

    // ── State derived from one header ─────────────────────────────────────

    fn dims_from_header(head: &Gt3Header) -> Result<[usize; 3]> {
        let mut dims = [0usize; 3];
        for (i, dim) in dims.iter_mut().enumerate() {
            let astr = head.get_int(&format!("ASTR{}", i + 1))?;
            let aend = head.get_int(&format!("AEND{}", i + 1))?;
            let n = i64::from(aend) - i64::from(astr) + 1;
            if n < 1 {
                return Err(bad_header(format!("invalid axis extent {astr}..{aend}")));
            }
            *dim = n as usize;
        }
        Ok(dims)
    }

    /// Body size of a masked chunk at `at`, completed by peeking the body's
    /// leading count record.
    fn masked_body_size(&mut self, fmt: Format, dims: [usize; 3], at: u64) -> Result<u64> {
        self.f
            .seek(SeekFrom::Start(at + HEADER_FRAME))
            .map_err(|e| sys(&self.pathname, e))?;
        let mut lead = [0u32; 1];
        record::read_words(&mut self.f, 0, &mut lead)?;
        let lead = u64::from(lead[0]);

        let [nx, ny, nz] = dims;
        let m = RECORD_MARK;
        let count_rec = 4 + 2 * m;

        let body = match fmt.family {
            Family::Mr4 | Family::Mr8 => {
                let esize = if fmt.family == Family::Mr4 { 4 } else { 8 };
                let mlen = pack32_len(nx * ny * nz, 1) as u64;
                count_rec + (4 * mlen + 2 * m) + (esize * lead + 2 * m)
            }
            Family::Mrx | Family::Mry => {
                let nz = nz as u64;
                let mlen = pack32_len(nx * ny, 1) as u64;
                count_rec
                    + 2 * (4 * nz + 2 * m)
                    + (16 * nz + 2 * m)
                    + (4 * mlen * nz + 2 * m)
                    + (4 * lead + 2 * m)
            }
            _ => unreachable!("fixed-size format"),
        };
        Ok(body)
    }

    /// Set format, dimensions, and predicted chunk size from the header of
    /// the chunk at byte offset `at`.  State is committed only when the
    /// whole header validates.
    fn enter_chunk(&mut self, head: &Gt3Header, at: u64) -> Result<()> {
        let dfmt = head.get_str("DFMT")?;
        let fmt =
            Format::parse(&dfmt).ok_or_else(|| bad_header(format!("unknown format: {dfmt}")))?;
        let dims = Self::dims_from_header(head)?;

        let body = match fmt.fixed_body_size(dims) {
            Some(body) => body,
            None => self.masked_body_size(fmt, dims, at)?,
        };

        self.fmt = fmt;
        self.dimlen = dims;
        self.chsize = HEADER_FRAME + body;
        Ok(())
    }

    // ── Navigation ────────────────────────────────────────────────────────

    /// Re-read and return the current chunk's header.
    pub fn read_header(&mut self) -> Result<Gt3Header> {
        self.f
            .seek(SeekFrom::Start(self.off))
            .map_err(|e| sys(&self.pathname, e))?;
        match read_framed_header(&mut self.f) {
            Ok(Some(head)) => Ok(head),
            Ok(None) => Err(broken(self.pathname.clone())),
            Err(e) => Err(crate::error::read_failure(e, &self.pathname)),
        }
    }

    /// Past the last chunk?
    pub fn eof(&self) -> bool {
        debug_assert!(self.off <= self.size);
        self.off == self.size
    }

    /// Advance to the next chunk.  At end of file this is a no-op; on a
    /// broken next chunk the position reverts to the current chunk so the
    /// caller can retry or close cleanly.
    pub fn next(&mut self) -> Result<()> {
        if self.eof() {
            return Ok(());
        }

        let nextoff = self.off + self.chsize;
        debug_assert!(nextoff <= self.size);

        let snapshot = (self.fmt, self.chsize, self.dimlen);
        let mut failure = None;

        if nextoff < self.size {
            self.f
                .seek(SeekFrom::Start(nextoff))
                .map_err(|e| sys(&self.pathname, e))?;
            match read_framed_header(&mut self.f) {
                Ok(Some(head)) => match self.enter_chunk(&head, nextoff) {
                    Ok(()) => {
                        if nextoff + self.chsize > self.size {
                            failure = Some(broken(format!("unexpected EOF ({})", self.pathname)));
                        }
                    }
                    Err(e) => failure = Some(e),
                },
                Ok(None) => failure = Some(broken(self.pathname.clone())),
                Err(e) => failure = Some(crate::error::read_failure(e, &self.pathname)),
            }
        }

        if let Some(e) = failure {
            (self.fmt, self.chsize, self.dimlen) = snapshot;
            self.seek_chunk(ChunkSeek::Cur(0))?;
            return Err(e);
        }

        self.curr += 1;
        self.off = nextoff;
        if self.eof() {
            self.num_chunks = Some(self.curr);
        }
        Ok(())
    }

    /// Back to chunk 0.
    pub fn rewind(&mut self) -> Result<()> {
        self.off = 0;
        self.curr = 0;
        let head = self.read_header()?;
        self.enter_chunk(&head, 0)
    }

    /// Seek to a chunk.  Uniform files seek in O(1); otherwise backward
    /// targets rewind and walk forward.  Seeking to one past the last chunk
    /// (the end-of-file position) is allowed.
    pub fn seek_chunk(&mut self, whence: ChunkSeek) -> Result<()> {
        let dest = match whence {
            ChunkSeek::Set(d) => d,
            ChunkSeek::Cur(d) => self.curr as i64 + d,
            ChunkSeek::End(d) => {
                if self.num_chunks.is_none() {
                    self.num_chunks = Some(Self::count_chunks(&self.path)?);
                }
                self.num_chunks.unwrap() as i64 + d
            }
        };

        if dest < 0 || self.num_chunks.is_some_and(|n| dest > n as i64) {
            return Err(out_of_range(format!("chunk {dest}")));
        }
        let dest = dest as usize;

        if self.uniform {
            self.off = dest as u64 * self.chsize;
            self.curr = dest;
            self.f
                .seek(SeekFrom::Start(self.off))
                .map_err(|e| sys(&self.pathname, e))?;
            return Ok(());
        }

        if dest < self.curr {
            self.rewind()?;
        }
        let mut remaining = dest - self.curr;
        while remaining > 0 && !self.eof() {
            self.next()?;
            remaining -= 1;
        }
        if remaining > 0 {
            return Err(out_of_range(format!("chunk {dest}")));
        }

        self.f
            .seek(SeekFrom::Start(self.off))
            .map_err(|e| sys(&self.pathname, e))?;
        Ok(())
    }

    /// Seek the underlying stream to the z-plane `z` of the current chunk
    /// and return its absolute byte offset.  Only formats with a
    /// closed-form per-plane layout can be addressed this way.
    pub fn skip_z(&mut self, z: usize) -> Result<u64> {
        if z >= self.dimlen[2] {
            return Err(out_of_range(format!("z-plane {z}")));
        }
        let rel = self.fmt.zslice_offset(self.dimlen, z).ok_or_else(|| {
            bad_call(format!(
                "{}: no per-plane offsets in a masked format",
                self.fmt
            ))
        })?;
        let off = self.off + rel;
        self.f
            .seek(SeekFrom::Start(off))
            .map_err(|e| sys(&self.pathname, e))?;
        Ok(off)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format of the current chunk.
    pub fn format(&self) -> Format {
        self.fmt
    }

    /// Dimensions of the current chunk.
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimlen
    }

    /// Index of the current chunk (equals the chunk count at end of file).
    pub fn chunk_index(&self) -> usize {
        self.curr
    }

    /// Byte size of the current chunk.
    pub fn chunk_size(&self) -> u64 {
        self.chsize
    }

    /// Total chunk count, once known (immediately for uniform files,
    /// otherwise after the end of file has been reached once).
    pub fn num_chunks(&self) -> Option<usize> {
        self.num_chunks
    }

    /// Was this file opened in uniform mode?
    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    pub fn file_size(&self) -> u64 {
        self.size
    }
}

impl std::fmt::Debug for Gt3File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gt3File")
            .field("path", &self.pathname)
            .field("curr", &self.curr)
            .field("fmt", &self.fmt)
            .field("dimlen", &self.dimlen)
            .finish()
    }
}
