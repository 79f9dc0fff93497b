//! A virtually concatenated view over an ordered list of container files.
//!
//! Appending a file counts its chunks once and extends a prefix-sum index;
//! a chunk request is then routed to the owning file.  At most one
//! underlying file is open at a time: crossing a file boundary closes the
//! previous file and opens the next.

use std::path::{Path, PathBuf};

use crate::error::{out_of_range, Result};
use crate::file::{ChunkSeek, Gt3File};
use crate::header::Gt3Header;
use crate::varbuf::Varbuf;

/// An ordered list of files presented as one chunk-indexed stream.
pub struct VCatFile {
    paths: Vec<PathBuf>,
    /// `index[i]` is the global index of file `i`'s first chunk;
    /// `index[paths.len()]` is the total count.
    index: Vec<usize>,
    opened: Option<(usize, Gt3File)>,
}

impl Default for VCatFile {
    fn default() -> Self {
        Self::new()
    }
}

impl VCatFile {
    pub fn new() -> Self {
        VCatFile {
            paths: Vec::new(),
            index: vec![0],
            opened: None,
        }
    }

    /// Append one file, counting its chunks.
    pub fn append(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let count = Gt3File::count_chunks(path)?;
        let total = *self.index.last().expect("prefix sums are never empty");
        self.paths.push(path.to_path_buf());
        self.index.push(total + count);
        Ok(())
    }

    /// Number of files in the catalog.
    pub fn num_files(&self) -> usize {
        self.paths.len()
    }

    /// Total chunk count across all files.
    pub fn num_chunks(&self) -> usize {
        *self.index.last().expect("prefix sums are never empty")
    }

    /// Open (or reuse) the file owning global chunk `tpos` and position it
    /// at that chunk.
    pub fn select(&mut self, tpos: usize) -> Result<&mut Gt3File> {
        let which = match self.index.windows(2).position(|w| tpos >= w[0] && tpos < w[1]) {
            Some(i) => i,
            None => return Err(out_of_range(format!("chunk {tpos} of {}", self.num_chunks()))),
        };

        match &self.opened {
            Some((i, _)) if *i == which => {}
            _ => {
                // close the previous file before opening the next
                self.opened = None;
                let fp = Gt3File::open(&self.paths[which])?;
                self.opened = Some((which, fp));
            }
        }

        let base = self.index[which];
        let (_, fp) = self.opened.as_mut().expect("file opened above");
        fp.seek_chunk(ChunkSeek::Set((tpos - base) as i64))?;
        Ok(fp)
    }

    /// Header of global chunk `tpos`.
    pub fn read_header(&mut self, tpos: usize) -> Result<Gt3Header> {
        self.select(tpos)?.read_header()
    }

    /// Bind `var` to global chunk `tpos`.
    pub fn attach_varbuf(&mut self, var: &mut Varbuf, tpos: usize) -> Result<()> {
        let fp = self.select(tpos)?;
        var.attach(fp)
    }

    /// The currently open underlying file, if any.
    pub fn opened_file(&mut self) -> Option<&mut Gt3File> {
        self.opened.as_mut().map(|(_, fp)| fp)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_catalog_has_no_chunks() {
        let mut vf = VCatFile::new();
        assert_eq!(vf.num_chunks(), 0);
        assert_eq!(vf.num_files(), 0);
        assert!(vf.select(0).is_err());
    }
}
