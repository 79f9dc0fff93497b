//! The reusable decode buffer bound to one open chunk.
//!
//! A `Varbuf` holds one z-plane's worth of decoded values plus cache
//! bookkeeping: which chunk and plane are loaded and which y-rows within
//! the plane are valid (one extra bit stands for "entire plane loaded").
//! Reads that hit the cache return without touching the file.
//!
//! The buffer does not retain its file; every read takes the `Gt3File`
//! explicitly, and [`attach`](Varbuf::attach) rebinds a buffer to another
//! file reusing the allocation when the new plane fits.

use crate::bitset::BitSet;
use crate::codec::urc;
use crate::codec::urx::{self, Dequant};
use crate::codec::ury;
use crate::codec::{masked, unpacked};
use crate::error::{out_of_range, Result};
use crate::file::Gt3File;
use crate::fmt::{ElemKind, Family};
use crate::header::Gt3Header;

/// Decoded plane storage; the variant follows the chunk format's precision.
#[derive(Debug)]
pub enum VarData {
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// A decode buffer plus its cache state.
#[derive(Debug)]
pub struct Varbuf {
    data: VarData,
    dimlen: [usize; 3],
    miss: f64,
    head: Gt3Header,
    chunk: Option<usize>,
    z: Option<usize>,
    y: BitSet,
}

/// Plane element count padded to the 16-bit pair boundary the URC codec
/// reads in.
fn padded_plane(dims: [usize; 3]) -> usize {
    (dims[0] * dims[1] + 1) & !1
}

impl Varbuf {
    /// Allocate a buffer for the current chunk of `file`.
    pub fn new(file: &mut Gt3File) -> Result<Varbuf> {
        let mut var = Varbuf {
            data: VarData::Float(Vec::new()),
            dimlen: [0; 3],
            miss: -999.0,
            head: Gt3Header::new(),
            chunk: None,
            z: None,
            y: BitSet::new(),
        };
        var.update(file)?;
        Ok(var)
    }

    /// Rebind to (the current chunk of) `file`, reusing the allocation when
    /// possible.  All cache state is invalidated.
    pub fn attach(&mut self, file: &mut Gt3File) -> Result<()> {
        self.update(file)
    }

    fn update(&mut self, file: &mut Gt3File) -> Result<()> {
        let head = file.read_header()?;

        // a malformed MISS is recorded but not fatal
        let miss = head.get_double("MISS").unwrap_or(-999.0);

        let dims = file.dimensions();
        let want = padded_plane(dims);
        match (file.format().elem_kind(), &mut self.data) {
            (ElemKind::Float, VarData::Float(v)) => {
                if v.len() < want {
                    v.resize(want, 0.0);
                }
            }
            (ElemKind::Double, VarData::Double(v)) => {
                if v.len() < want {
                    v.resize(want, 0.0);
                }
            }
            (ElemKind::Float, data) => *data = VarData::Float(vec![0.0; want]),
            (ElemKind::Double, data) => *data = VarData::Double(vec![0.0; want]),
        }

        self.dimlen = dims;
        self.miss = miss;
        self.head = head;
        self.y.resize(dims[1] + 1);
        self.y.clear_all();
        self.chunk = Some(file.chunk_index());
        self.z = None;
        Ok(())
    }

    /// Follow the file to a different chunk if it moved since the last read.
    /// Uniform files keep their first chunk's shape, so no re-read is
    /// needed there.
    fn sync(&mut self, file: &mut Gt3File) -> Result<()> {
        if !file.is_uniform() && self.chunk != Some(file.chunk_index()) {
            self.update(file)?;
        }
        Ok(())
    }

    // ── Decoding ──────────────────────────────────────────────────────────

    fn decode(&mut self, file: &mut Gt3File, z: usize, skip: usize, nelem: usize) -> Result<()> {
        let off = file.off;
        let curr = file.curr;
        let dims = file.dimlen;
        let fmt = file.fmt;
        let miss = self.miss;

        let mut mask = file.mask.take().unwrap_or_default();
        let res = {
            let r = &mut file.f;
            let path = &file.pathname;
            match (fmt.family, &mut self.data) {
                (Family::Ur4, VarData::Float(buf)) => {
                    unpacked::read_plane(buf, r, off, dims, z, skip, nelem, path)
                }
                (Family::Ur8, VarData::Double(buf)) => {
                    unpacked::read_plane(buf, r, off, dims, z, skip, nelem, path)
                }
                (Family::Urc1, VarData::Float(buf)) => {
                    urc::read_plane(buf, r, off, dims, z, skip, nelem, miss, true, path)
                }
                (Family::Urc2, VarData::Float(buf)) => {
                    urc::read_plane(buf, r, off, dims, z, skip, nelem, miss, false, path)
                }
                (Family::Urx, VarData::Float(buf)) => {
                    urx::read_plane(buf, r, off, dims, fmt.nbits, z, miss, Dequant::Linear, path)
                }
                (Family::Urx, VarData::Double(buf)) => {
                    urx::read_plane(buf, r, off, dims, fmt.nbits, z, miss, Dequant::Linear, path)
                }
                (Family::Ury, VarData::Float(buf)) => {
                    ury::read_plane(buf, r, off, dims, fmt.nbits, z, miss, path)
                }
                (Family::Ury, VarData::Double(buf)) => {
                    ury::read_plane(buf, r, off, dims, fmt.nbits, z, miss, path)
                }
                (Family::Mr4, VarData::Float(buf)) => masked::read_plane(
                    buf, r, off, curr, dims, z, skip, nelem, miss, &mut mask, path,
                ),
                (Family::Mr8, VarData::Double(buf)) => masked::read_plane(
                    buf, r, off, curr, dims, z, skip, nelem, miss, &mut mask, path,
                ),
                (Family::Mrx, VarData::Float(buf)) => urx::read_masked_plane(
                    buf,
                    r,
                    off,
                    curr,
                    dims,
                    fmt.nbits,
                    z,
                    miss,
                    &mut mask,
                    Dequant::Linear,
                    path,
                ),
                (Family::Mrx, VarData::Double(buf)) => urx::read_masked_plane(
                    buf,
                    r,
                    off,
                    curr,
                    dims,
                    fmt.nbits,
                    z,
                    miss,
                    &mut mask,
                    Dequant::Linear,
                    path,
                ),
                (Family::Mry, VarData::Float(buf)) => ury::read_masked_plane(
                    buf, r, off, curr, dims, fmt.nbits, z, miss, &mut mask, path,
                ),
                (Family::Mry, VarData::Double(buf)) => ury::read_masked_plane(
                    buf, r, off, curr, dims, fmt.nbits, z, miss, &mut mask, path,
                ),
                _ => Err(crate::error::bad_call(
                    "buffer type does not match the chunk format",
                )),
            }
        };
        file.mask = Some(mask);
        res
    }

    /// Decode the z-plane `z`, or return immediately when it is already
    /// resident.
    pub fn read_z(&mut self, file: &mut Gt3File, z: usize) -> Result<()> {
        self.sync(file)?;
        if z >= self.dimlen[2] {
            return Err(out_of_range(format!("z-plane {z}")));
        }

        let ny = self.dimlen[1];
        if self.chunk == Some(file.chunk_index()) && self.z == Some(z) && self.y.test(ny) {
            return Ok(());
        }

        let plane = self.dimlen[0] * self.dimlen[1];
        if let Err(e) = self.decode(file, z, 0, plane) {
            self.z = None;
            return Err(e);
        }

        self.chunk = Some(file.chunk_index());
        self.z = Some(z);
        self.y.set(ny);
        Ok(())
    }

    /// Decode a single y-row; formats without an efficient row read (and
    /// small planes) fall back to the whole plane.
    pub fn read_zy(&mut self, file: &mut Gt3File, z: usize, ypos: usize) -> Result<()> {
        self.sync(file)?;
        if z >= self.dimlen[2] || ypos >= self.dimlen[1] {
            return Err(out_of_range(format!("plane ({ypos}, {z})")));
        }

        let row_capable = matches!(
            file.format().family,
            Family::Ur4 | Family::Urc2 | Family::Urc1 | Family::Ur8 | Family::Mr4 | Family::Mr8
        );
        let (nx, ny) = (self.dimlen[0], self.dimlen[1]);
        if !row_capable || nx * ny < 1024 {
            return self.read_z(file, z);
        }

        if self.chunk == Some(file.chunk_index())
            && self.z == Some(z)
            && (self.y.test(ypos) || self.y.test(ny))
        {
            return Ok(());
        }

        if let Err(e) = self.decode(file, z, ypos * nx, nx) {
            self.z = None;
            return Err(e);
        }

        if self.z != Some(z) || self.chunk != Some(file.chunk_index()) {
            self.y.clear_all();
        }
        self.chunk = Some(file.chunk_index());
        self.z = Some(z);
        self.y.set(ypos);
        Ok(())
    }

    /// Read one grid value, decoding its row if needed.
    pub fn read_point(&mut self, file: &mut Gt3File, x: usize, y: usize, z: usize) -> Result<f64> {
        self.read_zy(file, z, y)?;
        if x >= self.dimlen[0] {
            return Err(out_of_range(format!("x={x}")));
        }
        let idx = x + self.dimlen[0] * y;
        Ok(match &self.data {
            VarData::Float(v) => f64::from(v[idx]),
            VarData::Double(v) => v[idx],
        })
    }

    // ── Copy-out ──────────────────────────────────────────────────────────

    /// Copy currently resident values into `out`, starting at element
    /// `begin` of the plane and stepping by `step` (negative steps walk
    /// backwards).  Returns the number of elements copied.  The buffer
    /// contents are whatever the last read left; this performs no I/O.
    pub fn copy_into_f64(&self, out: &mut [f64], begin: isize, step: isize) -> usize {
        self.copy_with(out, begin, step, |data, idx| match data {
            VarData::Float(v) => f64::from(v[idx]),
            VarData::Double(v) => v[idx],
        })
    }

    /// [`copy_into_f64`](Self::copy_into_f64) narrowing to `f32`.
    pub fn copy_into_f32(&self, out: &mut [f32], begin: isize, step: isize) -> usize {
        self.copy_with(out, begin, step, |data, idx| match data {
            VarData::Float(v) => v[idx],
            VarData::Double(v) => v[idx] as f32,
        })
    }

    fn copy_with<T>(
        &self,
        out: &mut [T],
        mut begin: isize,
        step: isize,
        fetch: impl Fn(&VarData, usize) -> T,
    ) -> usize {
        let maxlen = (self.dimlen[0] * self.dimlen[1]) as isize;
        let buflen = out.len();

        let nelem = if step > 0 {
            begin = begin.clamp(0, maxlen);
            ((maxlen - begin + step - 1) / step) as usize
        } else if step < 0 {
            begin = begin.clamp(-1, maxlen - 1);
            ((-1 - begin + step + 1) / step) as usize
        } else if begin < 0 || begin >= maxlen {
            0
        } else {
            buflen
        };
        let nelem = nelem.min(buflen);

        for (i, o) in out[..nelem].iter_mut().enumerate() {
            let idx = begin + i as isize * step;
            debug_assert!((0..maxlen).contains(&idx));
            *o = fetch(&self.data, idx as usize);
        }
        nelem
    }

    // ── Attributes ────────────────────────────────────────────────────────

    /// Text attribute from the cached header.
    pub fn attr_str(&self, key: &str) -> Result<String> {
        self.head.get_str(key)
    }

    pub fn attr_int(&self, key: &str) -> Result<i32> {
        self.head.get_int(key)
    }

    pub fn attr_double(&self, key: &str) -> Result<f64> {
        self.head.get_double(key)
    }

    /// The cached header of the bound chunk.
    pub fn header(&self) -> &Gt3Header {
        &self.head
    }

    pub fn miss(&self) -> f64 {
        self.miss
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.dimlen
    }

    pub fn elem_kind(&self) -> ElemKind {
        match self.data {
            VarData::Float(_) => ElemKind::Float,
            VarData::Double(_) => ElemKind::Double,
        }
    }

    /// The raw decoded storage.
    pub fn data(&self) -> &VarData {
        &self.data
    }
}
