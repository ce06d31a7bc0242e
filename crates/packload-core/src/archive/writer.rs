//! Deterministic canonical archive writer.
//!
//! Every entry is deflated with fixed options and the zip epoch timestamp,
//! so writing the same entries in the same order yields identical bytes.
//!
//! The zip is written into a spool that keeps only the bytes the writer may
//! still patch. Starting an entry completes the previous one, so everything
//! before it is settled and can be taken with [`CanonicalWriter::take_settled`]
//! while the archive is still being built.

use std::cell::RefCell;
use std::io::{self, Seek, SeekFrom, Write};
use std::rc::Rc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

#[derive(Default)]
struct SpoolState {
    /// Archive offset of `buf[0]`.
    base: u64,
    buf: Vec<u8>,
    pos: u64,
}

/// Seekable sink over a window of the archive; the zip writer owns one
/// handle, [`CanonicalWriter`] keeps another to drain from the front.
#[derive(Clone, Default)]
struct Spool(Rc<RefCell<SpoolState>>);

impl Spool {
    fn end(&self) -> u64 {
        let s = self.0.borrow();
        s.base + s.buf.len() as u64
    }

    /// Removes and returns the buffered bytes below archive offset `offset`.
    fn take_below(&self, offset: u64) -> Vec<u8> {
        let mut s = self.0.borrow_mut();
        let n = offset.saturating_sub(s.base).min(s.buf.len() as u64) as usize;
        s.base += n as u64;
        s.buf.drain(..n).collect()
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut s = self.0.borrow_mut();
        let at = s
            .pos
            .checked_sub(s.base)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "write into taken archive bytes"))?
            as usize;
        let end = at + data.len();
        if s.buf.len() < end {
            s.buf.resize(end, 0);
        }
        s.buf[at..end].copy_from_slice(data);
        s.pos += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Spool {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        let mut s = self.0.borrow_mut();
        let end = s.base + s.buf.len() as u64;
        let target = match to {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => end.checked_add_signed(d),
            SeekFrom::Current(d) => s.pos.checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))?;
        s.pos = target;
        Ok(target)
    }
}

pub struct CanonicalWriter {
    zip: ZipWriter<Spool>,
    spool: Spool,
    /// Bytes below this offset will not be written again.
    settled: u64,
}

impl Default for CanonicalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalWriter {
    pub fn new() -> Self {
        let spool = Spool::default();
        Self {
            zip: ZipWriter::new(spool.clone()),
            spool,
            settled: 0,
        }
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644)
    }

    pub fn add_file(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let start = self.spool.end();
        self.zip
            .start_file(name, Self::options())
            .map_err(to_io)?;
        self.settled = start;
        self.zip.write_all(data)
    }

    /// Adds a directory entry; a trailing `/` is appended when missing.
    pub fn add_directory(&mut self, name: &str) -> io::Result<()> {
        let start = self.spool.end();
        self.zip
            .add_directory(name, Self::options().unix_permissions(0o755))
            .map_err(to_io)?;
        self.settled = start;
        Ok(())
    }

    /// Archive bytes that are final and were not taken before. Empty until
    /// the second entry has been started.
    pub fn take_settled(&mut self) -> Vec<u8> {
        self.spool.take_below(self.settled)
    }

    /// Writes the central directory and returns every byte not yet taken.
    /// Without earlier [`take_settled`](Self::take_settled) calls this is the
    /// whole archive.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        let spool = self.zip.finish().map_err(to_io)?;
        Ok(spool.take_below(u64::MAX))
    }
}

fn to_io(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}
