//! Packed archive encoding and the background transcoder.
//!
//! A packed stream stores entries back to back without per-entry
//! compression so that the outer gzip layer compresses across files:
//!
//! ```text
//! magic  "PCK\x01"
//! record tag:u8 (1 = file, 2 = directory, 0 = end)
//!        name_len:u16 BE, name (UTF-8)
//!        file only: len:u32 BE, bytes
//! ```
//!
//! Transcoding writes the entries, in order, into a canonical archive and
//! hands out each finished entry as soon as the next record starts.

use crate::archive::CanonicalWriter;
use crate::pipe::{pipe, PipeReader};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Cursor, Read, Write};
use std::thread;

pub const MAGIC: &[u8; 4] = b"PCK\x01";

const TAG_END: u8 = 0;
const TAG_FILE: u8 = 1;
const TAG_DIR: u8 = 2;

/// Chunks queued between the transcoder and the archive reader.
const PIPE_CAPACITY: usize = 8;
const CHUNK_SIZE: usize = 64 * 1024;

/// Packs a canonical (zip) archive. Entry order is preserved.
pub fn encode(archive: &[u8]) -> io::Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(invalid)?;
    let mut out = Vec::with_capacity(archive.len());
    out.extend_from_slice(MAGIC);
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(invalid)?;
        let name = file.name().to_string();
        let name_len = u16::try_from(name.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry name too long"))?;
        if file.is_dir() {
            out.push(TAG_DIR);
            out.extend_from_slice(&name_len.to_be_bytes());
            out.extend_from_slice(name.as_bytes());
        } else {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            let len = u32::try_from(data.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry too large"))?;
            out.push(TAG_FILE);
            out.extend_from_slice(&name_len.to_be_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&data);
        }
    }
    out.push(TAG_END);
    Ok(out)
}

/// Packs `archive` and gzips the result: the `pack200-gzip` wire form.
pub fn encode_gzip(archive: &[u8]) -> io::Result<Vec<u8>> {
    let packed = encode(archive)?;
    let mut gz = GzEncoder::new(Vec::with_capacity(packed.len() / 2), Compression::best());
    gz.write_all(&packed)?;
    gz.finish()
}

/// Reads a packed stream from `input` and returns the canonical archive.
///
/// `cancelled` is polled between records; when it returns true the
/// transcode stops early with an error.
pub fn unpack<R: Read>(input: &mut R, cancelled: impl Fn() -> bool) -> io::Result<Vec<u8>> {
    let mut archive = Vec::new();
    transcode(input, cancelled, |bytes| {
        archive.extend_from_slice(&bytes);
        Ok(())
    })?;
    Ok(archive)
}

/// Like [`unpack`], but passes canonical bytes to `emit` record by record.
/// An `emit` error stops the transcode.
fn transcode<R: Read>(
    input: &mut R,
    cancelled: impl Fn() -> bool,
    mut emit: impl FnMut(Vec<u8>) -> io::Result<()>,
) -> io::Result<()> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a packed archive stream",
        ));
    }

    let mut writer = CanonicalWriter::new();
    loop {
        if cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "transcode cancelled"));
        }
        let mut tag = [0u8; 1];
        input.read_exact(&mut tag)?;
        match tag[0] {
            TAG_END => break,
            TAG_FILE => {
                let name = read_name(input)?;
                let mut len = [0u8; 4];
                input.read_exact(&mut len)?;
                let len = u32::from_be_bytes(len) as u64;
                let mut data = Vec::new();
                input.take(len).read_to_end(&mut data)?;
                if data.len() as u64 != len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("packed entry {} truncated", name),
                    ));
                }
                writer.add_file(&name, &data)?;
            }
            TAG_DIR => {
                let name = read_name(input)?;
                writer.add_directory(&name)?;
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown packed record tag {}", other),
                ))
            }
        }
        let settled = writer.take_settled();
        if !settled.is_empty() {
            emit(settled)?;
        }
    }
    emit(writer.finish()?)
}

fn read_name<R: Read>(input: &mut R) -> io::Result<String> {
    let mut len = [0u8; 2];
    input.read_exact(&mut len)?;
    let mut name = vec![0u8; u16::from_be_bytes(len) as usize];
    input.read_exact(&mut name)?;
    String::from_utf8(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "entry name is not UTF-8"))
}

/// Starts a background transcoder that consumes `upstream` and returns the
/// read end of a bounded pipe carrying the canonical archive.
///
/// Dropping the returned reader stops the thread at its next record or chunk
/// boundary; `upstream` is dropped when the thread exits.
pub(crate) fn spawn_transcoder<R>(upstream: R) -> io::Result<PipeReader>
where
    R: Read + Send + 'static,
{
    let (mut writer, reader) = pipe(PIPE_CAPACITY);
    thread::Builder::new()
        .name("pack-transcode".into())
        .spawn(move || {
            let mut upstream = upstream;
            let watcher = writer.clone();
            let sent = transcode(
                &mut upstream,
                || watcher.is_closed(),
                |bytes| {
                    for chunk in bytes.chunks(CHUNK_SIZE) {
                        writer.write_all(chunk)?;
                    }
                    Ok(())
                },
            );
            match sent {
                Ok(()) => {}
                Err(_) if writer.is_closed() => {
                    tracing::debug!("archive reader closed, stopping transcode");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pack transcode failed");
                    writer.fail(e);
                }
            }
        })?;
    Ok(reader)
}

fn invalid(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}
