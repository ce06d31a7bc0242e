//! Bounded, blocking byte pipe between a producer thread and a reader.
//!
//! The writer blocks once `capacity` chunks are queued. Dropping the reader
//! closes the pipe: further sends fail with `BrokenPipe` and `is_closed`
//! turns true, which is how producers learn to stop.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

type Chunk = io::Result<Vec<u8>>;

/// Creates a pipe holding at most `capacity` in-flight chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));
    (
        PipeWriter {
            tx,
            closed: Arc::clone(&closed),
        },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            closed,
            finished: false,
        },
    )
}

/// Producer end. Cloneable so a header callback and a body callback can share it.
#[derive(Clone)]
pub struct PipeWriter {
    tx: SyncSender<Chunk>,
    closed: Arc<AtomicBool>,
}

impl PipeWriter {
    /// Queues `chunk`, blocking while the pipe is full.
    pub fn send(&self, chunk: Vec<u8>) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(broken());
        }
        self.tx.send(Ok(chunk)).map_err(|_| broken())
    }

    /// Delivers `err` to the reader in place of further data.
    pub fn fail(&self, err: io::Error) {
        let _ = self.tx.send(Err(err));
    }

    /// True once the reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf.to_vec())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumer end. End of stream is reached when every writer is dropped.
pub struct PipeReader {
    rx: Receiver<Chunk>,
    current: Vec<u8>,
    pos: usize,
    closed: Arc<AtomicBool>,
    finished: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(_) => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn broken() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")
}
