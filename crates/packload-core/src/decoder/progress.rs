//! Reader adapter that reports how much of the encoded input has been consumed.

use crate::progress::{percent, ProgressSink};
use std::io::{self, Read};
use std::sync::Arc;

/// Counts bytes read from `inner` and reports a percentage of `total`.
pub struct ProgressReader<R> {
    inner: R,
    read: u64,
    total: Option<u64>,
    sink: Arc<dyn ProgressSink>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: Option<u64>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner,
            read: 0,
            total,
            sink,
        }
    }

    /// Bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.read += n as u64;
            if let Some(total) = self.total.filter(|t| *t > 0) {
                let p = percent(self.read, total);
                self.sink
                    .progress(p, &format!("Loading application - {}%", p));
            }
        }
        Ok(n)
    }
}
