//! Stream normalization: turns the bytes on the wire into canonical archive bytes.
//!
//! The response `Content-Encoding` picks one of three paths:
//! - none: pass-through
//! - `gzip`: inflate on the fly
//! - `pack200-gzip`: inflate, then transcode the packed stream back into a
//!   canonical archive on a background thread connected through a bounded pipe
//!
//! Progress is measured on the *encoded* input, so a percentage reflects how
//! much of the download has been consumed, not how much has been inflated.

mod progress;
pub mod pack;

use crate::error::ProtocolError;
use crate::progress::ProgressSink;
use flate2::read::GzDecoder;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

pub use progress::ProgressReader;

/// Value sent in `Accept-Encoding` when requesting the archive.
pub const ACCEPT_ENCODING: &str = "pack200-gzip";

/// Boxed byte stream handed between pipeline stages.
pub type ByteStream = Box<dyn Read + Send>;

/// Transfer encoding of an archive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    PackGzip,
}

impl Encoding {
    /// Parses a `Content-Encoding` header value. Absent or empty means identity.
    pub fn from_header(value: Option<&str>) -> Result<Self, ProtocolError> {
        let value = value.map(str::trim).unwrap_or("");
        if value.is_empty() {
            Ok(Encoding::Identity)
        } else if value.eq_ignore_ascii_case("gzip") {
            Ok(Encoding::Gzip)
        } else if value.eq_ignore_ascii_case("pack200-gzip") {
            Ok(Encoding::PackGzip)
        } else {
            Err(ProtocolError::UnsupportedEncoding(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::PackGzip => "pack200-gzip",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wraps `input` so that reading from the result yields canonical archive bytes.
///
/// `declared_len` is the encoded length (e.g. `Content-Length`); when it and
/// `sink` are both present, every read that consumes input reports
/// `100 * consumed / declared_len`.
pub fn decode(
    input: ByteStream,
    declared_len: Option<u64>,
    encoding: Encoding,
    sink: Option<Arc<dyn ProgressSink>>,
) -> io::Result<ByteStream> {
    let input: ByteStream = match sink {
        Some(sink) => Box::new(ProgressReader::new(input, declared_len, sink)),
        None => input,
    };

    match encoding {
        Encoding::Identity => Ok(input),
        Encoding::Gzip => Ok(Box::new(GzDecoder::new(input))),
        Encoding::PackGzip => {
            let reader = pack::spawn_transcoder(GzDecoder::new(input))?;
            Ok(Box::new(reader))
        }
    }
}
