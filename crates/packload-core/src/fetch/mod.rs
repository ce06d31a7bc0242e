//! HTTP GET over libcurl with a streamed body.
//!
//! The transfer runs on its own thread and feeds the body into a bounded
//! pipe, so the caller reads (and decodes) while bytes are still arriving.
//! The response head is handed over once the first body bytes arrive, or
//! when the transfer ends for an empty body.

mod parse;

use crate::decoder::{ByteStream, ACCEPT_ENCODING};
use crate::error::{LaunchError, TransientError};
use crate::pipe::{pipe, PipeReader, PipeWriter};
use std::cell::RefCell;
use std::io::{self, Read};
use std::str;
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

const BODY_PIPE_CAPACITY: usize = 16;

/// Status and the headers the pipeline cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    /// Abort when under 1 KiB/s for this long.
    pub stall_timeout: Duration,
    /// Sent verbatim as `Accept-Encoding`; the body is never decoded by curl.
    pub accept_encoding: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(60),
            accept_encoding: None,
        }
    }
}

/// A successful (2xx) response whose body is still streaming.
pub struct Response {
    pub url: String,
    pub head: ResponseHead,
    body: PipeReader,
}

impl Response {
    pub fn into_body(self) -> PipeReader {
        self.body
    }

    /// Reads the whole body as text (invalid UTF-8 is replaced).
    pub fn into_text(self) -> Result<String, LaunchError> {
        let url = self.url;
        let mut body = self.body;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)
            .map_err(|e| LaunchError::io(format!("read body of {}", url), e))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Starts a GET and waits for the response head.
///
/// Transport failures and non-2xx statuses are transient errors.
pub fn get(url: &str, options: &FetchOptions) -> Result<Response, LaunchError> {
    let (writer, body) = pipe(BODY_PIPE_CAPACITY);
    let (head_tx, head_rx) = mpsc::sync_channel(1);
    let thread_url = url.to_string();
    let thread_options = options.clone();
    thread::Builder::new()
        .name("http-fetch".into())
        .spawn(move || run_transfer(&thread_url, &thread_options, writer, head_tx))
        .map_err(|e| LaunchError::io("spawn fetch thread", e))?;

    let context = format!("GET {}", url);
    let head = match head_rx.recv() {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => return Err(LaunchError::io(context, e)),
        Err(_) => return Err(TransientError::msg(context, "transfer ended without a response").into()),
    };
    if !(200..300).contains(&head.status) {
        return Err(TransientError::msg(context, format!("HTTP {}", head.status)).into());
    }
    tracing::debug!(
        url,
        status = head.status,
        content_length = ?head.content_length,
        content_encoding = ?head.content_encoding,
        "response head"
    );
    Ok(Response {
        url: url.to_string(),
        head,
        body,
    })
}

type HeadSender = SyncSender<io::Result<ResponseHead>>;

fn run_transfer(url: &str, options: &FetchOptions, writer: PipeWriter, head_tx: HeadSender) {
    let head = RefCell::new(ResponseHead::default());
    let head_tx = RefCell::new(Some(head_tx));
    let announce = || {
        if let Some(tx) = head_tx.borrow_mut().take() {
            let _ = tx.send(Ok(head.borrow().clone()));
        }
    };

    match perform(url, options, &head, &announce, &writer) {
        Ok(()) => announce(),
        Err(e) => {
            if let Some(tx) = head_tx.borrow_mut().take() {
                let _ = tx.send(Err(e));
            } else if writer.is_closed() {
                tracing::debug!(url, "reader went away, transfer stopped");
            } else {
                tracing::warn!(url, "transfer failed mid-body: {}", e);
                writer.fail(e);
            }
        }
    }
}

fn perform(
    url: &str,
    options: &FetchOptions,
    head: &RefCell<ResponseHead>,
    announce: &dyn Fn(),
    writer: &PipeWriter,
) -> io::Result<()> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_io)?;
    easy.follow_location(true).map_err(curl_io)?;
    easy.max_redirections(10).map_err(curl_io)?;
    easy.connect_timeout(options.connect_timeout).map_err(curl_io)?;
    easy.low_speed_limit(1024).map_err(curl_io)?;
    easy.low_speed_time(options.stall_timeout).map_err(curl_io)?;

    if let Some(encoding) = &options.accept_encoding {
        let mut list = curl::easy::List::new();
        list.append(&format!("Accept-Encoding: {}", encoding))
            .map_err(curl_io)?;
        easy.http_headers(list).map_err(curl_io)?;
    }

    let mut transfer = easy.transfer();
    transfer
        .header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                parse::apply_header_line(&mut head.borrow_mut(), line);
            }
            true
        })
        .map_err(curl_io)?;
    transfer
        .write_function(|data| {
            announce();
            match writer.send(data.to_vec()) {
                Ok(()) => Ok(data.len()),
                Err(_) => Ok(0), // abort transfer
            }
        })
        .map_err(curl_io)?;
    transfer.perform().map_err(curl_io)
}

fn curl_io(e: curl::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// An archive response ready for decoding.
pub struct FetchedArchive {
    pub body: ByteStream,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

/// Where network archives come from.
pub trait ArchiveSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedArchive, LaunchError>;
}

/// Fetches archives over HTTP, advertising `pack200-gzip`.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    options: FetchOptions,
}

impl Default for HttpArchiveSource {
    fn default() -> Self {
        Self {
            options: FetchOptions {
                accept_encoding: Some(ACCEPT_ENCODING.to_string()),
                ..FetchOptions::default()
            },
        }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self, url: &str) -> Result<FetchedArchive, LaunchError> {
        tracing::info!(url, "fetching archive");
        let response = get(url, &self.options)?;
        let content_length = response.head.content_length;
        let content_encoding = response.head.content_encoding.clone();
        Ok(FetchedArchive {
            body: Box::new(response.into_body()),
            content_length,
            content_encoding,
        })
    }
}
