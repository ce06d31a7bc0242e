//! Progress on the terminal.

use packload_core::progress::ProgressSink;
use std::io::Write;
use std::sync::Mutex;

/// Writes one stderr line per distinct progress message.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    last: Mutex<Option<(u8, String)>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleSink {
    fn progress(&self, percent: u8, message: &str) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if let Some((p, m)) = last.as_ref() {
            if *p == percent && m == message {
                return;
            }
        }
        *last = Some((percent, message.to_string()));
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "[{:>3}%] {}", percent, message);
    }
}
