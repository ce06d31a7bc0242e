//! Progress reporting to whatever is showing the loading screen.

use std::sync::Mutex;

/// Receives `(percent, message)` updates while the archive loads.
///
/// `percent` is in `[0, 100]`. Implementations must be cheap; decoding calls
/// this on every read.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: u8, message: &str);
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn progress(&self, _percent: u8, _message: &str) {}
}

/// Sink that forwards updates to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, percent: u8, message: &str) {
        tracing::debug!(percent, "{}", message);
    }
}

/// Sink that keeps every update; used by tests and by the CLI summary.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(u8, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(u8, String)> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, percent: u8, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((percent, message.to_string()));
        }
    }
}

/// Percentage of `done` out of `total`, clamped to 100. Zero when `total` is 0.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let p = done.saturating_mul(100) / total;
    p.min(100) as u8
}
