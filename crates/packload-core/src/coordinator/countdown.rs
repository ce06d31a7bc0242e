//! Retry countdown shown through the progress sink.

use crate::progress::ProgressSink;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Blocks the coordinator between countdown ticks.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Real sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Default)]
pub struct NoPause {
    pauses: Mutex<Vec<Duration>>,
}

impl NoPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Duration {
        self.pauses
            .lock()
            .map(|p| p.iter().sum())
            .unwrap_or_default()
    }
}

impl Pause for NoPause {
    fn pause(&self, duration: Duration) {
        if let Ok(mut p) = self.pauses.lock() {
            p.push(duration);
        }
    }
}

/// Emits `"<message> Retrying in N"` once per second, N counting down from
/// the whole seconds in `wait` to 1. Ticks are scheduled from the start time
/// so slow sinks do not stretch the wait.
pub fn countdown(sink: &dyn ProgressSink, pause: &dyn Pause, message: &str, wait: Duration) {
    let seconds = wait.as_secs();
    let start = Instant::now();
    for i in 0..seconds {
        sink.progress(0, &format!("{} Retrying in {}", message, seconds - i));
        let deadline = start + Duration::from_secs(i + 1);
        let now = Instant::now();
        if deadline > now {
            pause.pause(deadline - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;

    #[test]
    fn counts_down_to_one() {
        let sink = RecordingSink::new();
        let pause = NoPause::new();
        countdown(&sink, &pause, "Connection error.", Duration::from_secs(3));
        let messages: Vec<String> = sink.events().into_iter().map(|(_, m)| m).collect();
        assert_eq!(
            messages,
            vec![
                "Connection error. Retrying in 3",
                "Connection error. Retrying in 2",
                "Connection error. Retrying in 1",
            ]
        );
        assert!(sink.events().iter().all(|(p, _)| *p == 0));
        assert!(pause.total() <= Duration::from_secs(3));
    }

    #[test]
    fn zero_wait_is_silent() {
        let sink = RecordingSink::new();
        countdown(&sink, &NoPause::new(), "x", Duration::ZERO);
        assert!(sink.events().is_empty());
    }
}
