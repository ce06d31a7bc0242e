//! Cache reads racing the remote config fetch.

use super::CacheStore;
use crate::archive::ArchiveBundle;
use crate::error::{LaunchError, TransientError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Version and archive reads running on their own threads.
///
/// Resolve it once the fresh version is known. A mismatch asks the archive
/// read to stop and detaches it; a read already inside blocking I/O finishes
/// anyway and its result is dropped.
pub struct CacheRace {
    version: JoinHandle<Option<i32>>,
    bundle: JoinHandle<Result<ArchiveBundle, LaunchError>>,
    cancel: Arc<AtomicBool>,
}

impl CacheRace {
    pub(super) fn spawn(store: CacheStore) -> io::Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));

        let version_store = store.clone();
        let version = thread::Builder::new()
            .name("cache-version".into())
            .spawn(move || version_store.read_version())?;

        let flag = Arc::clone(&cancel);
        let bundle = thread::Builder::new()
            .name("cache-archive".into())
            .spawn(move || {
                if flag.load(Ordering::Acquire) {
                    return Err(cancelled());
                }
                let bundle = store.read_bundle()?;
                if flag.load(Ordering::Acquire) {
                    return Err(cancelled());
                }
                Ok(bundle)
            })?;

        Ok(Self {
            version,
            bundle,
            cancel,
        })
    }

    /// The cached bundle if its version equals `expected` and it decoded;
    /// otherwise `None`, meaning fetch from the network.
    pub fn resolve(self, expected: i32) -> Option<ArchiveBundle> {
        let cached = match self.version.join() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("cache version reader panicked");
                None
            }
        };
        if cached != Some(expected) {
            tracing::info!(cached = ?cached, expected, "cache version mismatch, discarding cached read");
            self.cancel.store(true, Ordering::Release);
            return None;
        }
        match self.bundle.join() {
            Ok(Ok(bundle)) => {
                tracing::info!(version = expected, entries = bundle.len(), "using cached archive");
                Some(bundle)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "unable to load local cache");
                None
            }
            Err(_) => {
                tracing::warn!("cache archive reader panicked");
                None
            }
        }
    }

    /// Abandons both reads.
    pub fn cancel(self) {
        self.cancel.store(true, Ordering::Release);
    }
}

fn cancelled() -> LaunchError {
    TransientError::msg("read cached archive", "cancelled").into()
}
