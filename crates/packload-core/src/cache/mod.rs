//! Local archive cache.
//!
//! Two files in the cache directory:
//! - `gamepack.dat`: version identifier, 4-byte big-endian signed integer
//! - `gamepack.jar`: canonical archive bytes from the last network launch
//!
//! A cached archive is used without verification only when its version
//! equals the version the server currently advertises.

mod race;

pub use race::CacheRace;

use crate::archive::{ArchiveBundle, ArchiveReader};
use crate::checksum::sha256_path;
use crate::error::LaunchError;
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const ARCHIVE_FILE: &str = "gamepack.jar";
pub const VERSION_FILE: &str = "gamepack.dat";

/// Suffix of the archive while it is being written.
pub const TEMP_SUFFIX: &str = ".part";

/// What `status` reports about the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub dir: PathBuf,
    pub version: Option<i32>,
    pub archive_len: Option<u64>,
    pub archive_sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_CACHE_HOME/packload`.
    pub fn default_dir() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("packload")?;
        Ok(xdg_dirs.get_cache_home().join("packload"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    pub fn version_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE)
    }

    /// Stored version, or `None` when it cannot be read for any reason.
    pub fn read_version(&self) -> Option<i32> {
        let path = self.version_path();
        match fs::read(&path) {
            Ok(bytes) => match <[u8; 4]>::try_from(&bytes[..bytes.len().min(4)]) {
                Ok(be) => Some(i32::from_be_bytes(be)),
                Err(_) => {
                    tracing::debug!(len = bytes.len(), "cache version file too short");
                    None
                }
            },
            Err(e) => {
                tracing::debug!("no cached version at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Decodes the stored archive. No signatures are checked.
    pub fn read_bundle(&self) -> Result<ArchiveBundle, LaunchError> {
        let path = self.archive_path();
        let file = fs::File::open(&path)
            .map_err(|e| LaunchError::io(format!("open {}", path.display()), e))?;
        ArchiveReader::new().read(io::BufReader::new(file))
    }

    /// Persists a network-sourced archive under `version`.
    ///
    /// The version file is invalidated first and written last, so an
    /// interrupted write never pairs a new version with old bytes.
    pub fn write(&self, version: i32, raw: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;

        let version_path = self.version_path();
        match fs::remove_file(&version_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("invalidate {}", version_path.display()))
            }
        }

        let archive_path = self.archive_path();
        let temp = temp_path(&archive_path);
        {
            let mut f = fs::File::create(&temp)
                .with_context(|| format!("create {}", temp.display()))?;
            f.write_all(raw)
                .with_context(|| format!("write {}", temp.display()))?;
            f.sync_all().context("sync cached archive")?;
        }
        fs::rename(&temp, &archive_path).with_context(|| {
            format!("rename {} to {}", temp.display(), archive_path.display())
        })?;

        fs::write(&version_path, version.to_be_bytes())
            .with_context(|| format!("write {}", version_path.display()))?;
        tracing::info!(version, len = raw.len(), "archive cached");
        Ok(())
    }

    pub fn status(&self) -> Result<CacheStatus> {
        let archive = self.archive_path();
        let (archive_len, archive_sha256) = match fs::metadata(&archive) {
            Ok(meta) => (Some(meta.len()), Some(sha256_path(&archive)?)),
            Err(_) => (None, None),
        };
        Ok(CacheStatus {
            dir: self.dir.clone(),
            version: self.read_version(),
            archive_len,
            archive_sha256,
        })
    }

    /// Removes both cache files (and a stray temp file). Returns whether
    /// anything was removed.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        let archive = self.archive_path();
        for path in [self.version_path(), temp_path(&archive), archive] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("remove {}", path.display())),
            }
        }
        Ok(removed)
    }

    /// Starts reading the version and the archive on two worker threads.
    pub fn spawn_race(&self) -> io::Result<CacheRace> {
        CacheRace::spawn(self.clone())
    }
}

/// `gamepack.jar` → `gamepack.jar.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}
