//! Tracing setup for the launcher.
//!
//! Events are appended to `packload.log` under the XDG state dir; when that
//! file cannot be opened they go to stderr. The filter comes from
//! `PACKLOAD_LOG`, then `RUST_LOG`, then [`DEFAULT_FILTER`].

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Launcher-specific filter variable; wins over `RUST_LOG`.
pub const FILTER_ENV: &str = "PACKLOAD_LOG";
pub const DEFAULT_FILTER: &str = "info,packload=debug,packload_core=debug";

/// Where the installed subscriber writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTarget::File(path) => write!(f, "{}", path.display()),
            LogTarget::Stderr => f.write_str("stderr"),
        }
    }
}

/// First non-blank of the launcher variable and `RUST_LOG`, else the default.
pub fn filter_directives<'a>(own: Option<&'a str>, rust_log: Option<&'a str>) -> &'a str {
    [own, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_FILTER)
}

fn env_filter() -> EnvFilter {
    let own = env::var(FILTER_ENV).ok();
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(own.as_deref(), rust_log.as_deref());
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/packload/packload.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("packload")?;
    Ok(xdg_dirs.get_state_home().join("packload").join("packload.log"))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))
}

fn install<W>(writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
}

/// Installs the global subscriber, falling back to stderr when the log file
/// is unavailable. Call once, at startup.
pub fn init_logging() -> LogTarget {
    let opened = log_path().and_then(|path| open_append(&path).map(|file| (path, file)));
    match opened {
        Ok((path, file)) => {
            install(Mutex::new(file));
            tracing::info!(path = %path.display(), "packload logging initialized");
            LogTarget::File(path)
        }
        Err(err) => {
            install(io::stderr);
            tracing::warn!("file logging unavailable, using stderr: {:#}", err);
            LogTarget::Stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn launcher_variable_wins_over_rust_log() {
        assert_eq!(filter_directives(Some("trace"), Some("warn")), "trace");
        assert_eq!(filter_directives(None, Some("warn")), "warn");
        assert_eq!(filter_directives(Some("  "), Some("warn")), "warn");
        assert_eq!(filter_directives(None, None), DEFAULT_FILTER);
        assert_eq!(filter_directives(Some(""), Some("")), DEFAULT_FILTER);
    }

    #[test]
    fn default_filter_parses() {
        EnvFilter::try_new(DEFAULT_FILTER).unwrap();
    }

    #[test]
    fn log_file_is_appended_under_a_new_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/packload/packload.log");
        writeln!(open_append(&path).unwrap(), "first").unwrap();
        writeln!(open_append(&path).unwrap(), "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn target_names_its_destination() {
        assert_eq!(LogTarget::Stderr.to_string(), "stderr");
        let file = LogTarget::File(PathBuf::from("/tmp/packload.log"));
        assert_eq!(file.to_string(), "/tmp/packload.log");
    }
}
