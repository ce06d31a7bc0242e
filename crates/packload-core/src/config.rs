use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::trust::DEFAULT_PUBLISHER;

/// Default location of the remote launch configuration.
pub const DEFAULT_CONFIG_URL: &str = "http://oldschool.runescape.com/jav_config.ws";

/// Retry parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Trust and load failures tolerated in total; the last one is fatal.
    pub max_failures: u32,
    /// Countdown before retrying after a network or file error.
    pub transient_wait_secs: u64,
    /// Countdown before retrying after a trust or load error.
    pub trust_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            transient_wait_secs: 15,
            trust_wait_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn transient_wait(&self) -> Duration {
        Duration::from_secs(self.transient_wait_secs)
    }

    pub fn trust_wait(&self) -> Duration {
        Duration::from_secs(self.trust_wait_secs)
    }
}

/// Launcher configuration loaded from `~/.config/packload/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Keep the last network archive and reuse it while its version is current.
    pub cache_archive: bool,
    /// Preferred config endpoint; 0 uses `config_url` only.
    pub endpoint: u32,
    /// Default remote config URL.
    pub config_url: String,
    /// Preferred config URL; `{endpoint}` is replaced by `endpoint`.
    #[serde(default)]
    pub endpoint_url_template: Option<String>,
    /// Organization the archive signer must belong to.
    pub publisher: String,
    /// Also trust the operating system's root certificates.
    pub include_platform_anchors: bool,
    /// Extra trusted roots (`*.pem`). Defaults to `certificates/` under the config dir.
    #[serde(default)]
    pub certificate_dir: Option<PathBuf>,
    /// Archive cache directory. Defaults to the XDG cache dir.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            cache_archive: true,
            endpoint: 0,
            config_url: DEFAULT_CONFIG_URL.to_string(),
            endpoint_url_template: None,
            publisher: DEFAULT_PUBLISHER.to_string(),
            include_platform_anchors: false,
            certificate_dir: None,
            cache_dir: None,
            retry: None,
        }
    }
}

impl LauncherConfig {
    pub fn retry(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Configured certificate directory, or `$XDG_CONFIG_HOME/packload/certificates`.
    pub fn certificate_dir(&self) -> Result<PathBuf> {
        match &self.certificate_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("packload")?;
                Ok(xdg_dirs.get_config_home().join("packload").join("certificates"))
            }
        }
    }

    /// Configured cache directory, or `$XDG_CACHE_HOME/packload`.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::cache::CacheStore::default_dir(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("packload")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<LauncherConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = LauncherConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: LauncherConfig = toml::from_str(&data)?;
    Ok(cfg)
}
