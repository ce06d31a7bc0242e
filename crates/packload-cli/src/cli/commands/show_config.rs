//! `packload config` – show where the config lives and what it says.

use anyhow::Result;
use packload_core::config::{self, LauncherConfig};
use packload_core::logging;

pub fn run_config(cfg: &LauncherConfig) -> Result<()> {
    println!("config file:      {}", config::config_path()?.display());
    println!("cache dir:        {}", cfg.cache_dir()?.display());
    println!("certificate dir:  {}", cfg.certificate_dir()?.display());
    println!("log file:         {}", logging::log_path()?.display());
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}
