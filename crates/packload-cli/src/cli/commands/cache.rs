//! `packload cache status|clear`.

use anyhow::Result;
use packload_core::cache::CacheStore;
use packload_core::config::LauncherConfig;
use serde_json::json;

pub fn run_cache_status(cfg: &LauncherConfig, json: bool) -> Result<()> {
    let store = CacheStore::new(cfg.cache_dir()?);
    let status = store.status()?;
    if json {
        let report = json!({
            "dir": status.dir.display().to_string(),
            "enabled": cfg.cache_archive,
            "version": status.version,
            "archive_len": status.archive_len,
            "archive_sha256": status.archive_sha256,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<10} {}", "DIR", status.dir.display());
    println!(
        "{:<10} {}",
        "ENABLED",
        if cfg.cache_archive { "yes" } else { "no" }
    );
    let version = status
        .version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{:<10} {}", "VERSION", version);
    match (status.archive_len, status.archive_sha256) {
        (Some(len), Some(sha)) => {
            println!("{:<10} {}", "SIZE", len);
            println!("{:<10} {}", "SHA256", sha);
        }
        _ => println!("{:<10} -", "ARCHIVE"),
    }
    Ok(())
}

pub fn run_cache_clear(cfg: &LauncherConfig) -> Result<()> {
    let store = CacheStore::new(cfg.cache_dir()?);
    if store.clear()? {
        tracing::info!("cleared archive cache at {}", store.dir().display());
        println!("Cleared {}", store.dir().display());
    } else {
        println!("Cache already empty.");
    }
    Ok(())
}
