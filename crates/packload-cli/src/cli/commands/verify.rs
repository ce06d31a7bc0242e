//! `packload verify` – check the signatures of a local archive.

use anyhow::{Context, Result};
use packload_core::archive::ArchiveReader;
use packload_core::config::LauncherConfig;
use packload_core::trust::TrustStore;
use serde_json::json;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn run_verify(
    cfg: &LauncherConfig,
    path: &Path,
    publisher: Option<String>,
    json: bool,
) -> Result<()> {
    let publisher = publisher.unwrap_or_else(|| cfg.publisher.clone());
    let store = TrustStore::with_default_sources(
        publisher.clone(),
        Some(cfg.certificate_dir()?),
        cfg.include_platform_anchors,
    );
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let bundle = ArchiveReader::new()
        .verify_with(&store)
        .read(BufReader::new(file))
        .with_context(|| format!("verify {}", path.display()))?;

    let signer = bundle
        .entries
        .iter()
        .find_map(|e| e.chain.as_ref())
        .and_then(|chain| chain.first())
        .map(|c| c.subject());
    let units = bundle.code_units().count();

    if json {
        let report = json!({
            "path": path.display().to_string(),
            "publisher": publisher,
            "signer": signer,
            "entries": bundle.len(),
            "code_units": units,
            "anchors": store.anchors().len(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: OK", path.display());
        println!("  signer:     {}", signer.as_deref().unwrap_or("-"));
        println!("  entries:    {} ({} code units)", bundle.len(), units);
        println!("  anchors:    {}", store.anchors().len());
    }
    Ok(())
}
