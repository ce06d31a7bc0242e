//! `packload launch` – run the load coordinator to completion.

use anyhow::{Context, Result};
use packload_core::config::LauncherConfig;
use packload_core::loader::CodeSource;
use packload_core::progress::ProgressSink;
use packload_core::{Launched, LoadCoordinator, Origin};
use std::sync::Arc;

use crate::cli::console::ConsoleSink;

/// Command-line overrides applied on top of config.toml.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LaunchOverrides {
    pub no_cache: bool,
    pub endpoint: Option<u32>,
    pub config_url: Option<String>,
}

impl LaunchOverrides {
    pub fn apply(self, cfg: &mut LauncherConfig) {
        if self.no_cache {
            cfg.cache_archive = false;
        }
        if let Some(endpoint) = self.endpoint {
            cfg.endpoint = endpoint;
        }
        if let Some(url) = self.config_url {
            cfg.config_url = url;
        }
    }
}

pub async fn run_launch(mut cfg: LauncherConfig, overrides: LaunchOverrides) -> Result<()> {
    overrides.apply(&mut cfg);
    tracing::info!(
        config_url = %cfg.config_url,
        endpoint = cfg.endpoint,
        cache = cfg.cache_archive,
        "launch"
    );

    let sink: Arc<dyn ProgressSink> = Arc::new(ConsoleSink::new());
    let coordinator = LoadCoordinator::from_config(&cfg, sink)?;
    let result = tokio::task::spawn_blocking(move || coordinator.run())
        .await
        .context("launch task panicked")?;
    let launched = result.context("launch failed")?;
    print_summary(&launched);
    Ok(())
}

fn print_summary(launched: &Launched) {
    let origin = match launched.origin {
        Origin::Cache => "cache",
        Origin::Network => "network",
    };
    let entry = launched.program.entry();
    let signer = match &entry.code_source {
        CodeSource::Signed(chain) => chain
            .first()
            .map(|c| c.subject())
            .unwrap_or_else(|| "-".to_string()),
        CodeSource::Local => "local (cached)".to_string(),
    };
    println!(
        "Launched {} (version {}, from {}, attempt {}, {:.1}s)",
        entry.name,
        launched.version,
        origin,
        launched.attempt.attempts,
        launched.attempt.elapsed().as_secs_f64()
    );
    println!("  entry point:     {} bytes", entry.bytes.len());
    println!("  code source:     {}", signer);
    println!(
        "  units remaining: {}",
        launched.program.loader().remaining()
    );
}
