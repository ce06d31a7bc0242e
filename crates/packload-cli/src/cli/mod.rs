//! CLI for the packload launcher.

mod commands;
mod console;

use anyhow::Result;
use clap::{Parser, Subcommand};
use packload_core::config;
use std::path::Path;

use commands::{
    run_cache_clear, run_cache_status, run_config, run_launch, run_pack, run_verify,
    LaunchOverrides,
};

/// Top-level CLI for the packload launcher.
#[derive(Debug, Parser)]
#[command(name = "packload")]
#[command(about = "packload: fetch, verify and load a signed gamepack", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch the config, acquire and verify the archive, and instantiate the entry point.
    Launch {
        /// Ignore the local archive cache for this launch.
        #[arg(long)]
        no_cache: bool,
        /// Preferred config endpoint (0 = default config URL only).
        #[arg(long, value_name = "N")]
        endpoint: Option<u32>,
        /// Override the default remote config URL.
        #[arg(long, value_name = "URL")]
        config_url: Option<String>,
    },

    /// Show the config file path and effective settings.
    Config,

    /// Verify the signatures of a local archive against the trust store.
    Verify {
        /// Path to the archive.
        path: String,
        /// Organization the signer must belong to (defaults to the configured publisher).
        #[arg(long)]
        publisher: Option<String>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the local archive cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Convert an archive into its pack200-gzip wire form.
    Pack {
        /// Canonical archive to read.
        input: String,
        /// Where to write the packed, gzipped stream.
        output: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cached version, size and SHA-256.
    Status {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Remove the cached archive and version.
    Clear,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Launch {
                no_cache,
                endpoint,
                config_url,
            } => {
                let overrides = LaunchOverrides {
                    no_cache,
                    endpoint,
                    config_url,
                };
                run_launch(cfg, overrides).await?
            }
            CliCommand::Config => run_config(&cfg)?,
            CliCommand::Verify {
                path,
                publisher,
                json,
            } => run_verify(&cfg, Path::new(&path), publisher, json)?,
            CliCommand::Cache { action } => match action {
                CacheAction::Status { json } => run_cache_status(&cfg, json)?,
                CacheAction::Clear => run_cache_clear(&cfg)?,
            },
            CliCommand::Pack { input, output } => run_pack(Path::new(&input), Path::new(&output))?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
