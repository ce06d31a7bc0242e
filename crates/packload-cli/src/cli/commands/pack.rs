//! `packload pack` – produce the pack200-gzip form of an archive.

use anyhow::{Context, Result};
use packload_core::checksum;
use packload_core::decoder::pack;
use std::fs;
use std::path::Path;

pub fn run_pack(input: &Path, output: &Path) -> Result<()> {
    let archive = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let wire = pack::encode_gzip(&archive)
        .with_context(|| format!("pack {}", input.display()))?;
    fs::write(output, &wire).with_context(|| format!("write {}", output.display()))?;
    println!(
        "{} -> {} ({} -> {} bytes)",
        input.display(),
        output.display(),
        archive.len(),
        wire.len()
    );
    println!("{}  {}", checksum::sha256_hex(&wire), output.display());
    Ok(())
}
