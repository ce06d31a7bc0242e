//! Canonical archive parsing into a verified entry table.
//!
//! Entries are visited in archive order. Directories and signature files
//! (`META-INF/*.SF`, `*.RSA`, `*.DSA`) are consumed and dropped, the
//! manifest is kept only as signing metadata, and every other entry lands
//! in the bundle. Code units (`*.class`) are keyed by their dotted name.

pub mod manifest;
pub mod signature;
mod writer;

pub use writer::CanonicalWriter;

use crate::error::{LaunchError, TrustError};
use crate::trust::{CertificateChain, CertificateChainVerifier};
use manifest::{Manifest, SignatureFile, MANIFEST_NAME};
use signature::SignerBlock;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};

pub const META_INF: &str = "META-INF/";
pub const CODE_UNIT_SUFFIX: &str = ".class";
const SIGNATURE_SUFFIXES: [&str; 3] = [".SF", ".RSA", ".DSA"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Executable unit; `name` is dotted with the suffix stripped.
    CodeUnit,
    /// Any other file; `name` is the archive path.
    Resource,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub bytes: Vec<u8>,
    pub chain: Option<CertificateChain>,
}

/// Entries of one archive, in archive order, plus the canonical bytes when
/// capture was requested.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBundle {
    pub entries: Vec<Entry>,
    pub raw: Option<Vec<u8>>,
}

impl ArchiveBundle {
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn code_units(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::CodeUnit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True for `META-INF/*.SF|RSA|DSA`, which can never verify themselves.
pub fn is_signature_file(name: &str) -> bool {
    name.starts_with(META_INF) && SIGNATURE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// `a/b/C.class` → `a.b.C`; `None` for anything that is not a code unit.
pub fn code_unit_name(path: &str) -> Option<String> {
    path.strip_suffix(CODE_UNIT_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(|stem| stem.replace('/', "."))
}

/// Reads a canonical archive.
///
/// With a verifier, every content entry must be covered by a signer whose
/// chain the verifier accepts; an uncovered entry is [`TrustError::Unsigned`].
/// Without one, no signature metadata is examined and entries carry no chain.
pub struct ArchiveReader<'a> {
    verifier: Option<&'a dyn CertificateChainVerifier>,
    capture: bool,
}

impl<'a> ArchiveReader<'a> {
    pub fn new() -> Self {
        Self {
            verifier: None,
            capture: false,
        }
    }

    pub fn verify_with(mut self, verifier: &'a dyn CertificateChainVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Keep the canonical bytes in [`ArchiveBundle::raw`].
    pub fn capture_raw(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn read<R: Read>(&self, mut input: R) -> Result<ArchiveBundle, LaunchError> {
        // Reading to the end also drains anything after the central directory.
        let mut raw = Vec::new();
        input
            .read_to_end(&mut raw)
            .map_err(|e| LaunchError::io("read archive stream", e))?;

        let files = read_files(&raw).map_err(|e| LaunchError::io("parse archive", e))?;
        let signed = match self.verifier {
            Some(_) => Some(resolve_signers(&files)?),
            None => None,
        };

        let mut entries = Vec::new();
        for (name, bytes) in files {
            if is_signature_file(&name) || name == MANIFEST_NAME {
                continue;
            }
            let chain = match (&signed, self.verifier) {
                (Some(signed), Some(verifier)) => {
                    let chain = signed.chain_for(&name, &bytes)?;
                    verifier.verify(&chain)?;
                    Some(chain)
                }
                _ => None,
            };
            let (name, kind) = match code_unit_name(&name) {
                Some(dotted) => (dotted, EntryKind::CodeUnit),
                None => (name, EntryKind::Resource),
            };
            tracing::trace!(entry = %name, len = bytes.len(), "archive entry");
            entries.push(Entry {
                name,
                kind,
                bytes,
                chain,
            });
        }

        tracing::debug!(
            entries = entries.len(),
            verified = self.verifier.is_some(),
            "archive read"
        );
        Ok(ArchiveBundle {
            entries,
            raw: self.capture.then_some(raw),
        })
    }
}

impl Default for ArchiveReader<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deflate cannot expand input by more than this factor, so a declared
/// size above `archive length * MAX_INFLATE_RATIO` is a lie.
const MAX_INFLATE_RATIO: u64 = 1032;

/// Non-directory entries, fully read, in archive order.
fn read_files(raw: &[u8]) -> io::Result<Vec<(String, Vec<u8>)>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(raw))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let size_limit = (raw.len() as u64).saturating_mul(MAX_INFLATE_RATIO);
    let mut files = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if file.size() > size_limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} declares {} bytes", file.name(), file.size()),
            ));
        }
        // Sizes are unauthenticated here; let the buffer grow with real data.
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if file.is_dir() {
            continue;
        }
        files.push((file.name().to_string(), data));
    }
    Ok(files)
}

/// Signers whose blocks verify, plus the manifest they vouch for.
struct Signers {
    manifest: Manifest,
    chains: Vec<CertificateChain>,
}

impl Signers {
    fn chain_for(&self, name: &str, bytes: &[u8]) -> Result<CertificateChain, TrustError> {
        let unsigned = || TrustError::Unsigned {
            name: name.to_string(),
        };
        let expected = self.manifest.digest_of(name).ok_or_else(unsigned)?;
        let chain = self.chains.first().cloned().ok_or_else(unsigned)?;
        if manifest::digest(bytes) != expected {
            return Err(TrustError::DigestMismatch {
                name: name.to_string(),
            });
        }
        Ok(chain)
    }
}

fn resolve_signers(files: &[(String, Vec<u8>)]) -> Result<Signers, TrustError> {
    let by_name: HashMap<&str, &[u8]> = files
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    let Some(manifest_bytes) = by_name.get(MANIFEST_NAME).copied() else {
        return Ok(Signers {
            manifest: Manifest::default(),
            chains: Vec::new(),
        });
    };
    let manifest = Manifest::parse(manifest_bytes);
    let manifest_digest = manifest::digest(manifest_bytes);

    let mut chains = Vec::new();
    for (name, sf_bytes) in files {
        let Some(signer) = name
            .strip_prefix(META_INF)
            .and_then(|n| n.strip_suffix(".SF"))
        else {
            continue;
        };
        let block = [".RSA", ".DSA"]
            .iter()
            .find_map(|ext| by_name.get(format!("{}{}{}", META_INF, signer, ext).as_str()))
            .ok_or_else(|| TrustError::SignatureBlock {
                signer: signer.to_string(),
                reason: "no signature block".into(),
            })?;
        let block = SignerBlock::parse(signer, block)?;
        block.verify(sf_bytes)?;
        let sf = SignatureFile::parse(sf_bytes);
        if sf.manifest_digest.as_deref() != Some(manifest_digest.as_str()) {
            return Err(TrustError::DigestMismatch {
                name: MANIFEST_NAME.to_string(),
            });
        }
        tracing::debug!(signer, chain_len = block.chain.len(), "signer resolved");
        chains.push(block.chain);
    }
    Ok(Signers { manifest, chains })
}
