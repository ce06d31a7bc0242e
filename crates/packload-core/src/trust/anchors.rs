//! Trust anchor sources.

use super::Certificate;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;

/// Anchor archive compiled into the binary.
static BUNDLED_ANCHORS: &[u8] = include_bytes!("../../resources/anchors.zip");

/// Somewhere root certificates come from.
pub trait AnchorSource: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self) -> io::Result<Vec<Certificate>>;
}

/// Every `.pem` / `.crt` entry of a zip archive (the bundled one by default).
pub struct BundledArchive {
    bytes: &'static [u8],
}

impl Default for BundledArchive {
    fn default() -> Self {
        Self {
            bytes: BUNDLED_ANCHORS,
        }
    }
}

impl BundledArchive {
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self { bytes }
    }
}

impl AnchorSource for BundledArchive {
    fn name(&self) -> &str {
        "bundled"
    }

    fn load(&self) -> io::Result<Vec<Certificate>> {
        let mut zip = zip::ZipArchive::new(Cursor::new(self.bytes))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut certs = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if entry.is_dir() || !is_pem_name(entry.name()) {
                continue;
            }
            let name = entry.name().to_string();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            match Certificate::from_pem(&buf) {
                Ok(found) => certs.extend(found),
                Err(e) => tracing::warn!(entry = %name, "skipping bundled anchor: {}", e),
            }
        }
        Ok(certs)
    }
}

/// Every `.pem` file directly inside a directory. A missing directory is empty.
pub struct PemDirectory {
    path: PathBuf,
}

impl PemDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AnchorSource for PemDirectory {
    fn name(&self) -> &str {
        "directory"
    }

    fn load(&self) -> io::Result<Vec<Certificate>> {
        if !self.path.is_dir() {
            tracing::debug!("anchor directory {} not present", self.path.display());
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().map_or(false, |x| x == "pem"))
            .collect();
        paths.sort();
        let mut certs = Vec::new();
        for path in paths {
            let data = fs::read(&path)?;
            match Certificate::from_pem(&data) {
                Ok(found) => certs.extend(found),
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
        Ok(certs)
    }
}

/// The operating system's root store.
#[derive(Default)]
pub struct PlatformStore;

impl AnchorSource for PlatformStore {
    fn name(&self) -> &str {
        "platform"
    }

    fn load(&self) -> io::Result<Vec<Certificate>> {
        let result = rustls_native_certs::load_native_certs();
        for err in &result.errors {
            tracing::warn!("platform trust store: {}", err);
        }
        Ok(result
            .certs
            .into_iter()
            .map(|der| Certificate::from_der(der.as_ref().to_vec()))
            .collect())
    }
}

/// A fixed list, for embedders that ship their own roots.
pub struct FixedAnchors(pub Vec<Certificate>);

impl AnchorSource for FixedAnchors {
    fn name(&self) -> &str {
        "fixed"
    }

    fn load(&self) -> io::Result<Vec<Certificate>> {
        Ok(self.0.clone())
    }
}

fn is_pem_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".pem") || lower.ends_with(".crt")
}

/// Trusted roots, matched by exact DER encoding. Immutable once built.
#[derive(Debug, Default)]
pub struct TrustAnchorSet {
    roots: HashSet<Vec<u8>>,
}

impl TrustAnchorSet {
    /// Unions every source, keeping only certificates valid right now.
    /// A source that fails to load is logged and skipped.
    pub fn load(sources: &[Box<dyn AnchorSource>]) -> Self {
        let mut roots = HashSet::new();
        for source in sources {
            let certs = match source.load() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(source = source.name(), "failed to load trust anchors: {}", e);
                    continue;
                }
            };
            let offered = certs.len();
            let mut kept = 0usize;
            for cert in certs {
                if cert.is_currently_valid() {
                    roots.insert(cert.der().to_vec());
                    kept += 1;
                }
            }
            tracing::debug!(source = source.name(), offered, kept, "trust anchors loaded");
        }
        Self { roots }
    }

    pub fn contains(&self, cert: &Certificate) -> bool {
        self.roots.contains(cert.der())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
