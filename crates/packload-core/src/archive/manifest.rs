//! Signing manifest and signature-file text.
//!
//! Both files are `Key: Value` lines grouped into blank-line separated
//! sections. A line starting with a single space continues the previous
//! value. Per-entry sections in the manifest start with `Name:`.

use data_encoding::BASE64;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
pub const DIGEST_KEY: &str = "SHA-256-Digest";
pub const MANIFEST_DIGEST_KEY: &str = "SHA-256-Digest-Manifest";

type Section = Vec<(String, String)>;

fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Section = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(cont) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.last_mut() {
                value.push_str(cont);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            current.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

fn lookup<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    section
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Base64 SHA-256 digest as written into manifests.
pub fn digest(data: &[u8]) -> String {
    BASE64.encode(&Sha256::digest(data))
}

/// Parsed `META-INF/MANIFEST.MF`: entry name → expected digest.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    digests: HashMap<String, String>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut digests = HashMap::new();
        // The first section is the main attributes.
        for section in parse_sections(&text).iter().skip(1) {
            if let (Some(name), Some(d)) = (lookup(section, "Name"), lookup(section, DIGEST_KEY)) {
                digests.insert(name.to_string(), d.to_string());
            }
        }
        Self { digests }
    }

    /// Expected digest of `name`, if the manifest lists it.
    pub fn digest_of(&self, name: &str) -> Option<&str> {
        self.digests.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Renders a manifest listing a digest for every `(name, bytes)` pair.
    pub fn render<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
        let mut out = String::from("Manifest-Version: 1.0\r\nCreated-By: packload\r\n\r\n");
        for (name, data) in entries {
            out.push_str(&format!(
                "Name: {}\r\n{}: {}\r\n\r\n",
                name,
                DIGEST_KEY,
                digest(data)
            ));
        }
        out.into_bytes()
    }
}

/// Parsed `META-INF/<signer>.SF`.
#[derive(Debug, Clone)]
pub struct SignatureFile {
    pub manifest_digest: Option<String>,
}

impl SignatureFile {
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let manifest_digest = parse_sections(&text)
            .first()
            .and_then(|main| lookup(main, MANIFEST_DIGEST_KEY))
            .map(str::to_string);
        Self { manifest_digest }
    }

    /// Renders a signature file binding `manifest` by digest.
    pub fn render(manifest: &[u8]) -> Vec<u8> {
        format!(
            "Signature-Version: 1.0\r\n{}: {}\r\nCreated-By: packload\r\n\r\n",
            MANIFEST_DIGEST_KEY,
            digest(manifest)
        )
        .into_bytes()
    }
}
