//! Consume-once code materialization.
//!
//! A [`DynamicLoader`] owns the code units of one archive. Each unit can be
//! taken exactly once; after that its name resolves to nothing. One loader
//! backs at most one [`ProgramInstance`].

use crate::archive::{ArchiveBundle, EntryKind};
use crate::error::LoadError;
use crate::trust::CertificateChain;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Leading bytes every code unit must carry.
pub const CODE_UNIT_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Provenance of a materialized unit.
#[derive(Debug, Clone)]
pub enum CodeSource {
    Signed(CertificateChain),
    Local,
}

impl CodeSource {
    pub fn is_signed(&self) -> bool {
        matches!(self, CodeSource::Signed(_))
    }
}

/// A unit handed out by the loader. The bytes are owned by the caller now.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub name: String,
    pub bytes: Vec<u8>,
    pub code_source: CodeSource,
}

struct Slot {
    bytes: Vec<u8>,
    chain: Option<CertificateChain>,
}

#[derive(Default)]
struct CodeTable {
    slots: Vec<Option<Slot>>,
    index: HashMap<String, usize>,
}

pub struct DynamicLoader {
    table: Mutex<CodeTable>,
    resources: HashMap<String, Vec<u8>>,
    instantiated: AtomicBool,
}

impl DynamicLoader {
    pub fn new(bundle: ArchiveBundle) -> Self {
        let mut table = CodeTable::default();
        let mut resources = HashMap::new();
        for entry in bundle.entries {
            match entry.kind {
                EntryKind::CodeUnit => {
                    table.index.insert(entry.name, table.slots.len());
                    table.slots.push(Some(Slot {
                        bytes: entry.bytes,
                        chain: entry.chain,
                    }));
                }
                EntryKind::Resource => {
                    resources.insert(entry.name, entry.bytes);
                }
            }
        }
        Self {
            table: Mutex::new(table),
            resources,
            instantiated: AtomicBool::new(false),
        }
    }

    /// Takes the unit named `name` (dotted). Fails with `NotFound` when the
    /// name was never present or was already taken.
    pub fn materialize(&self, name: &str) -> Result<CodeUnit, LoadError> {
        let slot = {
            let mut table = self
                .table
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            table
                .index
                .get(name)
                .copied()
                .and_then(|i| table.slots[i].take())
        };
        let slot = slot.ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        tracing::trace!(unit = name, len = slot.bytes.len(), "materialized");
        Ok(CodeUnit {
            name: name.to_string(),
            bytes: slot.bytes,
            code_source: match slot.chain {
                Some(chain) => CodeSource::Signed(chain),
                None => CodeSource::Local,
            },
        })
    }

    /// Units not yet taken.
    pub fn remaining(&self) -> usize {
        let table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Non-code entry by archive path. Resources are not consumed.
    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.resources.get(path).map(Vec::as_slice)
    }

    /// Creates the one program instance this loader will ever back.
    pub fn create_instance(self: &Arc<Self>, entry_point: &str) -> Result<ProgramInstance, LoadError> {
        if self.instantiated.swap(true, Ordering::AcqRel) {
            return Err(LoadError::AlreadyInstantiated);
        }
        let entry = self.materialize(entry_point)?;
        if !entry.bytes.starts_with(&CODE_UNIT_MAGIC) {
            return Err(LoadError::Malformed {
                name: entry.name,
                reason: "missing code unit header".into(),
            });
        }
        tracing::info!(entry_point, signed = entry.code_source.is_signed(), "program instance created");
        Ok(ProgramInstance {
            entry,
            loader: Arc::clone(self),
        })
    }
}

/// A created program: its entry unit plus the loader that resolves the rest.
pub struct ProgramInstance {
    entry: CodeUnit,
    loader: Arc<DynamicLoader>,
}

impl ProgramInstance {
    pub fn entry(&self) -> &CodeUnit {
        &self.entry
    }

    /// Materializes another unit on demand.
    pub fn resolve(&self, name: &str) -> Result<CodeUnit, LoadError> {
        self.loader.materialize(name)
    }

    pub fn loader(&self) -> &Arc<DynamicLoader> {
        &self.loader
    }
}

impl std::fmt::Debug for ProgramInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramInstance")
            .field("entry", &self.entry.name)
            .field("remaining", &self.loader.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Entry;
    use crate::testutil::{class_bytes, Pki};
    use crate::trust::DEFAULT_PUBLISHER;

    fn bundle(chain: Option<CertificateChain>) -> ArchiveBundle {
        let entry = |name: &str, kind, bytes: Vec<u8>| Entry {
            name: name.to_string(),
            kind,
            bytes,
            chain: chain.clone(),
        };
        ArchiveBundle {
            entries: vec![
                entry("client", EntryKind::CodeUnit, class_bytes(b"main")),
                entry("a.Helper", EntryKind::CodeUnit, class_bytes(b"helper")),
                entry("broken", EntryKind::CodeUnit, b"nope".to_vec()),
                entry("data/config.txt", EntryKind::Resource, b"k=v".to_vec()),
            ],
            raw: None,
        }
    }

    #[test]
    fn materialize_consumes_permanently() {
        let loader = DynamicLoader::new(bundle(None));
        let unit = loader.materialize("a.Helper").unwrap();
        assert_eq!(unit.bytes, class_bytes(b"helper"));
        assert!(!unit.code_source.is_signed());
        assert_eq!(
            loader.materialize("a.Helper").unwrap_err(),
            LoadError::NotFound("a.Helper".into())
        );
        assert_eq!(
            loader.materialize("never.There").unwrap_err(),
            LoadError::NotFound("never.There".into())
        );
    }

    #[test]
    fn signed_entries_carry_their_chain() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let chain: CertificateChain = Arc::from(pki.chain());
        let loader = DynamicLoader::new(bundle(Some(chain.clone())));
        match loader.materialize("client").unwrap().code_source {
            CodeSource::Signed(c) => assert!(c[0].same_as(&chain[0])),
            CodeSource::Local => panic!("expected signed code source"),
        }
    }

    #[test]
    fn second_instance_is_refused() {
        let loader = Arc::new(DynamicLoader::new(bundle(None)));
        let program = loader.create_instance("client").unwrap();
        assert_eq!(program.entry().name, "client");
        assert_eq!(
            loader.create_instance("a.Helper").unwrap_err(),
            LoadError::AlreadyInstantiated
        );
        // The refused call took nothing.
        assert!(program.resolve("a.Helper").is_ok());
    }

    #[test]
    fn missing_entry_point_is_not_found() {
        let loader = Arc::new(DynamicLoader::new(bundle(None)));
        assert_eq!(
            loader.create_instance("nope").unwrap_err(),
            LoadError::NotFound("nope".into())
        );
    }

    #[test]
    fn bad_header_is_malformed() {
        let loader = Arc::new(DynamicLoader::new(bundle(None)));
        assert!(matches!(
            loader.create_instance("broken").unwrap_err(),
            LoadError::Malformed { ref name, .. } if name == "broken"
        ));
    }

    #[test]
    fn resources_are_not_code() {
        let loader = DynamicLoader::new(bundle(None));
        assert_eq!(loader.resource("data/config.txt"), Some(&b"k=v"[..]));
        assert!(loader.materialize("data/config.txt").is_err());
        assert_eq!(loader.remaining(), 3);
    }
}
