//! Certificate chain trust evaluation.
//!
//! A chain (leaf first) is trusted when its last certificate is a loaded
//! anchor, every certificate between leaf and root belongs to the root's
//! organization, the leaf belongs to the required publisher, and each
//! certificate is signed by the next one and currently valid.
//!
//! Anchors are loaded on first use, exactly once, from the configured
//! [`AnchorSource`]s. The last chain that verified is remembered so that
//! the many entries signed by one signer cost a single walk.

mod anchors;
mod certificate;

pub use anchors::{
    AnchorSource, BundledArchive, FixedAnchors, PemDirectory, PlatformStore, TrustAnchorSet,
};
pub use certificate::{Certificate, CertificateChain};

use crate::error::TrustError;
use certificate::organization_of;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

/// Organization the signing certificate must belong to unless configured otherwise.
pub const DEFAULT_PUBLISHER: &str = "Jagex Ltd";

/// Decides whether a certificate chain may vouch for archive contents.
pub trait CertificateChainVerifier: Send + Sync {
    fn verify(&self, chain: &[Certificate]) -> Result<(), TrustError>;
}

pub struct TrustStore {
    publisher: String,
    sources: Vec<Box<dyn AnchorSource>>,
    anchors: OnceLock<TrustAnchorSet>,
    last_verified: Mutex<Option<Vec<Certificate>>>,
    walks: AtomicU64,
}

impl TrustStore {
    pub fn new(publisher: impl Into<String>, sources: Vec<Box<dyn AnchorSource>>) -> Self {
        Self {
            publisher: publisher.into(),
            sources,
            anchors: OnceLock::new(),
            last_verified: Mutex::new(None),
            walks: AtomicU64::new(0),
        }
    }

    /// Bundled anchors, plus `*.pem` files from `certificate_dir`, plus the
    /// platform store when `include_platform` is set.
    pub fn with_default_sources(
        publisher: impl Into<String>,
        certificate_dir: Option<PathBuf>,
        include_platform: bool,
    ) -> Self {
        let mut sources: Vec<Box<dyn AnchorSource>> = vec![Box::new(BundledArchive::default())];
        if let Some(dir) = certificate_dir {
            sources.push(Box::new(PemDirectory::new(dir)));
        }
        if include_platform {
            sources.push(Box::new(PlatformStore));
        }
        Self::new(publisher, sources)
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    /// The anchor set, loading it on first call.
    pub fn anchors(&self) -> &TrustAnchorSet {
        self.anchors.get_or_init(|| {
            let set = TrustAnchorSet::load(&self.sources);
            tracing::info!(anchors = set.len(), "trust anchors ready");
            set
        })
    }

    /// Number of chains that were fully evaluated (cache hits excluded).
    pub fn chain_walks(&self) -> u64 {
        self.walks.load(Ordering::Relaxed)
    }

    fn is_last_verified(&self, chain: &[Certificate]) -> bool {
        let last = self
            .last_verified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match last.as_deref() {
            Some(prev) => {
                prev.len() == chain.len() && prev.iter().zip(chain).all(|(a, b)| a.same_as(b))
            }
            None => false,
        }
    }

    fn remember(&self, chain: &[Certificate]) {
        let mut last = self
            .last_verified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(chain.to_vec());
    }

    fn walk(&self, chain: &[Certificate]) -> Result<(), TrustError> {
        if chain.len() < 2 {
            return Err(TrustError::ChainTooShort { len: chain.len() });
        }
        let parsed = chain
            .iter()
            .enumerate()
            .map(|(index, c)| c.parse().map_err(|reason| TrustError::NotX509 { index, reason }))
            .collect::<Result<Vec<_>, _>>()?;

        let root_index = chain.len() - 1;
        let root = &parsed[root_index];
        if !self.anchors().contains(&chain[root_index]) {
            return Err(TrustError::UntrustedRoot {
                subject: root.subject().to_string(),
            });
        }

        let root_org = organization_of(root).ok_or_else(|| TrustError::MissingOrganization {
            index: root_index,
            subject: root.subject().to_string(),
        })?;
        for index in (0..root_index).rev() {
            let cert = &parsed[index];
            let org = organization_of(cert);
            if index == 0 {
                let found = org.unwrap_or_default();
                if !found.eq_ignore_ascii_case(&self.publisher) {
                    return Err(TrustError::PublisherMismatch {
                        expected: self.publisher.clone(),
                        found,
                    });
                }
            } else {
                let found = org.ok_or_else(|| TrustError::MissingOrganization {
                    index,
                    subject: cert.subject().to_string(),
                })?;
                if !found.eq_ignore_ascii_case(&root_org) {
                    return Err(TrustError::OrganizationMismatch {
                        index,
                        expected: root_org.clone(),
                        found,
                    });
                }
            }
        }

        for index in (0..root_index).rev() {
            let issuer = &parsed[index + 1];
            let cert = &parsed[index];
            cert.verify_signature(Some(issuer.public_key()))
                .map_err(|e| TrustError::BadSignature {
                    index,
                    reason: e.to_string(),
                })?;
            for (i, c) in [(index + 1, issuer), (index, cert)] {
                if !c.validity().is_valid() {
                    return Err(TrustError::Expired {
                        index: i,
                        subject: c.subject().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl CertificateChainVerifier for TrustStore {
    fn verify(&self, chain: &[Certificate]) -> Result<(), TrustError> {
        if self.is_last_verified(chain) {
            return Ok(());
        }
        self.walks.fetch_add(1, Ordering::Relaxed);
        match self.walk(chain) {
            Ok(()) => {
                tracing::debug!(len = chain.len(), "certificate chain trusted");
                self.remember(chain);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "certificate chain rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{params, Pki};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn valid_chain_is_trusted() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = pki.store(DEFAULT_PUBLISHER);
        store.verify(&pki.chain()).unwrap();
    }

    #[test]
    fn identical_chain_skips_the_walk() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = pki.store(DEFAULT_PUBLISHER);
        let chain = pki.chain();
        store.verify(&chain).unwrap();
        store.verify(&chain).unwrap();
        assert_eq!(store.chain_walks(), 1);

        // Equal bytes in fresh handles are a different chain.
        let copy: Vec<Certificate> = chain
            .iter()
            .map(|c| Certificate::from_der(c.der().to_vec()))
            .collect();
        store.verify(&copy).unwrap();
        assert_eq!(store.chain_walks(), 2);
    }

    #[test]
    fn short_chain_is_rejected() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = pki.store(DEFAULT_PUBLISHER);
        let err = store.verify(&pki.chain()[..1]).unwrap_err();
        assert_eq!(err, TrustError::ChainTooShort { len: 1 });
        assert_eq!(
            store.verify(&[]).unwrap_err(),
            TrustError::ChainTooShort { len: 0 }
        );
    }

    #[test]
    fn garbage_certificate_is_not_x509() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = pki.store(DEFAULT_PUBLISHER);
        let mut chain = pki.chain();
        chain[1] = Certificate::from_der(vec![0x30, 0x00]);
        assert!(matches!(
            store.verify(&chain).unwrap_err(),
            TrustError::NotX509 { index: 1, .. }
        ));
    }

    #[test]
    fn untrusted_root_is_rejected() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let other = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = other.store(DEFAULT_PUBLISHER);
        assert!(matches!(
            store.verify(&pki.chain()).unwrap_err(),
            TrustError::UntrustedRoot { .. }
        ));
    }

    #[test]
    fn intermediate_organization_must_match_root() {
        let pki = Pki::with_intermediate_org("Root Org", "Someone Else", DEFAULT_PUBLISHER);
        let store = pki.store(DEFAULT_PUBLISHER);
        let err = store.verify(&pki.chain()).unwrap_err();
        assert_eq!(
            err,
            TrustError::OrganizationMismatch {
                index: 1,
                expected: "Root Org".into(),
                found: "Someone Else".into(),
            }
        );
    }

    #[test]
    fn intermediate_organization_is_case_insensitive() {
        let pki = Pki::with_intermediate_org("Root Org", "ROOT ORG", DEFAULT_PUBLISHER);
        pki.store(DEFAULT_PUBLISHER).verify(&pki.chain()).unwrap();
    }

    #[test]
    fn leaf_must_be_the_publisher() {
        let pki = Pki::new("Root Org", "Impostor Inc");
        let store = pki.store(DEFAULT_PUBLISHER);
        let err = store.verify(&pki.chain()).unwrap_err();
        assert_eq!(
            err,
            TrustError::PublisherMismatch {
                expected: DEFAULT_PUBLISHER.into(),
                found: "Impostor Inc".into(),
            }
        );
        // A store configured for that publisher accepts it.
        pki.store("Impostor Inc").verify(&pki.chain()).unwrap();

        let shouting = Pki::new("Root Org", &DEFAULT_PUBLISHER.to_uppercase());
        shouting
            .store(DEFAULT_PUBLISHER)
            .verify(&shouting.chain())
            .unwrap();
    }

    #[test]
    fn intermediate_without_organization_is_rejected() {
        let pki = Pki::from_params(
            params(Some("Root Org"), "Test Root", true),
            params(None, "Test Intermediate", true),
            params(Some(DEFAULT_PUBLISHER), "Test Signer", false),
        );
        let err = pki.store(DEFAULT_PUBLISHER).verify(&pki.chain()).unwrap_err();
        assert!(matches!(
            err,
            TrustError::MissingOrganization { index: 1, ref subject } if subject.contains("Test Intermediate")
        ));
    }

    #[test]
    fn root_without_organization_is_rejected() {
        let pki = Pki::from_params(
            params(None, "Test Root", true),
            params(Some("Root Org"), "Test Intermediate", true),
            params(Some(DEFAULT_PUBLISHER), "Test Signer", false),
        );
        let err = pki.store(DEFAULT_PUBLISHER).verify(&pki.chain()).unwrap_err();
        assert!(matches!(err, TrustError::MissingOrganization { index: 2, .. }));
    }

    fn lapsed(mut params: rcgen::CertificateParams) -> rcgen::CertificateParams {
        params.not_before = rcgen::date_time_ymd(1999, 1, 1);
        params.not_after = rcgen::date_time_ymd(2000, 1, 1);
        params
    }

    #[test]
    fn expired_leaf_is_rejected() {
        let pki = Pki::from_params(
            params(Some("Root Org"), "Test Root", true),
            params(Some("Root Org"), "Test Intermediate", true),
            lapsed(params(Some(DEFAULT_PUBLISHER), "Test Signer", false)),
        );
        let err = pki.store(DEFAULT_PUBLISHER).verify(&pki.chain()).unwrap_err();
        assert!(matches!(
            err,
            TrustError::Expired { index: 0, ref subject } if subject.contains("Test Signer")
        ));
    }

    #[test]
    fn expired_intermediate_is_rejected() {
        let pki = Pki::from_params(
            params(Some("Root Org"), "Test Root", true),
            lapsed(params(Some("Root Org"), "Test Intermediate", true)),
            params(Some(DEFAULT_PUBLISHER), "Test Signer", false),
        );
        let store = pki.store(DEFAULT_PUBLISHER);
        let err = store.verify(&pki.chain()).unwrap_err();
        assert!(matches!(err, TrustError::Expired { index: 1, .. }));
        // Nothing was remembered, so the next call walks again.
        assert!(store.verify(&pki.chain()).is_err());
        assert_eq!(store.chain_walks(), 2);
    }

    #[test]
    fn rejected_chain_is_not_cached() {
        let pki = Pki::new("Root Org", "Impostor Inc");
        let store = pki.store(DEFAULT_PUBLISHER);
        let chain = pki.chain();
        assert!(store.verify(&chain).is_err());
        assert!(store.verify(&chain).is_err());
        assert_eq!(store.chain_walks(), 2);
    }

    #[test]
    fn swapped_issuer_fails_signature_check() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let other = Pki::new("Root Org", DEFAULT_PUBLISHER);
        // Leaf issued by another intermediate, presented under this root.
        let chain = vec![other.chain()[0].clone(), pki.chain()[1].clone(), pki.chain()[2].clone()];
        let err = pki.store(DEFAULT_PUBLISHER).verify(&chain).unwrap_err();
        assert!(matches!(err, TrustError::BadSignature { index: 0, .. }));
    }

    #[test]
    fn concurrent_first_use_loads_anchors_once() {
        let pki = Pki::new("Root Org", DEFAULT_PUBLISHER);
        let store = Arc::new(pki.store(DEFAULT_PUBLISHER));
        let chain = pki.chain();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let chain = chain.clone();
                thread::spawn(move || store.verify(&chain))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(store.anchors().len(), 1);
        assert!(store.chain_walks() >= 1);
    }
}
