//! Test fixtures: throwaway PKI and signed archives.

use crate::archive::manifest::{Manifest, SignatureFile, MANIFEST_NAME};
use crate::archive::signature::render_block;
use crate::archive::CanonicalWriter;
use crate::trust::{Certificate, FixedAnchors, TrustStore};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

pub const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Subject `O=org, CN=cn`; the organization is left out when `org` is `None`.
pub fn params(org: Option<&str>, cn: &str, ca: bool) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    if let Some(org) = org {
        dn.push(DnType::OrganizationName, org);
    }
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    if ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    params
}

/// Root → intermediate → leaf, each with its own key.
pub struct Pki {
    leaf_key: KeyPair,
    root_pem: String,
    chain: Vec<Certificate>,
}

impl Pki {
    pub fn new(root_org: &str, leaf_org: &str) -> Self {
        Self::with_intermediate_org(root_org, root_org, leaf_org)
    }

    pub fn with_intermediate_org(root_org: &str, inter_org: &str, leaf_org: &str) -> Self {
        Self::from_params(
            params(Some(root_org), "Test Root", true),
            params(Some(inter_org), "Test Intermediate", true),
            params(Some(leaf_org), "Test Signer", false),
        )
    }

    /// Issues the three certificates from caller-supplied parameters.
    pub fn from_params(
        root: CertificateParams,
        intermediate: CertificateParams,
        leaf: CertificateParams,
    ) -> Self {
        let root_key = KeyPair::generate().unwrap();
        let root = root.self_signed(&root_key).unwrap();
        let intermediate_key = KeyPair::generate().unwrap();
        let intermediate = intermediate
            .signed_by(&intermediate_key, &root, &root_key)
            .unwrap();
        let leaf_key = KeyPair::generate().unwrap();
        let leaf = leaf
            .signed_by(&leaf_key, &intermediate, &intermediate_key)
            .unwrap();
        let chain = vec![
            Certificate::from_der(leaf.der().to_vec()),
            Certificate::from_der(intermediate.der().to_vec()),
            Certificate::from_der(root.der().to_vec()),
        ];
        Self {
            leaf_key,
            root_pem: root.pem(),
            chain,
        }
    }

    /// Leaf first. Repeated calls return handles to the same certificates.
    pub fn chain(&self) -> Vec<Certificate> {
        self.chain.clone()
    }

    pub fn root_pem(&self) -> String {
        self.root_pem.clone()
    }

    /// Store trusting only this root.
    pub fn store(&self, publisher: &str) -> TrustStore {
        TrustStore::new(
            publisher,
            vec![Box::new(FixedAnchors(vec![self.chain[2].clone()]))],
        )
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_with(&self.leaf_key, message)
    }
}

pub fn sign_with(key: &KeyPair, message: &[u8]) -> Vec<u8> {
    let rng = SystemRandom::new();
    let pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.serialize_der(), &rng)
            .unwrap();
    pair.sign(&rng, message).unwrap().as_ref().to_vec()
}

/// Canonical archive with `entries` signed by `pki` under signer name `GAME`.
pub fn signed_archive(pki: &Pki, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let manifest = Manifest::render(entries.iter().map(|(n, d)| (*n, *d)));
    let sf = SignatureFile::render(&manifest);
    let block = render_block(&pki.chain(), &pki.sign(&sf));

    let mut w = CanonicalWriter::new();
    w.add_directory("META-INF/").unwrap();
    w.add_file(MANIFEST_NAME, &manifest).unwrap();
    w.add_file("META-INF/GAME.SF", &sf).unwrap();
    w.add_file("META-INF/GAME.RSA", &block).unwrap();
    for (name, data) in entries {
        w.add_file(name, data).unwrap();
    }
    w.finish().unwrap()
}

/// Canonical archive with no signature metadata.
pub fn unsigned_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = CanonicalWriter::new();
    for (name, data) in entries {
        w.add_file(name, data).unwrap();
    }
    w.finish().unwrap()
}

/// Bytes that pass the code-unit header check.
pub fn class_bytes(tag: &[u8]) -> Vec<u8> {
    let mut v = CLASS_MAGIC.to_vec();
    v.extend_from_slice(tag);
    v
}
