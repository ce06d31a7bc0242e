//! Throwaway signer: a two-level chain and archives signed with it.

use packload_core::archive::manifest::{Manifest, SignatureFile, MANIFEST_NAME};
use packload_core::archive::signature::render_block;
use packload_core::archive::CanonicalWriter;
use packload_core::trust::{Certificate, FixedAnchors, TrustStore};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

pub const PUBLISHER: &str = "Example Games";

fn params(org: &str, cn: &str, ca: bool) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, org);
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    if ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    params
}

pub struct Signer {
    leaf_key: KeyPair,
    chain: Vec<Certificate>,
}

impl Signer {
    pub fn new(org: &str) -> Self {
        let root_key = KeyPair::generate().unwrap();
        let root = params(org, "Test Root", true).self_signed(&root_key).unwrap();
        let leaf_key = KeyPair::generate().unwrap();
        let leaf = params(org, "Test Signer", false)
            .signed_by(&leaf_key, &root, &root_key)
            .unwrap();
        let chain = vec![
            Certificate::from_der(leaf.der().to_vec()),
            Certificate::from_der(root.der().to_vec()),
        ];
        Self { leaf_key, chain }
    }

    /// Store trusting only this signer's root.
    pub fn store(&self) -> TrustStore {
        TrustStore::new(
            PUBLISHER,
            vec![Box::new(FixedAnchors(vec![self.chain[1].clone()]))],
        )
    }

    pub fn sign_archive(&self, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let manifest = Manifest::render(entries.iter().map(|(n, d)| (*n, *d)));
        let sf = SignatureFile::render(&manifest);
        let block = render_block(&self.chain, &self.sign(&sf));

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

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        let pair = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_ASN1_SIGNING,
            &self.leaf_key.serialize_der(),
            &rng,
        )
        .unwrap();
        pair.sign(&rng, message).unwrap().as_ref().to_vec()
    }
}

/// Bytes that pass the code-unit header check.
pub fn class_bytes(tag: &[u8]) -> Vec<u8> {
    let mut v = vec![0xCA, 0xFE, 0xBA, 0xBE];
    v.extend_from_slice(tag);
    v
}

/// A small game: entry point, one more unit, one resource.
pub fn game(signer: &Signer) -> Vec<u8> {
    let client = class_bytes(b"client");
    let world = class_bytes(b"world");
    signer.sign_archive(&[
        ("client.class", &client),
        ("game/World.class", &world),
        ("data/title.txt", b"title"),
    ])
}
