//! Signer blocks: `META-INF/<signer>.RSA` / `.DSA`.
//!
//! A block is PEM text holding the signer's chain as `CERTIFICATE` blocks,
//! leaf first, followed by one `SIGNATURE` block: the leaf key's signature
//! over the exact bytes of `META-INF/<signer>.SF`.

use crate::error::TrustError;
use crate::trust::{Certificate, CertificateChain};
use data_encoding::BASE64;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use std::sync::Arc;
use x509_parser::pem::Pem;
use x509_parser::public_key::PublicKey;

const SIGNATURE_LABEL: &str = "SIGNATURE";
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

static RSA_ALGS: &[&dyn VerificationAlgorithm] = &[&signature::RSA_PKCS1_2048_8192_SHA256];
static EC_ALGS: &[&dyn VerificationAlgorithm] = &[
    &signature::ECDSA_P256_SHA256_ASN1,
    &signature::ECDSA_P384_SHA384_ASN1,
];
static ED_ALGS: &[&dyn VerificationAlgorithm] = &[&signature::ED25519];

/// A parsed signer block.
#[derive(Debug, Clone)]
pub struct SignerBlock {
    pub signer: String,
    pub chain: CertificateChain,
    signature: Vec<u8>,
}

impl SignerBlock {
    pub fn parse(signer: &str, bytes: &[u8]) -> Result<Self, TrustError> {
        let fail = |reason: String| TrustError::SignatureBlock {
            signer: signer.to_string(),
            reason,
        };
        let mut certs = Vec::new();
        let mut signature = None;
        for block in Pem::iter_from_buffer(bytes) {
            let block = block.map_err(|e| fail(format!("bad PEM: {}", e)))?;
            match block.label.as_str() {
                CERTIFICATE_LABEL => certs.push(Certificate::from_der(block.contents)),
                SIGNATURE_LABEL if signature.is_none() => signature = Some(block.contents),
                SIGNATURE_LABEL => return Err(fail("more than one signature".into())),
                other => tracing::debug!(signer, label = other, "ignoring PEM block"),
            }
        }
        let signature = signature.ok_or_else(|| fail("no signature".into()))?;
        if certs.is_empty() {
            return Err(fail("no certificates".into()));
        }
        Ok(Self {
            signer: signer.to_string(),
            chain: Arc::from(certs),
            signature,
        })
    }

    /// Checks the block signature over `signed` with the leaf's public key.
    pub fn verify(&self, signed: &[u8]) -> Result<(), TrustError> {
        let leaf = &self.chain[0];
        verify_with(leaf, signed, &self.signature).map_err(|reason| TrustError::SignatureBlock {
            signer: self.signer.clone(),
            reason,
        })
    }
}

fn verify_with(cert: &Certificate, message: &[u8], sig: &[u8]) -> Result<(), String> {
    let parsed = cert.parse()?;
    let spki = parsed.public_key();
    let key: &[u8] = &spki.subject_public_key.data;
    let algs = match spki.parsed() {
        Ok(PublicKey::RSA(_)) => RSA_ALGS,
        Ok(PublicKey::EC(_)) => EC_ALGS,
        _ => ED_ALGS,
    };
    for alg in algs {
        if UnparsedPublicKey::new(*alg, key).verify(message, sig).is_ok() {
            return Ok(());
        }
    }
    Err("signature does not verify with the signer certificate".into())
}

/// Renders a signer block for `chain` (leaf first) and `signature`.
pub fn render_block(chain: &[Certificate], signature: &[u8]) -> Vec<u8> {
    let mut out = String::new();
    for cert in chain {
        push_pem(&mut out, CERTIFICATE_LABEL, cert.der());
    }
    push_pem(&mut out, SIGNATURE_LABEL, signature);
    out.into_bytes()
}

fn push_pem(out: &mut String, label: &str, der: &[u8]) {
    out.push_str(&format!("-----BEGIN {}-----\n", label));
    let b64 = BASE64.encode(der);
    for line in b64.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
}
