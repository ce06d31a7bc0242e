//! Shared DER certificate handle.

use std::fmt;
use std::sync::Arc;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;

/// A DER-encoded certificate. Cloning shares the encoding, and two handles
/// are the *same* certificate only when they share it ([`Certificate::same_as`]).
#[derive(Clone)]
pub struct Certificate {
    der: Arc<[u8]>,
}

/// A certificate chain, leaf first. Shared between every entry a signer signs.
pub type CertificateChain = Arc<[Certificate]>;

impl Certificate {
    /// Wraps DER bytes. Nothing is parsed until the certificate is used.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self {
            der: Arc::from(der.into()),
        }
    }

    /// Every `CERTIFICATE` block of a PEM document, in order.
    pub fn from_pem(pem: &[u8]) -> Result<Vec<Certificate>, String> {
        let mut certs = Vec::new();
        for block in Pem::iter_from_buffer(pem) {
            let block = block.map_err(|e| e.to_string())?;
            if block.label == "CERTIFICATE" {
                certs.push(Certificate::from_der(block.contents));
            }
        }
        Ok(certs)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Identity comparison: true only for handles of the same object.
    pub fn same_as(&self, other: &Certificate) -> bool {
        Arc::ptr_eq(&self.der, &other.der)
    }

    pub(crate) fn parse(&self) -> Result<X509Certificate<'_>, String> {
        match x509_parser::parse_x509_certificate(&self.der) {
            Ok((_, cert)) => Ok(cert),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Subject distinguished name, or a placeholder when unparseable.
    pub fn subject(&self) -> String {
        self.parse()
            .map(|c| c.subject().to_string())
            .unwrap_or_else(|_| "<unparseable>".to_string())
    }

    /// First organization (`O=`) of the subject.
    pub fn organization(&self) -> Option<String> {
        let cert = self.parse().ok()?;
        organization_of(&cert)
    }

    /// True when the certificate parses and now is within its validity window.
    pub fn is_currently_valid(&self) -> bool {
        self.parse().map(|c| c.validity().is_valid()).unwrap_or(false)
    }
}

pub(crate) fn organization_of(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("len", &self.der.len())
            .finish()
    }
}
