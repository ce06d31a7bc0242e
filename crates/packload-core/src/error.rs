//! Failure taxonomy for the launch pipeline.
//!
//! Every component raises one of four categories; only the coordinator
//! decides whether a category is retried, waited on, or fatal.

use std::io;
use thiserror::Error;

/// Network or file failure that is expected to clear up on its own.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct TransientError {
    pub context: String,
    #[source]
    pub source: io::Error,
}

impl TransientError {
    pub fn new(context: impl Into<String>, source: io::Error) -> Self {
        Self {
            context: context.into(),
            source,
        }
    }

    /// Transient failure with no underlying I/O error (e.g. HTTP status).
    pub fn msg(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(context, io::Error::new(io::ErrorKind::Other, detail.into()))
    }
}

/// A certificate chain or signature could not be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("entry {name} is not signed")]
    Unsigned { name: String },
    #[error("length of certificate chain is {len}, expected at least 2")]
    ChainTooShort { len: usize },
    #[error("certificate {index} is not an X.509 certificate: {reason}")]
    NotX509 { index: usize, reason: String },
    #[error("last certificate in chain is not a trusted certificate authority ({subject})")]
    UntrustedRoot { subject: String },
    #[error("certificate {index} has no organization name ({subject})")]
    MissingOrganization { index: usize, subject: String },
    #[error("certificate {index} organization {found:?} does not match root organization {expected:?}")]
    OrganizationMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("signer organization must be {expected:?}, found {found:?}")]
    PublisherMismatch { expected: String, found: String },
    #[error("certificate {index} signature does not verify against its issuer: {reason}")]
    BadSignature { index: usize, reason: String },
    #[error("certificate {index} is outside its validity window ({subject})")]
    Expired { index: usize, subject: String },
    #[error("signature block {signer}: {reason}")]
    SignatureBlock { signer: String, reason: String },
    #[error("digest of {name} does not match the signed manifest")]
    DigestMismatch { name: String },
}

/// The archive was acquired and trusted but code could not be materialized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("code unit not found: {0}")]
    NotFound(String),
    #[error("only one program instance can be created per loader")]
    AlreadyInstantiated,
    #[error("malformed code unit {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// The remote side spoke something we do not understand. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unsupported content encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("malformed config line {line}: {text:?}")]
    MalformedConfig { line: usize, text: String },
    #[error("config is missing key {0:?}")]
    MissingKey(&'static str),
    #[error("config version identifier {0:?} is not a 32-bit integer")]
    InvalidVersion(String),
    #[error("invalid archive url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Any failure raised while fetching, verifying or instantiating the archive.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    Trust(#[from] TrustError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Retry classification of a [`LaunchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Transient,
    Trust,
    Load,
    Protocol,
}

impl LaunchError {
    pub fn category(&self) -> FailureCategory {
        match self {
            LaunchError::Transient(_) => FailureCategory::Transient,
            LaunchError::Trust(_) => FailureCategory::Trust,
            LaunchError::Load(_) => FailureCategory::Load,
            LaunchError::Protocol(_) => FailureCategory::Protocol,
        }
    }

    /// Shorthand for an I/O failure with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LaunchError::Transient(TransientError::new(context, source))
    }
}
