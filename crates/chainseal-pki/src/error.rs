use chainseal_batch::BatchError;
use chainseal_core::{CryptoError, ErrorKind, Suite};
use thiserror::Error;
use x509_cert::der;

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Invalid certificate info: {0}")]
    InvalidInfo(String),

    #[error("No root certificates supplied")]
    EmptyRoots,

    #[error("Certificate chain is not trusted: {0}")]
    Untrusted(String),

    #[error("Issuer certificate is not a CA: {0}")]
    NotCa(String),

    #[error("Private key does not match certificate")]
    KeyMismatch,

    #[error("Batch verification not supported for {0}")]
    BatchUnsupported(Suite),

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CryptoError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

impl PkiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PkiError::InvalidCertificate(_) | PkiError::Der(_) => ErrorKind::Format,
            PkiError::InvalidInfo(_)
            | PkiError::EmptyRoots
            | PkiError::NotCa(_)
            | PkiError::KeyMismatch
            | PkiError::BatchUnsupported(_)
            | PkiError::Io(_) => ErrorKind::Config,
            PkiError::Untrusted(_) => ErrorKind::Crypto,
            PkiError::Core(e) => e.kind(),
            PkiError::Batch(e) => e.kind(),
        }
    }
}
