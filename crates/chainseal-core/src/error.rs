use std::fmt;

use thiserror::Error;

/// Coarse classification shared by every error in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsupported algorithm, unknown PEM block type, mismatched suite
    Config,
    /// Malformed PEM/DER, bad ciphertext length or padding
    Format,
    /// Signature out of range, hash/point mismatch, failed verification
    Crypto,
    /// No precomputed material for the requested batch size
    ResourceGap,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Format => "format",
            ErrorKind::Crypto => "crypto",
            ErrorKind::ResourceGap => "resource-gap",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Unknown PEM block type: {0}")]
    UnknownPemLabel(String),

    #[error("Suite mismatch: expected {expected}, got {found}")]
    SuiteMismatch { expected: String, found: String },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Invalid padding")]
    InvalidPadding,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Public key cannot sign")]
    PublicKeyCannotSign,

    #[error("Scalar out of range")]
    ScalarOutOfRange,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Random number generator failure: {0}")]
    Rng(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::UnsupportedAlgorithm(_)
            | CryptoError::UnknownPemLabel(_)
            | CryptoError::SuiteMismatch { .. }
            | CryptoError::Unsupported(_)
            | CryptoError::Io(_) => ErrorKind::Config,
            CryptoError::MalformedKey(_)
            | CryptoError::MalformedSignature(_)
            | CryptoError::InvalidCiphertext(_)
            | CryptoError::InvalidPadding
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::Der(_)
            | CryptoError::Base64(_)
            | CryptoError::HexDecode(_) => ErrorKind::Format,
            CryptoError::PublicKeyCannotSign
            | CryptoError::ScalarOutOfRange
            | CryptoError::InvalidSignature
            | CryptoError::Signing(_)
            | CryptoError::Rng(_) => ErrorKind::Crypto,
        }
    }
}
