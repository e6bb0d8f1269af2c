use chainseal_core::{CryptoError, ErrorKind, Suite};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No random arrays cached for batch size {0}")]
    MissingRandomArrays(usize),

    #[error("Batch length mismatch: {messages} messages, {signatures} signatures")]
    LengthMismatch { messages: usize, signatures: usize },

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Invalid batch size: {0}")]
    InvalidSize(usize),

    #[error("Malformed signature at index {index}: {reason}")]
    MalformedSignature { index: usize, reason: String },

    #[error("Signature value out of range at index {0}")]
    OutOfRange(usize),

    #[error("Ephemeral point at index {0} is not on the curve")]
    PointNotOnCurve(usize),

    #[error("Ephemeral point at index {0} does not match r")]
    PointMismatch(usize),

    #[error("Schedule index out of range: {index} >= {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Random arrays for size {expected} used with {got} signatures")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Batch verification failed")]
    Rejected,

    #[error("Batch verification not supported for {0}")]
    UnsupportedSuite(Suite),

    #[error("Random number generator failure: {0}")]
    Rng(String),

    #[error("Core error: {0}")]
    Core(#[from] CryptoError),
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::MissingRandomArrays(_) => ErrorKind::ResourceGap,
            BatchError::InvalidSize(_) | BatchError::UnsupportedSuite(_) => ErrorKind::Config,
            BatchError::LengthMismatch { .. }
            | BatchError::EmptyBatch
            | BatchError::MalformedSignature { .. } => ErrorKind::Format,
            BatchError::OutOfRange(_)
            | BatchError::PointNotOnCurve(_)
            | BatchError::PointMismatch(_)
            | BatchError::IndexOutOfRange { .. }
            | BatchError::SizeMismatch { .. }
            | BatchError::Rejected
            | BatchError::Rng(_) => ErrorKind::Crypto,
            BatchError::Core(e) => e.kind(),
        }
    }
}
