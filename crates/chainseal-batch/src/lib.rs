//! Chainseal Batch - amortized ECDSA batch verification
//!
//! A [`BatchVerifier`] owns per-size precomputed [`RandomArrays`] and checks
//! a set of rich signatures under one public key with a single combined
//! curve computation.

pub mod arrays;
pub mod engine;
pub mod error;

pub use arrays::RandomArrays;
pub use engine::{
    chunk_ranges, BatchVerifier, ChunkFailure, MultiVerifyOutcome, DEFAULT_CHUNK_SIZE,
    DEFAULT_SIZE_RANGES,
};
pub use error::BatchError;
