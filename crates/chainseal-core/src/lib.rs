//! Chainseal Core - suites, keys, signatures and symmetric encryption
//!
//! This crate provides the cryptographic primitives shared by the batch
//! verification engine and the certificate layer: ECDSA P-256/SHA-256 and
//! SM2/SM3 keys, the signature DER codec, and AES/SM4 CBC encryption.

pub mod error;
pub mod hash;
pub mod keys;
pub mod signature;
pub mod suite;
pub mod symmetric;

pub use error::{CryptoError, ErrorKind};
pub use hash::{hash, hash_algorithm_for, sha256_file, Digest32, HashAlgorithm};
pub use keys::{AsymmetricKey, EcdsaKey, Key, Sm2Key};
pub use signature::EcSignature;
pub use suite::Suite;
pub use symmetric::{CbcKey, SymmetricAlgorithm, SymmetricKey};
