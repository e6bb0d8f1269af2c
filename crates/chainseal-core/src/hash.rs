use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sm3::Sm3;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::CryptoError;

/// A 32-byte digest produced by one of the supported hash functions
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Digest32(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(CryptoError::HexDecode(hex::FromHexError::InvalidStringLength))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest32({})", self.to_hex())
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash functions bound to the signature suites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sm3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sm3 => "sm3",
        }
    }

    pub fn digest(&self, data: &[u8]) -> Digest32 {
        match self {
            HashAlgorithm::Sha256 => Digest32(Sha256::digest(data).into()),
            HashAlgorithm::Sm3 => Digest32(Sm3::digest(data).into()),
        }
    }

    /// Stream a file through the hash without loading it whole
    pub fn hash_file(&self, path: impl AsRef<Path>) -> Result<Digest32, CryptoError> {
        let mut file = File::open(path)?;
        match self {
            HashAlgorithm::Sha256 => stream(&mut file, Sha256::new()),
            HashAlgorithm::Sm3 => stream(&mut file, Sm3::new()),
        }
    }
}

fn stream<D: Digest + Write>(reader: &mut impl Read, mut hasher: D) -> Result<Digest32, CryptoError> {
    io::copy(reader, &mut hasher)?;
    Digest32::from_slice(&hasher.finalize())
        .ok_or_else(|| CryptoError::Unsupported("digest is not 32 bytes".into()))
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sm3" => Ok(HashAlgorithm::Sm3),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash `msg` with the algorithm named by `alg`
pub fn hash(msg: &[u8], alg: &str) -> Result<Digest32, CryptoError> {
    Ok(alg.parse::<HashAlgorithm>()?.digest(msg))
}

/// Map a signature algorithm name to the hash it is paired with.
/// Unknown names fall back to SHA-256.
pub fn hash_algorithm_for(sign_alg: &str) -> HashAlgorithm {
    if sign_alg.eq_ignore_ascii_case(crate::suite::SM2_WITH_SM3) {
        HashAlgorithm::Sm3
    } else {
        HashAlgorithm::Sha256
    }
}

pub fn sha256_file(path: impl AsRef<Path>) -> Result<Digest32, CryptoError> {
    HashAlgorithm::Sha256.hash_file(path)
}
