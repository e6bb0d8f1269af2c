use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;
use crate::hash::{Digest32, HashAlgorithm};

pub const ECDSA_WITH_SHA256: &str = "ecdsa_with_sha256";
pub const SM2_WITH_SM3: &str = "sm2_with_sm3";

/// An algorithm and hash pairing. Every key, certificate and signature
/// belongs to exactly one suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suite {
    #[serde(rename = "ecdsa_with_sha256")]
    EcdsaP256,
    #[serde(rename = "sm2_with_sm3")]
    Sm2,
}

impl Suite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suite::EcdsaP256 => ECDSA_WITH_SHA256,
            Suite::Sm2 => SM2_WITH_SM3,
        }
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Suite::EcdsaP256 => HashAlgorithm::Sha256,
            Suite::Sm2 => HashAlgorithm::Sm3,
        }
    }

    pub fn hash(&self, msg: &[u8]) -> Digest32 {
        self.hash_algorithm().digest(msg)
    }

    /// Only the ECDSA suite produces signatures that carry the ephemeral point
    pub fn supports_batch_verify(&self) -> bool {
        matches!(self, Suite::EcdsaP256)
    }

    /// Fails with a config error when `other` is a different suite
    pub fn expect(&self, other: Suite) -> Result<(), CryptoError> {
        if *self == other {
            Ok(())
        } else {
            Err(CryptoError::SuiteMismatch {
                expected: self.to_string(),
                found: other.to_string(),
            })
        }
    }
}

impl FromStr for Suite {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            ECDSA_WITH_SHA256 => Ok(Suite::EcdsaP256),
            SM2_WITH_SM3 => Ok(Suite::Sm2),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("ECDSA_WITH_SHA256".parse::<Suite>().unwrap(), Suite::EcdsaP256);
        assert_eq!("sm2_with_sm3".parse::<Suite>().unwrap(), Suite::Sm2);
    }

    #[test]
    fn test_unknown_algorithm_is_config_error() {
        let err = "rsa_with_sha1".parse::<Suite>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_hash_pairing() {
        assert_eq!(Suite::EcdsaP256.hash_algorithm(), HashAlgorithm::Sha256);
        assert_eq!(Suite::Sm2.hash_algorithm(), HashAlgorithm::Sm3);
        assert!(Suite::EcdsaP256.supports_batch_verify());
        assert!(!Suite::Sm2.supports_batch_verify());
    }

    #[test]
    fn test_expect_mismatch() {
        assert!(Suite::Sm2.expect(Suite::Sm2).is_ok());
        let err = Suite::Sm2.expect(Suite::EcdsaP256).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Suite::Sm2).unwrap();
        assert_eq!(json, "\"sm2_with_sm3\"");
    }
}
