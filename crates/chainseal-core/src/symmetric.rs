//! CBC-mode symmetric encryption with PKCS#7 padding.
//!
//! Ciphertext is laid out as `ciphertext ‖ iv`: the 16-byte IV trails the
//! encrypted blocks.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sm4::Sm4;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::CryptoError;

pub const BLOCK_LEN: usize = 16;
pub const KEY_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymmetricAlgorithm {
    Aes128,
    Sm4,
}

impl SymmetricAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymmetricAlgorithm::Aes128 => "aes128",
            SymmetricAlgorithm::Sm4 => "sm4",
        }
    }
}

impl FromStr for SymmetricAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes" | "aes128" | "aes-128" => Ok(SymmetricAlgorithm::Aes128),
            "sm4" => Ok(SymmetricAlgorithm::Sm4),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait SymmetricKey: Send + Sync {
    fn algorithm(&self) -> SymmetricAlgorithm;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn key_bytes(&self) -> &[u8];

    fn key_base64(&self) -> String {
        STANDARD.encode(self.key_bytes())
    }
}

/// A 128-bit key for AES or SM4 in CBC mode
#[derive(Clone)]
pub struct CbcKey {
    algorithm: SymmetricAlgorithm,
    key: [u8; KEY_LEN],
}

impl CbcKey {
    pub fn generate(algorithm: SymmetricAlgorithm) -> Result<Self, CryptoError> {
        let mut key = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(CbcKey { algorithm, key })
    }

    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(CbcKey { algorithm, key })
    }

    pub fn from_base64(algorithm: SymmetricAlgorithm, encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::from_bytes(algorithm, &bytes)
    }
}

impl SymmetricKey for CbcKey {
    fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; BLOCK_LEN];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;

        let mut out = match self.algorithm {
            SymmetricAlgorithm::Aes128 => cbc::Encryptor::<Aes128>::new(&self.key.into(), &iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            SymmetricAlgorithm::Sm4 => cbc::Encryptor::<Sm4>::new(&self.key.into(), &iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        out.extend_from_slice(&iv);
        Ok(out)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < BLOCK_LEN + KEY_LEN {
            return Err(CryptoError::InvalidCiphertext(format!(
                "length {} is shorter than {}",
                blob.len(),
                BLOCK_LEN + KEY_LEN
            )));
        }
        if blob.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::InvalidCiphertext(format!(
                "length {} is not a multiple of {}",
                blob.len(),
                BLOCK_LEN
            )));
        }

        let (ciphertext, iv) = blob.split_at(blob.len() - BLOCK_LEN);
        let mut iv_block = [0u8; BLOCK_LEN];
        iv_block.copy_from_slice(iv);

        let plaintext = match self.algorithm {
            SymmetricAlgorithm::Aes128 => {
                cbc::Decryptor::<Aes128>::new(&self.key.into(), &iv_block.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            }
            SymmetricAlgorithm::Sm4 => cbc::Decryptor::<Sm4>::new(&self.key.into(), &iv_block.into())
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| {
            debug!("{} decrypt rejected: bad PKCS#7 padding", self.algorithm);
            CryptoError::InvalidPadding
        })
    }

    fn key_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for CbcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CbcKey({}, [REDACTED])", self.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ALGORITHMS: [SymmetricAlgorithm; 2] = [SymmetricAlgorithm::Aes128, SymmetricAlgorithm::Sm4];

    #[test]
    fn test_roundtrip_lengths() {
        for alg in ALGORITHMS {
            let key = CbcKey::generate(alg).unwrap();
            for len in [0usize, 1, 15, 16, 17, 48, 1000] {
                let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let blob = key.encrypt(&plaintext).unwrap();
                assert_eq!(blob.len() % BLOCK_LEN, 0);
                assert!(blob.len() >= 2 * BLOCK_LEN);
                assert_eq!(key.decrypt(&blob).unwrap(), plaintext, "{alg} len {len}");
            }
        }
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let key = CbcKey::generate(SymmetricAlgorithm::Aes128).unwrap();
        let a = key.encrypt(b"same").unwrap();
        let b = key.encrypt(b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[a.len() - BLOCK_LEN..], b[b.len() - BLOCK_LEN..]);
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = CbcKey::generate(SymmetricAlgorithm::Aes128).unwrap();
        let blob = key.encrypt(b"hello, world! hello, world!").unwrap();
        let err = key.decrypt(&blob[3..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(key.decrypt(&blob[..BLOCK_LEN]).is_err());
        assert!(key.decrypt(&[]).is_err());
    }

    #[test]
    fn test_corrupted_padding_fails_closed() {
        for alg in ALGORITHMS {
            let key = CbcKey::generate(alg).unwrap();
            let mut blob = key.encrypt(b"exactly sixteen!").unwrap();
            // Last plaintext block is all padding (0x10 * 16); corrupt an
            // inner padding byte through the preceding ciphertext block.
            let target = blob.len() - 2 * BLOCK_LEN - 5;
            blob[target] ^= 0x01;
            assert!(matches!(key.decrypt(&blob), Err(CryptoError::InvalidPadding)));
        }
    }

    #[test]
    fn test_wrong_key_never_panics() {
        let key = CbcKey::generate(SymmetricAlgorithm::Sm4).unwrap();
        let other = CbcKey::generate(SymmetricAlgorithm::Sm4).unwrap();
        let blob = key.encrypt(b"secret phone record").unwrap();
        if let Ok(plaintext) = other.decrypt(&blob) {
            assert_ne!(plaintext, b"secret phone record");
        }
    }

    #[test]
    fn test_base64_key_roundtrip() {
        let key = CbcKey::generate(SymmetricAlgorithm::Sm4).unwrap();
        let restored = CbcKey::from_base64(SymmetricAlgorithm::Sm4, &key.key_base64()).unwrap();
        assert_eq!(restored.key_bytes(), key.key_bytes());
        let blob = key.encrypt(b"shared").unwrap();
        assert_eq!(restored.decrypt(&blob).unwrap(), b"shared");
    }

    #[test]
    fn test_bad_key_length() {
        let err = CbcKey::from_bytes(SymmetricAlgorithm::Aes128, &[0u8; 15]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(CbcKey::from_base64(SymmetricAlgorithm::Aes128, "!!!").is_err());
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SM4".parse::<SymmetricAlgorithm>().unwrap(), SymmetricAlgorithm::Sm4);
        assert_eq!("aes128".parse::<SymmetricAlgorithm>().unwrap(), SymmetricAlgorithm::Aes128);
        assert!("des".parse::<SymmetricAlgorithm>().is_err());
    }
}
