//! Asymmetric key material for both suites.
//!
//! [`Key`] is a closed set of suite implementations behind one API; each
//! variant implements [`AsymmetricKey`], which is the seam a different
//! SM2/ECDSA backend would plug into.

mod ecdsa;
mod gm;

use std::fmt;

use p256::pkcs8::PrivateKeyInfo;
use rand::rngs::OsRng;
use spki::SubjectPublicKeyInfoRef;
use der::asn1::ObjectIdentifier;
use der::Decode;

pub use ecdsa::{hash_to_scalar, scalar_from_bytes, EcdsaKey};
pub use gm::{Sm2Key, DEFAULT_DIST_ID};

use crate::error::CryptoError;
use crate::signature::{left_pad, SCALAR_LEN};
use crate::suite::Suite;

pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Named-curve OIDs carried in SubjectPublicKeyInfo parameters
pub const NIST_P256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub const SM2_CURVE_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.156.10197.1.301");

/// Length of an uncompressed SEC1 point: `04 ‖ X ‖ Y`
pub const UNCOMPRESSED_POINT_LEN: usize = 1 + 2 * SCALAR_LEN;

/// Operations every suite implementation provides
pub trait AsymmetricKey: Send + Sync {
    fn suite(&self) -> Suite;

    fn is_private(&self) -> bool;

    /// Hash with the suite hash and sign; plain DER `SEQUENCE{R,S}`
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Signature suitable for batch verification. Suites without batch
    /// support return a plain signature.
    fn sign_for_batch_verify(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Accepts both the plain and the rich DER encoding
    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError>;

    fn uncompressed_point(&self) -> [u8; UNCOMPRESSED_POINT_LEN];

    /// PKCS#8 for private keys, SubjectPublicKeyInfo for public keys
    fn to_der(&self) -> Result<Vec<u8>, CryptoError>;

    fn public_der(&self) -> Result<Vec<u8>, CryptoError>;

    fn to_pem(&self) -> &str;
}

/// An asymmetric key of either suite
#[derive(Clone)]
pub enum Key {
    EcdsaP256(EcdsaKey),
    Sm2(Sm2Key),
}

impl Key {
    /// Generate a fresh private key
    pub fn generate(suite: Suite) -> Result<Self, CryptoError> {
        match suite {
            Suite::EcdsaP256 => Ok(Key::EcdsaP256(EcdsaKey::generate(&mut OsRng)?)),
            Suite::Sm2 => Ok(Key::Sm2(Sm2Key::generate(&mut OsRng)?)),
        }
    }

    /// Parse a `PRIVATE KEY` (PKCS#8) or `PUBLIC KEY` (SPKI) PEM block
    pub fn from_pem(suite: Suite, pem: &[u8]) -> Result<Self, CryptoError> {
        let text = std::str::from_utf8(pem)
            .map_err(|e| CryptoError::MalformedKey(format!("PEM is not UTF-8: {e}")))?;
        let (label, der) =
            der::pem::decode_vec(pem).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let private = match label {
            PRIVATE_KEY_LABEL => true,
            PUBLIC_KEY_LABEL => false,
            other => return Err(CryptoError::UnknownPemLabel(other.to_string())),
        };
        let found = if private {
            pkcs8_suite(&der)?
        } else {
            spki_suite(&der)?
        };
        suite.expect(found)?;

        let text = text.trim_start().to_string();
        match (suite, private) {
            (Suite::EcdsaP256, true) => Ok(Key::EcdsaP256(EcdsaKey::from_pkcs8_der(&der, text)?)),
            (Suite::EcdsaP256, false) => Ok(Key::EcdsaP256(EcdsaKey::from_spki_der(&der, text)?)),
            (Suite::Sm2, true) => Ok(Key::Sm2(Sm2Key::from_pkcs8_der(&der, text)?)),
            (Suite::Sm2, false) => Ok(Key::Sm2(Sm2Key::from_spki_der(&der, text)?)),
        }
    }

    /// Parse a SubjectPublicKeyInfo, picking the suite from its curve OID
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        match spki_suite(der)? {
            Suite::EcdsaP256 => Ok(Key::EcdsaP256(EcdsaKey::from_public_der(der)?)),
            Suite::Sm2 => Ok(Key::Sm2(Sm2Key::from_public_der(der)?)),
        }
    }

    /// Decode the compact `xLen(2, LE) ‖ X ‖ yLen(2, LE) ‖ Y` public key
    pub fn from_buffer(suite: Suite, buffer: &[u8]) -> Result<Self, CryptoError> {
        let point = parse_point_buffer(buffer)?;
        match suite {
            Suite::EcdsaP256 => Ok(Key::EcdsaP256(EcdsaKey::from_sec1(&point)?)),
            Suite::Sm2 => Ok(Key::Sm2(Sm2Key::from_sec1(&point)?)),
        }
    }

    /// Encode the public point in the compact buffer form
    pub fn to_buffer(&self) -> Vec<u8> {
        let point = self.uncompressed_point();
        let mut out = Vec::with_capacity(4 + 2 * SCALAR_LEN);
        out.extend_from_slice(&(SCALAR_LEN as u16).to_le_bytes());
        out.extend_from_slice(&point[1..1 + SCALAR_LEN]);
        out.extend_from_slice(&(SCALAR_LEN as u16).to_le_bytes());
        out.extend_from_slice(&point[1 + SCALAR_LEN..]);
        out
    }

    /// The public half; a public key returns a copy of itself
    pub fn public_key(&self) -> Result<Key, CryptoError> {
        match self {
            Key::EcdsaP256(key) => Ok(Key::EcdsaP256(key.public_only()?)),
            Key::Sm2(key) => Ok(Key::Sm2(key.public_only()?)),
        }
    }

    pub fn as_ecdsa(&self) -> Option<&EcdsaKey> {
        match self {
            Key::EcdsaP256(key) => Some(key),
            Key::Sm2(_) => None,
        }
    }

    /// Two keys share a public point
    pub fn same_public(&self, other: &Key) -> bool {
        self.suite() == other.suite() && self.uncompressed_point() == other.uncompressed_point()
    }

    fn inner(&self) -> &dyn AsymmetricKey {
        match self {
            Key::EcdsaP256(key) => key,
            Key::Sm2(key) => key,
        }
    }
}

impl AsymmetricKey for Key {
    fn suite(&self) -> Suite {
        self.inner().suite()
    }

    fn is_private(&self) -> bool {
        self.inner().is_private()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner().sign(msg)
    }

    fn sign_for_batch_verify(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner().sign_for_batch_verify(msg)
    }

    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
        self.inner().verify(msg, sig)
    }

    fn uncompressed_point(&self) -> [u8; UNCOMPRESSED_POINT_LEN] {
        self.inner().uncompressed_point()
    }

    fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.inner().to_der()
    }

    fn public_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.inner().public_der()
    }

    fn to_pem(&self) -> &str {
        self.inner().to_pem()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("suite", &self.suite())
            .field("private", &self.is_private())
            .field("point", &hex::encode(self.uncompressed_point()))
            .finish()
    }
}

fn spki_suite(der: &[u8]) -> Result<Suite, CryptoError> {
    let info = SubjectPublicKeyInfoRef::from_der(der)?;
    let curve = info
        .algorithm
        .parameters_oid()
        .map_err(|e| CryptoError::MalformedKey(format!("missing curve parameters: {e}")))?;
    curve_suite(curve)
}

fn pkcs8_suite(der: &[u8]) -> Result<Suite, CryptoError> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let curve = info
        .algorithm
        .parameters_oid()
        .map_err(|e| CryptoError::MalformedKey(format!("missing curve parameters: {e}")))?;
    curve_suite(curve)
}

fn curve_suite(curve: ObjectIdentifier) -> Result<Suite, CryptoError> {
    if curve == NIST_P256_OID {
        Ok(Suite::EcdsaP256)
    } else if curve == SM2_CURVE_OID {
        Ok(Suite::Sm2)
    } else {
        Err(CryptoError::UnsupportedAlgorithm(format!("curve {curve}")))
    }
}

/// Returns the uncompressed SEC1 encoding of the buffered coordinates
fn parse_point_buffer(buffer: &[u8]) -> Result<[u8; UNCOMPRESSED_POINT_LEN], CryptoError> {
    let truncated = |what: &str| CryptoError::MalformedKey(format!("key buffer truncated: {what}"));
    if buffer.len() <= 2 {
        return Err(truncated("no x length"));
    }
    let x_len = u16::from_le_bytes([buffer[0], buffer[1]]) as usize;
    if buffer.len() < x_len + 2 {
        return Err(truncated("x coordinate"));
    }
    if buffer.len() <= x_len + 4 {
        return Err(truncated("no y length"));
    }
    let y_len = u16::from_le_bytes([buffer[x_len + 2], buffer[x_len + 3]]) as usize;
    if buffer.len() < x_len + y_len + 4 {
        return Err(truncated("y coordinate"));
    }
    let x = left_pad(&buffer[2..2 + x_len])
        .map_err(|_| CryptoError::MalformedKey("x coordinate too long".into()))?;
    let y = left_pad(&buffer[4 + x_len..4 + x_len + y_len])
        .map_err(|_| CryptoError::MalformedKey("y coordinate too long".into()))?;

    let mut point = [0u8; UNCOMPRESSED_POINT_LEN];
    point[0] = 0x04;
    point[1..1 + SCALAR_LEN].copy_from_slice(&x);
    point[1 + SCALAR_LEN..].copy_from_slice(&y);
    Ok(point)
}
