use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::group::Curve;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::point::AffineCoordinates;
use p256::elliptic_curve::rand_core::CryptoRngCore;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::elliptic_curve::{Field, PrimeField};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey, U256};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use signature::{Signer, Verifier};
use tracing::debug;

use super::{AsymmetricKey, UNCOMPRESSED_POINT_LEN};
use crate::error::CryptoError;
use crate::signature::{EcSignature, SCALAR_LEN};
use crate::suite::Suite;

/// ECDSA key over NIST P-256
#[derive(Clone)]
pub struct EcdsaKey {
    secret: Option<SecretKey>,
    public: PublicKey,
    pem: String,
}

impl EcdsaKey {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, CryptoError> {
        let secret = SecretKey::random(rng);
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(EcdsaKey {
            public: secret.public_key(),
            secret: Some(secret),
            pem: pem.as_str().to_owned(),
        })
    }

    pub(super) fn from_pkcs8_der(der: &[u8], pem: String) -> Result<Self, CryptoError> {
        let secret =
            SecretKey::from_pkcs8_der(der).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(EcdsaKey {
            public: secret.public_key(),
            secret: Some(secret),
            pem,
        })
    }

    pub(super) fn from_spki_der(der: &[u8], pem: String) -> Result<Self, CryptoError> {
        let public = PublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(EcdsaKey {
            secret: None,
            public,
            pem,
        })
    }

    pub(super) fn from_public_der(der: &[u8]) -> Result<Self, CryptoError> {
        let public = PublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Self::from_public(public)
    }

    pub(super) fn from_sec1(point: &[u8]) -> Result<Self, CryptoError> {
        let public = PublicKey::from_sec1_bytes(point)
            .map_err(|_| CryptoError::MalformedKey("point is not on P-256".into()))?;
        Self::from_public(public)
    }

    fn from_public(public: PublicKey) -> Result<Self, CryptoError> {
        let pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(EcdsaKey {
            secret: None,
            public,
            pem,
        })
    }

    pub(super) fn public_only(&self) -> Result<Self, CryptoError> {
        if self.secret.is_none() {
            return Ok(self.clone());
        }
        Self::from_public(self.public)
    }

    /// The public point in projective form, for curve arithmetic
    pub fn public_point(&self) -> ProjectivePoint {
        self.public.to_projective()
    }

    /// Sign and keep the ephemeral point `R = k·G` alongside `(r, s)`
    pub fn sign_rich(&self, msg: &[u8]) -> Result<EcSignature, CryptoError> {
        let secret = self.secret.as_ref().ok_or(CryptoError::PublicKeyCannotSign)?;
        let d = secret.to_nonzero_scalar();
        let e = hash_to_scalar(&Sha256::digest(msg));

        loop {
            let k = NonZeroScalar::random(&mut OsRng);
            let big_r = (ProjectivePoint::GENERATOR * *k).to_affine();
            let r = <Scalar as Reduce<U256>>::reduce_bytes(&big_r.x());
            if bool::from(r.is_zero()) {
                continue;
            }
            let k_inv = Option::<Scalar>::from(Scalar::invert(&k))
                .ok_or_else(|| CryptoError::Signing("nonce has no inverse".into()))?;
            let s = k_inv * (e + r * *d);
            if bool::from(s.is_zero()) {
                continue;
            }

            let encoded = big_r.to_encoded_point(false);
            let (rx, ry) = match (encoded.x(), encoded.y()) {
                (Some(x), Some(y)) => (*x, *y),
                _ => return Err(CryptoError::Signing("ephemeral point at infinity".into())),
            };
            return Ok(EcSignature::new(r.to_repr().into(), s.to_repr().into())
                .with_point(rx.into(), ry.into()));
        }
    }
}

/// Interpret the leading 32 bytes of a digest as an integer mod N
pub fn hash_to_scalar(digest: &[u8]) -> Scalar {
    let mut bytes = FieldBytes::default();
    let take = digest.len().min(SCALAR_LEN);
    bytes[SCALAR_LEN - take..].copy_from_slice(&digest[..take]);
    <Scalar as Reduce<U256>>::reduce_bytes(&bytes)
}

/// A scalar in `[1, N)`, or `None` when the value is zero or not reduced
pub fn scalar_from_bytes(bytes: &[u8; SCALAR_LEN]) -> Option<Scalar> {
    let scalar = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*bytes)))?;
    if bool::from(scalar.is_zero()) {
        None
    } else {
        Some(scalar)
    }
}

impl AsymmetricKey for EcdsaKey {
    fn suite(&self) -> Suite {
        Suite::EcdsaP256
    }

    fn is_private(&self) -> bool {
        self.secret.is_some()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let secret = self.secret.as_ref().ok_or(CryptoError::PublicKeyCannotSign)?;
        let signing_key = SigningKey::from(secret);
        let signature: Signature = signing_key
            .try_sign(msg)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let (r, s) = signature.split_bytes();
        EcSignature::new(r.into(), s.into()).to_der()
    }

    fn sign_for_batch_verify(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.sign_rich(msg)?.to_der()
    }

    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
        let decoded = EcSignature::from_der(sig)?;
        if scalar_from_bytes(&decoded.r).is_none() || scalar_from_bytes(&decoded.s).is_none() {
            debug!("ECDSA signature rejected: scalar out of range");
            return Err(CryptoError::ScalarOutOfRange);
        }
        let signature = Signature::from_scalars(decoded.r, decoded.s)
            .map_err(|_| CryptoError::ScalarOutOfRange)?;
        VerifyingKey::from(&self.public)
            .verify(msg, &signature)
            .map_err(|e| {
                debug!("ECDSA signature rejected: {}", e);
                CryptoError::InvalidSignature
            })
    }

    fn uncompressed_point(&self) -> [u8; UNCOMPRESSED_POINT_LEN] {
        let mut out = [0u8; UNCOMPRESSED_POINT_LEN];
        out.copy_from_slice(self.public.to_encoded_point(false).as_bytes());
        out
    }

    fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        match &self.secret {
            Some(secret) => secret
                .to_pkcs8_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::MalformedKey(e.to_string())),
            None => self.public_der(),
        }
    }

    fn public_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }

    fn to_pem(&self) -> &str {
        &self.pem
    }
}
