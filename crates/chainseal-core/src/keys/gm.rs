use sm2::dsa::{Signature, SigningKey, VerifyingKey};
use sm2::elliptic_curve::rand_core::CryptoRngCore;
use sm2::elliptic_curve::sec1::ToEncodedPoint;
use sm2::elliptic_curve::{Field, PrimeField};
use sm2::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use sm2::{FieldBytes, PublicKey, Scalar, SecretKey};
use signature::{Signer, Verifier};
use tracing::debug;

use super::{AsymmetricKey, UNCOMPRESSED_POINT_LEN};
use crate::error::CryptoError;
use crate::signature::{EcSignature, SCALAR_LEN};
use crate::suite::Suite;

/// Distinguishing identifier mixed into the SM2 `Z` digest
pub const DEFAULT_DIST_ID: &str = "1234567812345678";

/// SM2 signature key; messages are hashed as `SM3(Z ‖ msg)`
#[derive(Clone)]
pub struct Sm2Key {
    secret: Option<SecretKey>,
    public: PublicKey,
    pem: String,
}

impl Sm2Key {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, CryptoError> {
        let secret = SecretKey::random(rng);
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Sm2Key {
            public: secret.public_key(),
            secret: Some(secret),
            pem: pem.as_str().to_owned(),
        })
    }

    pub(super) fn from_pkcs8_der(der: &[u8], pem: String) -> Result<Self, CryptoError> {
        let secret =
            SecretKey::from_pkcs8_der(der).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Sm2Key {
            public: secret.public_key(),
            secret: Some(secret),
            pem,
        })
    }

    pub(super) fn from_spki_der(der: &[u8], pem: String) -> Result<Self, CryptoError> {
        let public = PublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Sm2Key {
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
            .map_err(|_| CryptoError::MalformedKey("point is not on the SM2 curve".into()))?;
        Self::from_public(public)
    }

    fn from_public(public: PublicKey) -> Result<Self, CryptoError> {
        let pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Sm2Key {
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
}

fn in_range(bytes: &[u8; SCALAR_LEN]) -> bool {
    Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*bytes)))
        .map(|scalar| !bool::from(scalar.is_zero()))
        .unwrap_or(false)
}

impl AsymmetricKey for Sm2Key {
    fn suite(&self) -> Suite {
        Suite::Sm2
    }

    fn is_private(&self) -> bool {
        self.secret.is_some()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let secret = self.secret.as_ref().ok_or(CryptoError::PublicKeyCannotSign)?;
        let signing_key = SigningKey::new(DEFAULT_DIST_ID, secret)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let signature: Signature = signing_key
            .try_sign(msg)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; SCALAR_LEN];
        let mut s = [0u8; SCALAR_LEN];
        r.copy_from_slice(&bytes[..SCALAR_LEN]);
        s.copy_from_slice(&bytes[SCALAR_LEN..]);
        EcSignature::new(r, s).to_der()
    }

    /// SM2 signatures carry no ephemeral point; the plain form is returned
    fn sign_for_batch_verify(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.sign(msg)
    }

    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
        let decoded = EcSignature::from_der(sig)?;
        if !in_range(&decoded.r) || !in_range(&decoded.s) {
            debug!("SM2 signature rejected: scalar out of range");
            return Err(CryptoError::ScalarOutOfRange);
        }
        let signature = Signature::from_slice(&decoded.to_fixed_bytes())
            .map_err(|_| CryptoError::ScalarOutOfRange)?;
        let verifying_key = VerifyingKey::new(DEFAULT_DIST_ID, self.public)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        verifying_key
            .verify(msg, &signature)
            .map_err(|e| {
                debug!("SM2 signature rejected: {}", e);
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
