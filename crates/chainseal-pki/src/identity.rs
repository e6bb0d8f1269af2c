use std::fs;
use std::path::Path;

use chainseal_core::{AsymmetricKey, Digest32, Key, Suite};
use tracing::info;

use crate::cert::Cert;
use crate::error::PkiError;
use crate::factory::CryptoSuite;

/// A private key bound to the certificate that certifies it
#[derive(Debug, Clone)]
pub struct Identity {
    suite: CryptoSuite,
    key: Key,
    cert: Cert,
}

impl Identity {
    pub fn from_pem(algorithm: &str, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, PkiError> {
        let suite = CryptoSuite::new(algorithm)?;
        let cert = suite.certs.cert_from_pem(cert_pem)?;
        let key = suite.keys.key_from_pem(key_pem)?;
        if !key.is_private() {
            return Err(PkiError::InvalidInfo("identity key must be private".into()));
        }
        if !key.same_public(cert.public_key()) {
            return Err(PkiError::KeyMismatch);
        }
        Ok(Identity { suite, key, cert })
    }

    pub fn from_files(
        algorithm: &str,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, PkiError> {
        let cert_pem = fs::read(cert_path.as_ref())?;
        let key_pem = fs::read(key_path.as_ref())?;
        let identity = Self::from_pem(algorithm, &cert_pem, &key_pem)?;
        info!(
            "Loaded identity {} from {}",
            identity.common_name(),
            cert_path.as_ref().display()
        );
        Ok(identity)
    }

    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, PkiError> {
        Ok(self.key.sign(msg)?)
    }

    pub fn sign_for_batch_verify(&self, msg: &[u8]) -> Result<Vec<u8>, PkiError> {
        Ok(self.key.sign_for_batch_verify(msg)?)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn certificate(&self) -> &Cert {
        &self.cert
    }

    pub fn certificate_pem(&self) -> Result<String, PkiError> {
        self.cert.chain_pem()
    }

    pub fn common_name(&self) -> String {
        self.cert.common_name().unwrap_or_default()
    }

    pub fn org(&self) -> String {
        self.cert.organization().unwrap_or_default()
    }

    pub fn suite(&self) -> Suite {
        self.suite.suite()
    }

    pub fn hash(&self, msg: &[u8]) -> Digest32 {
        self.suite.hash(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertBasicInfo;

    fn root(algorithm: &str) -> (Key, Cert) {
        let suite = CryptoSuite::new(algorithm).unwrap();
        let key = suite.keys.generate_key().unwrap();
        let cert = suite
            .certs
            .generate_self_sign_cert(&CertBasicInfo::new("org1.example", "org1", 1), &key)
            .unwrap();
        (key, cert)
    }

    #[test]
    fn test_identity_signs_for_certificate() {
        for algorithm in ["ecdsa_with_sha256", "sm2_with_sm3"] {
            let (key, cert) = root(algorithm);
            let identity = Identity::from_pem(
                algorithm,
                cert.to_pem().unwrap().as_bytes(),
                key.to_pem().as_bytes(),
            )
            .unwrap();

            assert_eq!(identity.common_name(), "org1.example");
            assert_eq!(identity.org(), "org1");
            let sig = identity.sign(b"tx").unwrap();
            identity.certificate().verify(b"tx", &sig).unwrap();
        }
    }

    #[test]
    fn test_identity_rejects_foreign_key() {
        let (_, cert) = root("ecdsa_with_sha256");
        let other = Key::generate(Suite::EcdsaP256).unwrap();
        let err = Identity::from_pem(
            "ecdsa_with_sha256",
            cert.to_pem().unwrap().as_bytes(),
            other.to_pem().as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiError::KeyMismatch));
    }

    #[test]
    fn test_identity_rejects_public_key() {
        let (key, cert) = root("sm2_with_sm3");
        let public = key.public_key().unwrap();
        assert!(Identity::from_pem(
            "sm2_with_sm3",
            cert.to_pem().unwrap().as_bytes(),
            public.to_pem().as_bytes(),
        )
        .is_err());
    }

    #[test]
    fn test_identity_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (key, cert) = root("ecdsa_with_sha256");
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
        std::fs::write(&key_path, key.to_pem()).unwrap();

        let identity = Identity::from_files("ecdsa_with_sha256", &cert_path, &key_path).unwrap();
        assert_eq!(identity.suite(), Suite::EcdsaP256);
        let sig = identity.sign_for_batch_verify(b"batched").unwrap();
        identity.certificate().verify(b"batched", &sig).unwrap();
    }

    #[test]
    fn test_missing_files() {
        let err = Identity::from_files("ecdsa_with_sha256", "/nonexistent/c", "/nonexistent/k")
            .unwrap_err();
        assert!(matches!(err, PkiError::Io(_)));
    }
}
