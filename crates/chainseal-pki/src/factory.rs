//! Suite-bound entry points for keys and certificates.

use std::str::FromStr;

use chainseal_core::{AsymmetricKey, CryptoError, Digest32, Key, Suite};

use crate::cert::{Cert, CertBasicInfo};
use crate::error::PkiError;
use crate::issue::{issue, Profile};

/// Key and certificate factories for one signature suite
#[derive(Debug, Clone, Copy)]
pub struct CryptoSuite {
    pub keys: KeyFactory,
    pub certs: CertFactory,
}

impl CryptoSuite {
    /// Select a suite by name (`ecdsa_with_sha256` or `sm2_with_sm3`)
    pub fn new(algorithm: &str) -> Result<Self, CryptoError> {
        Ok(Self::for_suite(Suite::from_str(algorithm)?))
    }

    pub fn for_suite(suite: Suite) -> Self {
        CryptoSuite {
            keys: KeyFactory { suite },
            certs: CertFactory { suite },
        }
    }

    pub fn suite(&self) -> Suite {
        self.keys.suite
    }

    pub fn hash(&self, msg: &[u8]) -> Digest32 {
        self.suite().hash(msg)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyFactory {
    suite: Suite,
}

impl KeyFactory {
    pub fn generate_key(&self) -> Result<Key, CryptoError> {
        Key::generate(self.suite)
    }

    pub fn key_from_pem(&self, pem: &[u8]) -> Result<Key, CryptoError> {
        Key::from_pem(self.suite, pem)
    }

    pub fn key_from_buffer(&self, buffer: &[u8]) -> Result<Key, CryptoError> {
        Key::from_buffer(self.suite, buffer)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CertFactory {
    suite: Suite,
}

impl CertFactory {
    fn check_key(&self, key: &Key) -> Result<(), PkiError> {
        Ok(self.suite.expect(key.suite())?)
    }

    fn check_cert(&self, cert: &Cert) -> Result<(), PkiError> {
        Ok(self.suite.expect(cert.suite())?)
    }

    /// Self-signed root CA for `key`
    pub fn generate_self_sign_cert(
        &self,
        info: &CertBasicInfo,
        key: &Key,
    ) -> Result<Cert, PkiError> {
        self.check_key(key)?;
        issue(info, key, key, None, Profile::Root)
    }

    /// Intermediate CA for `pub_key`, signed by the parent CA
    pub fn generate_middle_ca_cert(
        &self,
        info: &CertBasicInfo,
        pub_key: &Key,
        ca_priv_key: &Key,
        ca_cert: &Cert,
    ) -> Result<Cert, PkiError> {
        self.check_key(pub_key)?;
        self.check_key(ca_priv_key)?;
        self.check_cert(ca_cert)?;
        issue(info, pub_key, ca_priv_key, Some(ca_cert), Profile::Intermediate)
    }

    /// End-entity certificate for `pub_key`
    pub fn generate_cert(
        &self,
        info: &CertBasicInfo,
        pub_key: &Key,
        ca_priv_key: &Key,
        ca_cert: &Cert,
    ) -> Result<Cert, PkiError> {
        self.check_key(pub_key)?;
        self.check_key(ca_priv_key)?;
        self.check_cert(ca_cert)?;
        issue(info, pub_key, ca_priv_key, Some(ca_cert), Profile::Leaf)
    }

    pub fn cert_from_pem(&self, pem: &[u8]) -> Result<Cert, PkiError> {
        let cert = Cert::from_pem(pem)?;
        self.check_cert(&cert)?;
        Ok(cert)
    }
}
