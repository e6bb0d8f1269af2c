//! Chainseal PKI - certificates, chain validation and signing identities
//!
//! Certificates are issued and parsed for either suite through a
//! [`CryptoSuite`], validated leaf-to-root against a pool of trusted roots,
//! and bound to a private key as an [`Identity`].

pub mod cert;
pub mod error;
pub mod factory;
pub mod identity;
pub mod issue;

pub use cert::{signature_oid, Cert, CertBasicInfo, MAX_CHAIN_DEPTH};
pub use error::PkiError;
pub use factory::{CertFactory, CryptoSuite, KeyFactory};
pub use identity::Identity;
pub use issue::{issue, Profile};
