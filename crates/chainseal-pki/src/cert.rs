use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chainseal_batch::BatchVerifier;
use chainseal_core::{AsymmetricKey, Key, Suite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{Decode, DecodeOwned, Encode, EncodePem};
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::PkiError;

pub const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
pub const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
pub const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
pub const OID_PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
pub const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

pub const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
pub const OID_SM2_WITH_SM3: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.156.10197.1.501");

/// Longest issuer chain followed during validation
pub const MAX_CHAIN_DEPTH: usize = 8;

/// anyExtendedKeyUsage
const OID_ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// Extensions the chain walk understands; any other critical one fails it
const KNOWN_EXTENSIONS: [ObjectIdentifier; 6] = [
    BasicConstraints::OID,
    KeyUsage::OID,
    ExtendedKeyUsage::OID,
    SubjectAltName::OID,
    SubjectKeyIdentifier::OID,
    AuthorityKeyIdentifier::OID,
];

pub fn signature_oid(suite: Suite) -> ObjectIdentifier {
    match suite {
        Suite::EcdsaP256 => OID_ECDSA_WITH_SHA256,
        Suite::Sm2 => OID_SM2_WITH_SM3,
    }
}

/// Subject fields and lifetime of a certificate to issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertBasicInfo {
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub organizational_unit: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub locality: String,
    pub common_name: String,
    pub validation_years: u32,
    /// pathLenConstraint for CA certificates; ignored for leaves
    #[serde(default)]
    pub max_path_len: Option<u8>,
}

impl CertBasicInfo {
    pub fn new(common_name: impl Into<String>, organization: impl Into<String>, years: u32) -> Self {
        CertBasicInfo {
            organization: organization.into(),
            common_name: common_name.into(),
            validation_years: years,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PkiError> {
        if self.common_name.trim().is_empty() {
            return Err(PkiError::InvalidInfo("common name is empty".into()));
        }
        if self.validation_years == 0 {
            return Err(PkiError::InvalidInfo("validation years must be positive".into()));
        }
        Ok(())
    }
}

/// An X.509 certificate together with the intermediates it was issued
/// under (the self-signed root is never carried).
#[derive(Clone)]
pub struct Cert {
    certificate: Certificate,
    der: Vec<u8>,
    public_key: Key,
    chain: Vec<Certificate>,
}

impl Cert {
    pub fn from_certificate(
        certificate: Certificate,
        chain: Vec<Certificate>,
    ) -> Result<Self, PkiError> {
        let der = certificate.to_der()?;
        let spki = certificate.tbs_certificate.subject_public_key_info.to_der()?;
        let public_key = Key::from_spki_der(&spki)?;
        Ok(Cert {
            certificate,
            der,
            public_key,
            chain,
        })
    }

    pub fn from_der(der: &[u8]) -> Result<Self, PkiError> {
        Self::from_certificate(Certificate::from_der(der)?, Vec::new())
    }

    /// Parse one or more CERTIFICATE blocks; the first is the leaf and the
    /// rest its intermediates.
    pub fn from_pem(pem: &[u8]) -> Result<Self, PkiError> {
        let mut blocks = Certificate::load_pem_chain(pem)?.into_iter();
        let leaf = blocks
            .next()
            .ok_or_else(|| PkiError::InvalidCertificate("no CERTIFICATE block".into()))?;
        Self::from_certificate(leaf, blocks.collect())
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn suite(&self) -> Suite {
        self.public_key.suite()
    }

    pub fn public_key(&self) -> &Key {
        &self.public_key
    }

    /// SubjectPublicKeyInfo DER of the embedded key
    pub fn der_public_key(&self) -> Result<Vec<u8>, PkiError> {
        Ok(self
            .certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()?)
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> Result<String, PkiError> {
        Ok(self.certificate.to_pem(LineEnding::LF)?)
    }

    /// The leaf followed by every carried intermediate
    pub fn chain_pem(&self) -> Result<String, PkiError> {
        let mut out = self.to_pem()?;
        for intermediate in &self.chain {
            out.push_str(&intermediate.to_pem(LineEnding::LF)?);
        }
        Ok(out)
    }

    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.certificate.tbs_certificate.issuer
    }

    pub fn common_name(&self) -> Option<String> {
        attribute(self.subject(), OID_COMMON_NAME)
    }

    pub fn organization(&self) -> Option<String> {
        attribute(self.subject(), OID_ORGANIZATION)
    }

    pub fn organizational_unit(&self) -> Option<String> {
        attribute(self.subject(), OID_ORGANIZATIONAL_UNIT)
    }

    pub fn country(&self) -> Option<String> {
        attribute(self.subject(), OID_COUNTRY)
    }

    pub fn province(&self) -> Option<String> {
        attribute(self.subject(), OID_PROVINCE)
    }

    pub fn locality(&self) -> Option<String> {
        attribute(self.subject(), OID_LOCALITY)
    }

    pub fn issuer_common_name(&self) -> Option<String> {
        attribute(self.issuer(), OID_COMMON_NAME)
    }

    /// Serial number in decimal
    pub fn serial_number(&self) -> String {
        let bytes = self.certificate.tbs_certificate.serial_number.as_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let trimmed = &bytes[start..];
        if trimmed.len() > 16 {
            return hex::encode(trimmed);
        }
        let mut buf = [0u8; 16];
        buf[16 - trimmed.len()..].copy_from_slice(trimmed);
        u128::from_be_bytes(buf).to_string()
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        to_datetime(self.certificate.tbs_certificate.validity.not_before.to_unix_duration())
    }

    pub fn expire_time(&self) -> DateTime<Utc> {
        to_datetime(self.certificate.tbs_certificate.validity.not_after.to_unix_duration())
    }

    pub fn is_valid_at(&self, time: SystemTime) -> bool {
        within_validity(&self.certificate, time)
    }

    pub fn is_ca(&self) -> bool {
        is_ca_certificate(&self.certificate)
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        extension::<KeyUsage>(&self.certificate)
    }

    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        extension::<SubjectKeyIdentifier>(&self.certificate).map(|ski| ski.0.as_bytes().to_vec())
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject() == self.issuer()
    }

    /// Hex of the suite hash over the DER encoding
    pub fn fingerprint(&self) -> String {
        self.suite().hash(&self.der).to_hex()
    }

    /// Verify a signature made by the certified key
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), PkiError> {
        Ok(self.public_key.verify(msg, sig)?)
    }

    /// Batch-verify rich signatures made by the certified key
    pub fn verify_batch<M, S>(
        &self,
        engine: &BatchVerifier,
        msgs: &[M],
        sigs: &[S],
    ) -> Result<(), PkiError>
    where
        M: AsRef<[u8]>,
        S: AsRef<[u8]>,
    {
        if !self.suite().supports_batch_verify() {
            return Err(PkiError::BatchUnsupported(self.suite()));
        }
        Ok(engine.verify(&self.public_key, msgs, sigs)?)
    }

    /// Validate against `roots` using the carried intermediates. Returns the
    /// organization of the root that anchors the chain.
    pub fn check_validation(&self, roots: &[Cert]) -> Result<String, PkiError> {
        self.check_validation_with_intermediates(roots, &[])
    }

    pub fn check_validation_with_intermediates(
        &self,
        roots: &[Cert],
        intermediates: &[Cert],
    ) -> Result<String, PkiError> {
        if roots.is_empty() {
            return Err(PkiError::EmptyRoots);
        }
        let pool: Vec<&Certificate> = self
            .chain
            .iter()
            .chain(intermediates.iter().map(|c| &c.certificate))
            .collect();

        match find_root(&self.certificate, &pool, roots, SystemTime::now(), 0, 0) {
            Some(root) => Ok(root.organization().unwrap_or_default()),
            None => Err(PkiError::Untrusted(
                self.common_name().unwrap_or_else(|| "<no common name>".into()),
            )),
        }
    }
}

impl fmt::Debug for Cert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cert")
            .field("subject", &self.common_name())
            .field("issuer", &self.issuer_common_name())
            .field("suite", &self.suite())
            .field("ca", &self.is_ca())
            .field("chain", &self.chain.len())
            .finish()
    }
}

fn attribute(name: &Name, oid: ObjectIdentifier) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_owned)
}

fn to_datetime(since_epoch: Duration) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(since_epoch.as_secs() as i64, 0).unwrap_or_default()
}

pub(crate) fn extension<T: DecodeOwned + AssociatedOid>(certificate: &Certificate) -> Option<T> {
    certificate
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == T::OID)
        .and_then(|ext| T::from_der(ext.extn_value.as_bytes()).ok())
}

fn is_ca_certificate(certificate: &Certificate) -> bool {
    extension::<BasicConstraints>(certificate)
        .map(|bc| bc.ca)
        .unwrap_or(false)
}

fn within_validity(certificate: &Certificate, time: SystemTime) -> bool {
    let now = match time.duration_since(UNIX_EPOCH) {
        Ok(now) => now,
        Err(_) => return false,
    };
    let validity = &certificate.tbs_certificate.validity;
    validity.not_before.to_unix_duration() <= now && now <= validity.not_after.to_unix_duration()
}

fn is_self_issued(certificate: &Certificate) -> bool {
    certificate.tbs_certificate.subject == certificate.tbs_certificate.issuer
}

fn has_unknown_critical_extension(certificate: &Certificate) -> bool {
    let unknown = certificate
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.critical && !KNOWN_EXTENSIONS.contains(&ext.extn_id));
    if let Some(ext) = unknown {
        debug!("Unsupported critical extension {}", ext.extn_id);
        return true;
    }
    false
}

/// A child's extended key usages must be a subset of its issuer's
fn extended_usage_allowed(child: &Certificate, parent: &Certificate) -> bool {
    let (Some(child_eku), Some(parent_eku)) = (
        extension::<ExtendedKeyUsage>(child),
        extension::<ExtendedKeyUsage>(parent),
    ) else {
        return true;
    };
    parent_eku.0.contains(&OID_ANY_EXTENDED_KEY_USAGE)
        || child_eku.0.iter().all(|usage| parent_eku.0.contains(usage))
}

/// `parent` signed `child` and may sign certificates with `intermediates`
/// non-self-issued CA certificates below it.
fn issued_by(child: &Certificate, parent: &Certificate, intermediates: usize) -> bool {
    if child.tbs_certificate.issuer != parent.tbs_certificate.subject {
        return false;
    }
    let constraints = match extension::<BasicConstraints>(parent) {
        Some(bc) if bc.ca => bc,
        _ => {
            debug!("Candidate issuer is not a CA");
            return false;
        }
    };
    if let Some(max) = constraints.path_len_constraint {
        if intermediates > usize::from(max) {
            debug!(
                "Path length {} exceeds issuer constraint {}",
                intermediates, max
            );
            return false;
        }
    }
    if let Some(usage) = extension::<KeyUsage>(parent) {
        if !usage.key_cert_sign() {
            debug!("Candidate issuer lacks keyCertSign");
            return false;
        }
    }
    if !extended_usage_allowed(child, parent) {
        debug!("Extended key usage not permitted by issuer");
        return false;
    }

    let key = match parent
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(PkiError::from)
        .and_then(|spki| Key::from_spki_der(&spki).map_err(PkiError::from))
    {
        Ok(key) => key,
        Err(e) => {
            debug!("Unusable issuer key: {}", e);
            return false;
        }
    };
    if child.signature_algorithm.oid != signature_oid(key.suite()) {
        debug!("Signature algorithm does not match issuer suite");
        return false;
    }
    let tbs = match child.tbs_certificate.to_der() {
        Ok(tbs) => tbs,
        Err(_) => return false,
    };
    match key.verify(&tbs, child.signature.raw_bytes()) {
        Ok(()) => true,
        Err(e) => {
            debug!("Issuer signature rejected: {}", e);
            false
        }
    }
}

/// Depth-first search from `certificate` towards a trusted root.
/// `intermediates` counts the non-self-issued CA certificates between the
/// target and `certificate`'s issuer.
fn find_root<'r>(
    certificate: &Certificate,
    pool: &[&Certificate],
    roots: &'r [Cert],
    now: SystemTime,
    depth: usize,
    intermediates: usize,
) -> Option<&'r Cert> {
    if depth > MAX_CHAIN_DEPTH
        || !within_validity(certificate, now)
        || has_unknown_critical_extension(certificate)
    {
        return None;
    }
    for root in roots {
        if root.certificate == *certificate {
            return Some(root);
        }
        if within_validity(&root.certificate, now)
            && !has_unknown_critical_extension(&root.certificate)
            && issued_by(certificate, &root.certificate, intermediates)
        {
            return Some(root);
        }
    }
    for parent in pool {
        if *parent == certificate || !issued_by(certificate, parent, intermediates) {
            continue;
        }
        let above = if is_self_issued(parent) {
            intermediates
        } else {
            intermediates + 1
        };
        if let Some(root) = find_root(parent, pool, roots, now, depth + 1, above) {
            return Some(root);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{issue, Profile};
    use x509_cert::der::asn1::{BitString, OctetString};
    use x509_cert::ext::Extension;

    fn root(suite: Suite) -> (Key, Cert) {
        let key = Key::generate(suite).unwrap();
        let cert = issue(&CertBasicInfo::new("root", "org1", 1), &key, &key, None, Profile::Root)
            .unwrap();
        (key, cert)
    }

    #[test]
    fn test_basic_info_defaults() {
        let info: CertBasicInfo =
            serde_json::from_str(r#"{"common_name":"peer0","validation_years":3}"#).unwrap();
        assert_eq!(info.common_name, "peer0");
        assert!(info.organization.is_empty());
        assert!(info.validate().is_ok());
        assert!(CertBasicInfo::new("  ", "org", 1).validate().is_err());
    }

    #[test]
    fn test_der_round_trip() {
        let (_, cert) = root(Suite::Sm2);
        let parsed = Cert::from_der(cert.to_der()).unwrap();
        assert_eq!(parsed.suite(), Suite::Sm2);
        assert_eq!(parsed.serial_number(), cert.serial_number());
        assert_eq!(parsed.fingerprint(), cert.fingerprint());
        assert!(parsed.is_self_signed());
    }

    #[test]
    fn test_same_name_different_key_rejected() {
        let (_, cert) = root(Suite::EcdsaP256);
        let (_, other) = root(Suite::EcdsaP256);
        // same subject and issuer names, different keys
        assert!(!issued_by(cert.certificate(), other.certificate(), 0));
        assert!(issued_by(cert.certificate(), cert.certificate(), 0));

        assert!(cert.check_validation(&[other.clone()]).is_err());
        assert_eq!(cert.check_validation(&[other, cert.clone()]).unwrap(), "org1");
    }

    fn with_extension(cert: &Cert, critical: bool, signer: &Key) -> Cert {
        let mut certificate = cert.certificate().clone();
        certificate
            .tbs_certificate
            .extensions
            .get_or_insert_with(Vec::new)
            .push(Extension {
                extn_id: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1"),
                critical,
                extn_value: OctetString::new(vec![0x05, 0x00]).unwrap(),
            });
        let tbs = certificate.tbs_certificate.to_der().unwrap();
        certificate.signature = BitString::from_bytes(&signer.sign(&tbs).unwrap()).unwrap();
        Cert::from_certificate(certificate, Vec::new()).unwrap()
    }

    #[test]
    fn test_unknown_critical_extension_rejected() {
        for suite in [Suite::EcdsaP256, Suite::Sm2] {
            let (key, cert) = root(suite);
            let critical = with_extension(&cert, true, &key);
            assert!(critical.check_validation(&[cert.clone()]).is_err());
            assert!(critical.check_validation(&[critical.clone()]).is_err());

            let non_critical = with_extension(&cert, false, &key);
            assert_eq!(non_critical.check_validation(&[cert.clone()]).unwrap(), "org1");
        }
    }

    #[test]
    fn test_extended_usage_must_narrow() {
        let (key, cert) = root(Suite::EcdsaP256);
        let mut child = cert.certificate().clone();
        let parent_eku = extension::<ExtendedKeyUsage>(&child).unwrap();
        assert!(extended_usage_allowed(&child, cert.certificate()));

        let wider = ExtendedKeyUsage(
            parent_eku
                .0
                .iter()
                .copied()
                .chain([ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3")])
                .collect(),
        );
        for ext in child.tbs_certificate.extensions.iter_mut().flatten() {
            if ext.extn_id == ExtendedKeyUsage::OID {
                ext.extn_value = OctetString::new(wider.to_der().unwrap()).unwrap();
            }
        }
        let tbs = child.tbs_certificate.to_der().unwrap();
        child.signature = BitString::from_bytes(&key.sign(&tbs).unwrap()).unwrap();
        assert!(!extended_usage_allowed(&child, cert.certificate()));
        assert!(!issued_by(&child, cert.certificate(), 0));
    }

    #[test]
    fn test_expired_window() {
        let (_, cert) = root(Suite::EcdsaP256);
        assert!(!within_validity(cert.certificate(), UNIX_EPOCH));
        assert!(within_validity(cert.certificate(), SystemTime::now()));
    }

    #[test]
    fn test_debug_shows_subject() {
        let (_, cert) = root(Suite::EcdsaP256);
        let debug = format!("{:?}", cert);
        assert!(debug.contains("root"));
        assert!(debug.contains("ca: true"));
    }
}
