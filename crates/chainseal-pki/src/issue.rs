//! Building and signing X.509 v3 certificates for either suite.

use std::time::Duration;

use chainseal_core::{AsymmetricKey, CryptoError, Key, Suite};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::der::asn1::{Any, BitString, Ia5String, ObjectIdentifier, OctetString, SetOfVec};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::{Decode, Encode, Tag};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::cert::{
    signature_oid, Cert, CertBasicInfo, OID_COMMON_NAME, OID_COUNTRY, OID_LOCALITY,
    OID_ORGANIZATION, OID_ORGANIZATIONAL_UNIT, OID_PROVINCE,
};
use crate::error::PkiError;

const OID_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
const OID_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Root,
    Intermediate,
    Leaf,
}

impl Profile {
    fn is_ca(&self) -> bool {
        !matches!(self, Profile::Leaf)
    }
}

/// Issue a certificate for `subject_key`, signed by `signer`. Roots pass no
/// issuer and must be signed by the subject's own key.
pub fn issue(
    info: &CertBasicInfo,
    subject_key: &Key,
    signer: &Key,
    issuer: Option<&Cert>,
    profile: Profile,
) -> Result<Cert, PkiError> {
    info.validate()?;
    if !signer.is_private() {
        return Err(CryptoError::PublicKeyCannotSign.into());
    }
    let suite = signer.suite();
    suite.expect(subject_key.suite())?;

    let subject = build_name(info)?;
    let issuer_name = match (issuer, profile) {
        (None, Profile::Root) => {
            if !subject_key.same_public(signer) {
                return Err(PkiError::KeyMismatch);
            }
            subject.clone()
        }
        (Some(ca), Profile::Intermediate | Profile::Leaf) => {
            suite.expect(ca.suite())?;
            if !ca.is_ca() {
                return Err(PkiError::NotCa(ca.common_name().unwrap_or_default()));
            }
            if !ca.public_key().same_public(signer) {
                return Err(PkiError::KeyMismatch);
            }
            ca.subject().clone()
        }
        _ => {
            return Err(PkiError::InvalidInfo(format!(
                "{:?} certificate issued with the wrong parent",
                profile
            )))
        }
    };

    let years = u64::from(info.validation_years);
    let validity = Validity::from_now(Duration::from_secs(years * SECONDS_PER_YEAR))?;
    let spki = SubjectPublicKeyInfoOwned::from_der(&subject_key.public_der()?)?;
    let extensions = build_extensions(suite, info, subject_key, issuer, profile)?;

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: random_serial()?,
        signature: algorithm_identifier(suite),
        issuer: issuer_name,
        validity,
        subject,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    let signature = signer.sign(&tbs_certificate.to_der()?)?;
    let certificate = Certificate {
        tbs_certificate,
        signature_algorithm: algorithm_identifier(suite),
        signature: BitString::from_bytes(&signature)?,
    };

    let chain = match issuer {
        Some(ca) if !ca.is_self_signed() => std::iter::once(ca.certificate().clone())
            .chain(ca.chain().iter().cloned())
            .collect(),
        _ => Vec::new(),
    };

    debug!(
        "Issued {:?} certificate for {} ({})",
        profile, info.common_name, suite
    );
    Cert::from_certificate(certificate, chain)
}

fn algorithm_identifier(suite: Suite) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: signature_oid(suite),
        parameters: None,
    }
}

/// Positive 128-bit serial with a non-zero leading byte
fn random_serial() -> Result<SerialNumber, PkiError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    bytes[0] = (bytes[0] & 0x7f).max(1);
    Ok(SerialNumber::new(&bytes)?)
}

fn build_name(info: &CertBasicInfo) -> Result<Name, PkiError> {
    let fields = [
        (OID_COUNTRY, &info.country),
        (OID_ORGANIZATION, &info.organization),
        (OID_ORGANIZATIONAL_UNIT, &info.organizational_unit),
        (OID_LOCALITY, &info.locality),
        (OID_PROVINCE, &info.province),
        (OID_COMMON_NAME, &info.common_name),
    ];
    let mut rdns = Vec::new();
    for (oid, value) in fields {
        if value.is_empty() {
            continue;
        }
        let atv = AttributeTypeAndValue {
            oid,
            value: Any::new(Tag::Utf8String, value.as_bytes())?,
        };
        rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
    }
    Ok(RdnSequence(rdns))
}

fn encode_extension<T: Encode + AssociatedOid>(value: &T, critical: bool) -> Result<Extension, PkiError> {
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

fn build_extensions(
    suite: Suite,
    info: &CertBasicInfo,
    subject_key: &Key,
    issuer: Option<&Cert>,
    profile: Profile,
) -> Result<Vec<Extension>, PkiError> {
    let mut extensions = Vec::new();

    let usage = if profile.is_ca() {
        KeyUsages::DigitalSignature
            | KeyUsages::KeyEncipherment
            | KeyUsages::KeyCertSign
            | KeyUsages::CRLSign
    } else {
        KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment
    };
    extensions.push(encode_extension(&KeyUsage(usage), true)?);

    if profile.is_ca() {
        extensions.push(encode_extension(
            &ExtendedKeyUsage(vec![OID_SERVER_AUTH, OID_CLIENT_AUTH]),
            false,
        )?);
    }

    extensions.push(encode_extension(
        &BasicConstraints {
            ca: profile.is_ca(),
            path_len_constraint: if profile.is_ca() { info.max_path_len } else { None },
        },
        true,
    )?);

    if profile.is_ca() {
        let key_id = suite.hash(&subject_key.uncompressed_point());
        extensions.push(encode_extension(
            &SubjectKeyIdentifier(OctetString::new(key_id.to_vec())?),
            false,
        )?);
    }

    if let Some(key_id) = issuer.and_then(|ca| ca.subject_key_id()) {
        extensions.push(encode_extension(
            &AuthorityKeyIdentifier {
                key_identifier: Some(OctetString::new(key_id)?),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            },
            false,
        )?);
    }

    extensions.push(encode_extension(
        &SubjectAltName(vec![GeneralName::DnsName(Ia5String::new(&info.common_name)?)]),
        false,
    )?);

    Ok(extensions)
}
