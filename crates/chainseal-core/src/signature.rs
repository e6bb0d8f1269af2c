use der::asn1::UintRef;
use der::{Decode, Encode, Sequence};
use std::fmt;

use crate::error::CryptoError;

/// Width of a scalar or coordinate on the supported 256-bit curves
pub const SCALAR_LEN: usize = 32;

#[derive(Sequence)]
struct PlainSignature<'a> {
    r: UintRef<'a>,
    s: UintRef<'a>,
}

#[derive(Sequence)]
struct RichSignature<'a> {
    r: UintRef<'a>,
    s: UintRef<'a>,
    rx: UintRef<'a>,
    ry: UintRef<'a>,
}

/// A decoded `(R, S)` signature, optionally carrying the ephemeral point
/// `(Rx, Ry)` produced while signing.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EcSignature {
    pub r: [u8; SCALAR_LEN],
    pub s: [u8; SCALAR_LEN],
    pub point: Option<([u8; SCALAR_LEN], [u8; SCALAR_LEN])>,
}

impl EcSignature {
    pub fn new(r: [u8; SCALAR_LEN], s: [u8; SCALAR_LEN]) -> Self {
        EcSignature { r, s, point: None }
    }

    pub fn with_point(mut self, rx: [u8; SCALAR_LEN], ry: [u8; SCALAR_LEN]) -> Self {
        self.point = Some((rx, ry));
        self
    }

    pub fn is_rich(&self) -> bool {
        self.point.is_some()
    }

    /// Decode either encoding: `SEQUENCE{R,S}` is tried first, then
    /// `SEQUENCE{R,S,Rx,Ry}`.
    pub fn from_der(bytes: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(plain) = PlainSignature::from_der(bytes) {
            return Ok(EcSignature::new(to_fixed(plain.r)?, to_fixed(plain.s)?));
        }
        Self::from_rich_der(bytes)
    }

    /// Decode only the rich encoding
    pub fn from_rich_der(bytes: &[u8]) -> Result<Self, CryptoError> {
        let rich = RichSignature::from_der(bytes)
            .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
        Ok(EcSignature::new(to_fixed(rich.r)?, to_fixed(rich.s)?)
            .with_point(to_fixed(rich.rx)?, to_fixed(rich.ry)?))
    }

    /// Encode as rich DER when the point is present, plain DER otherwise
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        let r = UintRef::new(&self.r)?;
        let s = UintRef::new(&self.s)?;
        let encoded = match &self.point {
            None => PlainSignature { r, s }.to_der()?,
            Some((rx, ry)) => RichSignature {
                r,
                s,
                rx: UintRef::new(rx)?,
                ry: UintRef::new(ry)?,
            }
            .to_der()?,
        };
        Ok(encoded)
    }

    /// Encode only `(R, S)`, dropping any carried point
    pub fn to_plain_der(&self) -> Result<Vec<u8>, CryptoError> {
        EcSignature::new(self.r, self.s).to_der()
    }

    /// `R ‖ S` as fixed-width big-endian bytes
    pub fn to_fixed_bytes(&self) -> [u8; 2 * SCALAR_LEN] {
        let mut out = [0u8; 2 * SCALAR_LEN];
        out[..SCALAR_LEN].copy_from_slice(&self.r);
        out[SCALAR_LEN..].copy_from_slice(&self.s);
        out
    }
}

impl fmt::Debug for EcSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcSignature")
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .field("rich", &self.is_rich())
            .finish()
    }
}

/// Left-pad a big-endian unsigned integer to the scalar width
fn to_fixed(value: UintRef<'_>) -> Result<[u8; SCALAR_LEN], CryptoError> {
    left_pad(value.as_bytes())
}

pub(crate) fn left_pad(bytes: &[u8]) -> Result<[u8; SCALAR_LEN], CryptoError> {
    let trimmed = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[],
    };
    if trimmed.len() > SCALAR_LEN {
        return Err(CryptoError::MalformedSignature(format!(
            "integer of {} bytes exceeds {}",
            trimmed.len(),
            SCALAR_LEN
        )));
    }
    let mut out = [0u8; SCALAR_LEN];
    out[SCALAR_LEN - trimmed.len()..].copy_from_slice(trimmed);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn scalar(fill: u8) -> [u8; SCALAR_LEN] {
        let mut out = [fill; SCALAR_LEN];
        out[0] = 0x01;
        out
    }

    #[test]
    fn test_plain_roundtrip() {
        let sig = EcSignature::new(scalar(0xaa), scalar(0x55));
        let der = sig.to_der().unwrap();
        let decoded = EcSignature::from_der(&der).unwrap();
        assert_eq!(decoded, sig);
        assert!(!decoded.is_rich());
    }

    #[test]
    fn test_rich_decodes_through_fallback() {
        let sig = EcSignature::new(scalar(1), scalar(2)).with_point(scalar(3), scalar(4));
        let der = sig.to_der().unwrap();
        let decoded = EcSignature::from_der(&der).unwrap();
        assert_eq!(decoded.point, Some((scalar(3), scalar(4))));
        assert_eq!(EcSignature::from_rich_der(&der).unwrap(), sig);
    }

    #[test]
    fn test_plain_is_not_rich() {
        let der = EcSignature::new(scalar(1), scalar(2)).to_der().unwrap();
        assert!(EcSignature::from_rich_der(&der).is_err());
    }

    #[test]
    fn test_high_bit_and_short_integers() {
        let mut r = [0u8; SCALAR_LEN];
        r[SCALAR_LEN - 1] = 0x07;
        let s = [0xffu8; SCALAR_LEN];
        let sig = EcSignature::new(r, s);
        let decoded = EcSignature::from_der(&sig.to_der().unwrap()).unwrap();
        assert_eq!(decoded.r, r);
        assert_eq!(decoded.s, s);
    }

    #[test]
    fn test_plain_der_drops_point() {
        let sig = EcSignature::new(scalar(1), scalar(2)).with_point(scalar(3), scalar(4));
        let plain = EcSignature::from_der(&sig.to_plain_der().unwrap()).unwrap();
        assert!(plain.point.is_none());
    }

    #[test]
    fn test_garbage_is_format_error() {
        let err = EcSignature::from_der(&[0x30, 0x03, 0x02, 0x01]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(EcSignature::from_der(&[]).is_err());
    }

    #[test]
    fn test_oversized_integer_rejected() {
        assert!(left_pad(&[1u8; SCALAR_LEN + 1]).is_err());
        assert_eq!(left_pad(&[0u8, 0, 5]).unwrap()[SCALAR_LEN - 1], 5);
    }
}
