use std::ops::{Range, RangeInclusive};
use std::sync::Arc;

use chainseal_core::keys::{hash_to_scalar, scalar_from_bytes};
use chainseal_core::{AsymmetricKey, EcSignature, Key};
use dashmap::DashMap;
use p256::elliptic_curve::group::Group;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::point::AffineCoordinates;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::arrays::RandomArrays;
use crate::error::BatchError;

/// Batch sizes precomputed by [`BatchVerifier::with_default_sizes`]
pub const DEFAULT_SIZE_RANGES: [RangeInclusive<usize>; 2] = [31..=100, 499..=501];

/// Signatures per chunk in [`BatchVerifier::multi_verify`]
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// A decoded rich signature ready for the combined check
struct BatchEntry {
    r: Scalar,
    w: Scalar,
    point: ProjectivePoint,
}

impl BatchEntry {
    fn decode(index: usize, der: &[u8]) -> Result<Self, BatchError> {
        let sig = EcSignature::from_rich_der(der).map_err(|e| BatchError::MalformedSignature {
            index,
            reason: e.to_string(),
        })?;
        let (rx, ry) = sig.point.ok_or(BatchError::MalformedSignature {
            index,
            reason: "missing ephemeral point".into(),
        })?;

        let r = scalar_from_bytes(&sig.r).ok_or(BatchError::OutOfRange(index))?;
        let s = scalar_from_bytes(&sig.s).ok_or(BatchError::OutOfRange(index))?;
        if scalar_from_bytes(&rx).is_none() || scalar_from_bytes(&ry).is_none() {
            return Err(BatchError::OutOfRange(index));
        }

        let encoded =
            EncodedPoint::from_affine_coordinates(&FieldBytes::from(rx), &FieldBytes::from(ry), false);
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(BatchError::PointNotOnCurve(index))?;
        if <Scalar as Reduce<U256>>::reduce_bytes(&affine.x()) != r {
            return Err(BatchError::PointMismatch(index));
        }

        let w = Option::<Scalar>::from(s.invert()).ok_or(BatchError::OutOfRange(index))?;
        Ok(BatchEntry {
            r,
            w,
            point: ProjectivePoint::from(affine),
        })
    }
}

/// Failed chunk of a [`BatchVerifier::multi_verify`] run
#[derive(Debug)]
pub struct ChunkFailure {
    pub range: Range<usize>,
    pub error: BatchError,
}

#[derive(Debug)]
pub struct MultiVerifyOutcome {
    pub total: usize,
    pub chunks: usize,
    pub failed: Vec<ChunkFailure>,
}

impl MultiVerifyOutcome {
    pub fn is_all_valid(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ranges(&self) -> Vec<Range<usize>> {
        self.failed.iter().map(|f| f.range.clone()).collect()
    }
}

/// Amortized ECDSA verification of many signatures under one public key.
///
/// Owns the cache of per-size [`RandomArrays`]. A batch whose size has no
/// cached entry is refused with a resource-gap error.
pub struct BatchVerifier {
    cache: DashMap<usize, Arc<RandomArrays>>,
    chunk_size: usize,
}

impl Default for BatchVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchVerifier {
    /// An engine with an empty cache
    pub fn new() -> Self {
        BatchVerifier {
            cache: DashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// An engine populated for [`DEFAULT_SIZE_RANGES`]
    pub fn with_default_sizes() -> Self {
        let verifier = Self::new();
        verifier.populate(&DEFAULT_SIZE_RANGES);
        verifier
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Generate arrays for every size in `ranges`, one task per size, and
    /// wait for all of them. Sizes that fail to generate stay unsupported.
    /// Returns the number of sizes added.
    pub fn populate(&self, ranges: &[RangeInclusive<usize>]) -> usize {
        let sizes: Vec<usize> = ranges
            .iter()
            .flat_map(|range| range.clone())
            .filter(|n| !self.cache.contains_key(n))
            .collect();

        let added = sizes
            .par_iter()
            .filter(|&&n| match RandomArrays::generate(n) {
                Ok(arrays) => self.insert(arrays),
                Err(e) => {
                    warn!("Failed to generate random arrays for batch size {}: {}", n, e);
                    false
                }
            })
            .count();

        info!(
            "Precomputed random arrays for {} batch sizes ({} cached)",
            added,
            self.cache.len()
        );
        added
    }

    /// Insert if no entry exists for this size; returns whether it was added
    pub fn insert(&self, arrays: RandomArrays) -> bool {
        let size = arrays.size();
        let mut inserted = false;
        self.cache.entry(size).or_insert_with(|| {
            inserted = true;
            Arc::new(arrays)
        });
        inserted
    }

    pub fn lookup(&self, n: usize) -> Option<Arc<RandomArrays>> {
        self.cache.get(&n).map(|entry| Arc::clone(entry.value()))
    }

    pub fn supports(&self, n: usize) -> bool {
        self.cache.contains_key(&n)
    }

    pub fn supported_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.cache.iter().map(|entry| *entry.key()).collect();
        sizes.sort_unstable();
        sizes
    }

    /// Verify `msgs[i]` against rich signature `sigs[i]` for every `i` with
    /// one combined check. All-or-nothing: a failure does not say which
    /// signature is bad.
    pub fn verify<M, S>(&self, key: &Key, msgs: &[M], sigs: &[S]) -> Result<(), BatchError>
    where
        M: AsRef<[u8]>,
        S: AsRef<[u8]>,
    {
        let public = match key.as_ecdsa() {
            Some(ecdsa) => ecdsa.public_point(),
            None => return Err(BatchError::UnsupportedSuite(key.suite())),
        };
        if msgs.len() != sigs.len() {
            return Err(BatchError::LengthMismatch {
                messages: msgs.len(),
                signatures: sigs.len(),
            });
        }
        let n = msgs.len();
        if n == 0 {
            return Err(BatchError::EmptyBatch);
        }

        let entries = sigs
            .iter()
            .enumerate()
            .map(|(i, sig)| BatchEntry::decode(i, sig.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let arrays = self.lookup(n).ok_or_else(|| {
            debug!("No random arrays for batch size {}", n);
            BatchError::MissingRandomArrays(n)
        })?;
        if arrays.size() != n {
            return Err(BatchError::SizeMismatch {
                expected: arrays.size(),
                got: n,
            });
        }

        let mut u = Scalar::ZERO;
        let mut v = Scalar::ZERO;
        for ((entry, msg), coeff) in entries.iter().zip(msgs).zip(arrays.coeff()) {
            let e = hash_to_scalar(&Sha256::digest(msg.as_ref()));
            let weight = entry.w * *coeff;
            u += e * weight;
            v += entry.r * weight;
        }

        let combined = ProjectivePoint::GENERATOR * u + public * v;
        if bool::from(combined.is_identity()) {
            debug!("Batch of {} rejected: combined point is the identity", n);
            return Err(BatchError::Rejected);
        }

        let points: Vec<ProjectivePoint> = entries.iter().map(|entry| entry.point).collect();
        let folded = arrays.fold(&points)?;

        let lhs = <Scalar as Reduce<U256>>::reduce_bytes(&combined.to_affine().x());
        let rhs = <Scalar as Reduce<U256>>::reduce_bytes(&folded.to_affine().x());
        if lhs != rhs {
            debug!("Batch of {} rejected: x-coordinate mismatch", n);
            return Err(BatchError::Rejected);
        }
        Ok(())
    }

    /// Split a large set into chunks, verify the chunks in parallel and
    /// report every chunk that failed. A set smaller than one chunk is
    /// verified as a single batch.
    pub fn multi_verify<M, S>(
        &self,
        key: &Key,
        msgs: &[M],
        sigs: &[S],
    ) -> Result<MultiVerifyOutcome, BatchError>
    where
        M: AsRef<[u8]> + Sync,
        S: AsRef<[u8]> + Sync,
    {
        if key.as_ecdsa().is_none() {
            return Err(BatchError::UnsupportedSuite(key.suite()));
        }
        if msgs.len() != sigs.len() {
            return Err(BatchError::LengthMismatch {
                messages: msgs.len(),
                signatures: sigs.len(),
            });
        }
        if msgs.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let ranges = chunk_ranges(msgs.len(), self.chunk_size);
        let chunks = ranges.len();
        let mut failed: Vec<ChunkFailure> = ranges
            .into_par_iter()
            .filter_map(|range| {
                match self.verify(key, &msgs[range.clone()], &sigs[range.clone()]) {
                    Ok(()) => None,
                    Err(error) => {
                        debug!("Chunk {:?} failed: {}", range, error);
                        Some(ChunkFailure { range, error })
                    }
                }
            })
            .collect();
        failed.sort_by_key(|f| f.range.start);

        Ok(MultiVerifyOutcome {
            total: msgs.len(),
            chunks,
            failed,
        })
    }
}

/// `total / chunk` chunks; the last one absorbs the remainder
pub fn chunk_ranges(total: usize, chunk: usize) -> Vec<Range<usize>> {
    let chunk = chunk.max(1);
    if total == 0 {
        return Vec::new();
    }
    let count = total / chunk;
    if count == 0 {
        return vec![0..total];
    }
    (0..count)
        .map(|i| {
            let end = if i + 1 == count { total } else { (i + 1) * chunk };
            i * chunk..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainseal_core::{ErrorKind, Suite};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn signed(key: &Key, n: usize) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let msgs: Vec<Vec<u8>> = (0..n).map(|i| format!("message {i}").into_bytes()).collect();
        let sigs = msgs
            .iter()
            .map(|m| key.sign_for_batch_verify(m).unwrap())
            .collect();
        (msgs, sigs)
    }

    fn verifier_for(sizes: &[usize]) -> BatchVerifier {
        let verifier = BatchVerifier::new();
        for (seed, &n) in sizes.iter().enumerate() {
            let arrays =
                RandomArrays::generate_with_rng(n, &mut StdRng::seed_from_u64(seed as u64)).unwrap();
            assert!(verifier.insert(arrays));
        }
        verifier
    }

    #[test]
    fn test_chunk_ranges() {
        assert!(chunk_ranges(0, 50).is_empty());
        assert_eq!(chunk_ranges(10, 50), vec![0..10]);
        assert_eq!(chunk_ranges(100, 50), vec![0..50, 50..100]);
        assert_eq!(chunk_ranges(149, 50), vec![0..50, 50..149]);
        assert_eq!(chunk_ranges(150, 50), vec![0..50, 50..100, 100..150]);
    }

    #[test]
    fn test_valid_batch_accepted() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let (msgs, sigs) = signed(&key, 31);
        let verifier = verifier_for(&[31]);
        assert!(verifier.verify(&key, &msgs, &sigs).is_ok());
    }

    #[test]
    fn test_missing_size_is_resource_gap() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let (msgs, sigs) = signed(&key, 12);
        let verifier = verifier_for(&[31]);
        let err = verifier.verify(&key, &msgs, &sigs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceGap);
    }

    #[test]
    fn test_plain_signature_rejected() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let (msgs, mut sigs) = signed(&key, 31);
        sigs[4] = key.sign(&msgs[4]).unwrap();
        let verifier = verifier_for(&[31]);
        let err = verifier.verify(&key, &msgs, &sigs).unwrap_err();
        assert!(matches!(err, BatchError::MalformedSignature { index: 4, .. }));
    }

    #[test]
    fn test_swapped_points_rejected() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let (msgs, mut sigs) = signed(&key, 31);
        let mut a = EcSignature::from_der(&sigs[0]).unwrap();
        let b = EcSignature::from_der(&sigs[1]).unwrap();
        a.point = b.point;
        sigs[0] = a.to_der().unwrap();
        let verifier = verifier_for(&[31]);
        assert!(matches!(
            verifier.verify(&key, &msgs, &sigs),
            Err(BatchError::PointMismatch(0))
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let other = Key::generate(Suite::EcdsaP256).unwrap();
        let (msgs, sigs) = signed(&key, 31);
        let verifier = verifier_for(&[31]);
        assert!(matches!(
            verifier.verify(&other, &msgs, &sigs),
            Err(BatchError::Rejected)
        ));
    }

    #[test]
    fn test_sm2_unsupported() {
        let key = Key::generate(Suite::Sm2).unwrap();
        let verifier = verifier_for(&[31]);
        let err = verifier
            .verify(&key, &[b"m".to_vec()], &[b"s".to_vec()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_length_mismatch_and_empty() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let verifier = verifier_for(&[31]);
        let empty: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(
            verifier.verify(&key, &empty, &empty),
            Err(BatchError::EmptyBatch)
        ));
        assert!(matches!(
            verifier.verify(&key, &[b"a".to_vec()], &empty),
            Err(BatchError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_multi_verify_empty_matches_verify() {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let verifier = verifier_for(&[31]);
        let empty: Vec<Vec<u8>> = Vec::new();
        let err = verifier.multi_verify(&key, &empty, &empty).unwrap_err();
        assert!(matches!(err, BatchError::EmptyBatch));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_insert_if_absent() {
        let verifier = verifier_for(&[33]);
        let first = verifier.lookup(33).unwrap();
        let replacement = RandomArrays::generate(33).unwrap();
        assert!(!verifier.insert(replacement));
        assert_eq!(verifier.lookup(33).unwrap().coeff(), first.coeff());
        assert_eq!(verifier.supported_sizes(), vec![33]);
    }

    #[test]
    fn test_populate_ranges() {
        let verifier = BatchVerifier::new();
        assert_eq!(verifier.populate(&[31..=33, 40..=40]), 4);
        assert!(verifier.supports(32));
        assert!(verifier.supports(40));
        assert!(!verifier.supports(34));
        assert_eq!(verifier.populate(&[31..=33]), 0);
    }
}
