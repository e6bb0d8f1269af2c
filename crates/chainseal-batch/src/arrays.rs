//! Per-size randomness for batch verification.
//!
//! For a batch of `n` signatures the schedule is a bit vector, a
//! permutation of `0..n` and a subset `part` of `0..n`. Row `i` of the
//! coefficient matrix is row `i-1` (doubled when `bits[i]` is set, `bits[0]`
//! is ignored) plus one at columns `i` and `perm[i]`. The coefficient vector
//! is the sum of the rows indexed by `part` plus the final row. Folding the
//! ephemeral points through the same schedule yields `Σ coeff_i · R_i`.

use p256::elliptic_curve::{Field, Group};
use p256::{ProjectivePoint, Scalar};
use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::BatchError;

pub const MIN_PART_LEN: usize = 10;
pub const MAX_PART_LEN: usize = 30;

#[derive(Debug, Clone)]
pub struct RandomArrays {
    coeff: Vec<Scalar>,
    bits: Vec<bool>,
    perm: Vec<usize>,
    part: Vec<usize>,
}

impl RandomArrays {
    /// Draw a fresh schedule for `n` from a generator seeded by the OS
    pub fn generate(n: usize) -> Result<Self, BatchError> {
        let mut rng = StdRng::from_rng(OsRng).map_err(|e| BatchError::Rng(e.to_string()))?;
        Self::generate_with_rng(n, &mut rng)
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Self, BatchError> {
        if n == 0 {
            return Err(BatchError::InvalidSize(n));
        }
        let bits: Vec<bool> = (0..n).map(|_| rng.gen::<bool>()).collect();

        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(rng);

        let part_len = rng.gen_range(MIN_PART_LEN..=MAX_PART_LEN).min(n);
        let mut part = rand::seq::index::sample(rng, n, part_len).into_vec();
        part.sort_unstable();

        Self::from_schedule(bits, perm, part)
    }

    /// Build from an explicit schedule, validating every index
    pub fn from_schedule(
        bits: Vec<bool>,
        perm: Vec<usize>,
        part: Vec<usize>,
    ) -> Result<Self, BatchError> {
        let n = bits.len();
        if n == 0 {
            return Err(BatchError::InvalidSize(n));
        }
        if perm.len() != n {
            return Err(BatchError::SizeMismatch {
                expected: n,
                got: perm.len(),
            });
        }
        if let Some(&index) = perm.iter().chain(part.iter()).find(|&&i| i >= n) {
            return Err(BatchError::IndexOutOfRange { index, size: n });
        }

        let in_part = membership(n, &part);
        let mut row = vec![Scalar::ZERO; n];
        let mut coeff = vec![Scalar::ZERO; n];
        for i in 0..n {
            if i > 0 && bits[i] {
                for c in row.iter_mut() {
                    *c = c.double();
                }
            }
            row[i] += Scalar::ONE;
            row[perm[i]] += Scalar::ONE;
            if in_part[i] {
                accumulate(&mut coeff, &row);
            }
        }
        accumulate(&mut coeff, &row);

        Ok(RandomArrays {
            coeff,
            bits,
            perm,
            part,
        })
    }

    pub fn size(&self) -> usize {
        self.coeff.len()
    }

    pub fn coeff(&self) -> &[Scalar] {
        &self.coeff
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn part(&self) -> &[usize] {
        &self.part
    }

    /// Fold `points` through the schedule: `Σ coeff_i · points[i]`
    pub fn fold(&self, points: &[ProjectivePoint]) -> Result<ProjectivePoint, BatchError> {
        let n = self.size();
        if points.len() != n {
            return Err(BatchError::SizeMismatch {
                expected: n,
                got: points.len(),
            });
        }

        let in_part = membership(n, &self.part);
        let mut row = ProjectivePoint::IDENTITY;
        let mut total = ProjectivePoint::IDENTITY;
        for i in 0..n {
            if i > 0 && self.bits[i] {
                row = row.double();
            }
            let j = self.perm[i];
            let partner = points
                .get(j)
                .ok_or(BatchError::IndexOutOfRange { index: j, size: n })?;
            row += points[i] + partner;
            if in_part[i] {
                total += row;
            }
        }
        Ok(total + row)
    }
}

fn membership(n: usize, part: &[usize]) -> Vec<bool> {
    let mut flags = vec![false; n];
    for &k in part {
        if let Some(flag) = flags.get_mut(k) {
            *flag = true;
        }
    }
    flags
}

fn accumulate(acc: &mut [Scalar], row: &[Scalar]) {
    for (a, r) in acc.iter_mut().zip(row) {
        *a += *r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::group::Curve;
    use rand::rngs::StdRng;

    fn seeded(n: usize, seed: u64) -> RandomArrays {
        RandomArrays::generate_with_rng(n, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_schedule_shapes() {
        let arrays = seeded(64, 7);
        assert_eq!(arrays.size(), 64);
        assert_eq!(arrays.bits().len(), 64);

        let mut sorted = arrays.perm().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());

        let part = arrays.part();
        assert!(part.len() >= MIN_PART_LEN && part.len() <= MAX_PART_LEN);
        assert!(part.windows(2).all(|w| w[0] < w[1]));
        assert!(part.iter().all(|&k| k < 64));
    }

    #[test]
    fn test_small_size_clamps_part() {
        let arrays = seeded(4, 1);
        assert_eq!(arrays.part().len(), 4);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            RandomArrays::generate(0),
            Err(BatchError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = seeded(40, 99);
        let b = seeded(40, 99);
        assert_eq!(a.coeff(), b.coeff());
        assert_eq!(a.perm(), b.perm());
    }

    #[test]
    fn test_hand_computed_coefficients() {
        // rows: r0 = e0 + e1, r1 = 2*r0 + e1 + e0 = 3e0 + 3e1,
        // r2 = r1 + e2 + e2 = 3e0 + 3e1 + 2e2
        // coeff = r0 + r2 = 4e0 + 4e1 + 2e2
        let arrays =
            RandomArrays::from_schedule(vec![true, true, false], vec![1, 0, 2], vec![0]).unwrap();
        let expected: Vec<Scalar> = [4u64, 4, 2].iter().map(|&v| Scalar::from(v)).collect();
        assert_eq!(arrays.coeff(), expected.as_slice());
    }

    #[test]
    fn test_out_of_range_schedule_aborts() {
        let err = RandomArrays::from_schedule(vec![false; 3], vec![0, 1, 3], vec![0]).unwrap_err();
        assert!(matches!(err, BatchError::IndexOutOfRange { index: 3, size: 3 }));

        let err = RandomArrays::from_schedule(vec![false; 3], vec![0, 1, 2], vec![5]).unwrap_err();
        assert!(matches!(err, BatchError::IndexOutOfRange { index: 5, size: 3 }));

        let err = RandomArrays::from_schedule(vec![false; 3], vec![0, 1], vec![0]).unwrap_err();
        assert!(matches!(err, BatchError::SizeMismatch { .. }));
    }

    #[test]
    fn test_fold_matches_coefficients() {
        let arrays = seeded(35, 3);
        let points: Vec<ProjectivePoint> = (1..=35u64)
            .map(|i| ProjectivePoint::GENERATOR * Scalar::from(i * 7919))
            .collect();
        let folded = arrays.fold(&points).unwrap();
        let direct = points
            .iter()
            .zip(arrays.coeff())
            .fold(ProjectivePoint::IDENTITY, |acc, (p, c)| acc + *p * c);
        assert_eq!(folded.to_affine(), direct.to_affine());
    }

    #[test]
    fn test_fold_rejects_wrong_length() {
        let arrays = seeded(31, 5);
        let points = vec![ProjectivePoint::GENERATOR; 30];
        assert!(matches!(
            arrays.fold(&points),
            Err(BatchError::SizeMismatch { expected: 31, got: 30 })
        ));
    }
}
