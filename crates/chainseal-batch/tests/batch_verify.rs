use chainseal_batch::{BatchError, BatchVerifier, RandomArrays};
use chainseal_core::{AsymmetricKey, EcSignature, ErrorKind, Key, Suite};
use proptest::prelude::*;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

fn random_messages(n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|_| {
            let mut msg = vec![0u8; 48];
            OsRng.fill_bytes(&mut msg);
            msg
        })
        .collect()
}

fn sign_all(key: &Key, msgs: &[Vec<u8>]) -> Vec<Vec<u8>> {
    msgs.iter()
        .map(|m| key.sign_for_batch_verify(m).unwrap())
        .collect()
}

fn flip_s_bit(der: &[u8]) -> Vec<u8> {
    let mut sig = EcSignature::from_der(der).unwrap();
    sig.s[31] ^= 0x01;
    sig.to_der().unwrap()
}

#[test]
fn test_thirty_three_signatures_with_one_corrupted() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    assert_eq!(verifier.populate(&[33..=33]), 1);

    let msgs = random_messages(33);
    let mut sigs = sign_all(&key, &msgs);
    assert!(verifier.verify(&key, &msgs, &sigs).is_ok());

    // signature #17, one-based
    sigs[16] = flip_s_bit(&sigs[16]);
    let err = verifier.verify(&key, &msgs, &sigs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Crypto);

    for (i, (msg, sig)) in msgs.iter().zip(&sigs).enumerate() {
        if i == 16 {
            assert!(key.verify(msg, sig).is_err());
        } else {
            assert!(key.verify(msg, sig).is_ok(), "signature #{} should verify", i + 1);
        }
    }
}

#[test]
fn test_uncached_size_never_accepts() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    verifier.populate(&[31..=32]);
    let msgs = random_messages(34);
    let sigs = sign_all(&key, &msgs);
    assert!(matches!(
        verifier.verify(&key, &msgs, &sigs),
        Err(BatchError::MissingRandomArrays(34))
    ));
}

#[test]
fn test_multi_verify_reports_failed_chunk() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    verifier.populate(&[50..=50, 80..=80]);

    let msgs = random_messages(130);
    let mut sigs = sign_all(&key, &msgs);
    let outcome = verifier.multi_verify(&key, &msgs, &sigs).unwrap();
    assert!(outcome.is_all_valid());
    assert_eq!(outcome.chunks, 2);

    sigs[97] = flip_s_bit(&sigs[97]);
    let outcome = verifier.multi_verify(&key, &msgs, &sigs).unwrap();
    assert_eq!(outcome.failed_ranges(), vec![50..130]);
}

#[test]
fn test_multi_verify_small_set_is_single_batch() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    verifier.populate(&[40..=40]);
    let msgs = random_messages(40);
    let sigs = sign_all(&key, &msgs);
    let outcome = verifier.multi_verify(&key, &msgs, &sigs).unwrap();
    assert_eq!(outcome.chunks, 1);
    assert!(outcome.is_all_valid());
}

#[test]
fn test_multi_verify_missing_chunk_size_fails_that_chunk() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    verifier.populate(&[50..=50]);
    let msgs = random_messages(120);
    let sigs = sign_all(&key, &msgs);
    let outcome = verifier.multi_verify(&key, &msgs, &sigs).unwrap();
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].range, 50..120);
    assert_eq!(outcome.failed[0].error.kind(), ErrorKind::ResourceGap);
}

#[test]
fn test_forged_point_with_matching_r_rejected() {
    let key = Key::generate(Suite::EcdsaP256).unwrap();
    let verifier = BatchVerifier::new();
    verifier.populate(&[31..=31]);
    let msgs = random_messages(31);
    let mut sigs = sign_all(&key, &msgs);

    // Reuse a valid signature's point and r for another message
    let donor = EcSignature::from_der(&sigs[0]).unwrap();
    sigs[5] = donor.to_der().unwrap();
    assert!(verifier.verify(&key, &msgs, &sigs).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_batch_agrees_with_individual_verify(
        n in 31usize..=40,
        seed in any::<u64>(),
        corrupt in proptest::collection::vec(any::<prop::sample::Index>(), 0..3),
    ) {
        let key = Key::generate(Suite::EcdsaP256).unwrap();
        let verifier = BatchVerifier::new();
        let arrays = RandomArrays::generate_with_rng(n, &mut StdRng::seed_from_u64(seed)).unwrap();
        prop_assert!(verifier.insert(arrays));

        let msgs = random_messages(n);
        let mut sigs = sign_all(&key, &msgs);
        for index in &corrupt {
            let i = index.index(n);
            sigs[i] = flip_s_bit(&sigs[i]);
        }

        let individually_valid = msgs
            .iter()
            .zip(&sigs)
            .all(|(m, s)| key.verify(m, s).is_ok());
        let batch_valid = verifier.verify(&key, &msgs, &sigs).is_ok();
        prop_assert_eq!(batch_valid, individually_valid);
    }
}
