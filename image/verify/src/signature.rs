/*++

Licensed under the Apache-2.0 license.

File Name:

    signature.rs

Abstract:

    Per-falcon key derivation, versioning fold and LS signature check.

--*/

use crate::hasher::fold_blocks;
use crate::LsVerificationEnv;
use acr_drivers::*;
use acr_image_types::*;

const VERSION_PACK_MAX: usize = 4 + LSF_FALCON_DEP_MAP_SIZE * 8;

/// Size of the scratch buffer holding the packed versioning fields
pub const VERSION_BUF_SIZE: usize =
    (VERSION_PACK_MAX + AES_BLOCK_SIZE_BYTES - 1) / AES_BLOCK_SIZE_BYTES * AES_BLOCK_SIZE_BYTES;

/// Fold the image version and dependency map into `chain`
///
/// The fields are packed little-endian as `version` followed by
/// `(falcon_id, min_version)` pairs, zero padded to a block multiple.
pub fn fold_versioning<E: LsVerificationEnv>(
    env: &mut E,
    chain: &mut AesBlock,
    sig: &LsbSignature,
    scratch: &mut [u8; VERSION_BUF_SIZE],
) -> AcrResult<()> {
    let count = sig.dep_map_count() as usize;
    if count > LSF_FALCON_DEP_MAP_SIZE {
        Err(AcrError::ACR_DEP_MAP_COUNT_EXCEEDED)?;
    }

    scratch.fill(0);
    scratch[..4].copy_from_slice(&sig.version().to_le_bytes());
    for (i, (falcon_id, min_version)) in sig.dependencies().enumerate() {
        let at = 4 + i * 8;
        scratch[at..at + 4].copy_from_slice(&falcon_id.to_le_bytes());
        scratch[at + 4..at + 8].copy_from_slice(&min_version.to_le_bytes());
    }

    let len = (4 + count * 8 + AES_BLOCK_SIZE_BYTES - 1) / AES_BLOCK_SIZE_BYTES
        * AES_BLOCK_SIZE_BYTES;
    fold_blocks(env, chain, &scratch[..len])
}

/// Derive the verification key of a falcon from the master salt
pub fn derive_key<E: LsVerificationEnv>(
    env: &mut E,
    salt: &AesBlock,
    falcon_id: u32,
) -> AcrResult<AesBlock> {
    let mut key = *salt;
    for (k, id) in key.0.iter_mut().zip(falcon_id.to_le_bytes()) {
        *k ^= id;
    }
    env.aes_encrypt(&key, salt)
}

/// Signature of a hash under a derived key
pub fn compute_signature<E: LsVerificationEnv>(
    env: &mut E,
    derived_key: &AesBlock,
    hash: &AesBlock,
) -> AcrResult<AesBlock> {
    env.aes_encrypt(derived_key, hash)
}

/// Compare the signature of `hash` with the one staged in the LSB header
///
/// A mismatch is reported to the SoC before the error is returned.
pub fn verify_signature<E: LsVerificationEnv>(
    env: &mut E,
    falcon_id: u32,
    derived_key: &AesBlock,
    hash: &AesBlock,
    expected: &LsSignature,
) -> AcrResult<()> {
    let actual = compute_signature(env, derived_key, hash)?;
    if !actual.ct_eq(&AesBlock::from(expected)) {
        env.report_failure(falcon_id);
        Err(AcrError::ACR_LS_SIGNATURE_MISMATCH)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::TestEnv;

    #[test]
    fn test_version_buf_size() {
        assert_eq!(VERSION_BUF_SIZE, 96);
        assert_eq!(VERSION_BUF_SIZE % AES_BLOCK_SIZE_BYTES, 0);
    }

    #[test]
    fn test_fold_versioning_packs_little_endian() {
        let mut sig = LsbSignature::default();
        sig.set_version(0x0102_0304);
        sig.set_dependency(0, LSF_FALCON_ID_PMU, 7);
        sig.set_dep_map_count(1);

        let mut env = TestEnv::new(0);
        let mut scratch = [0xEEu8; VERSION_BUF_SIZE];
        let mut chain = AesBlock::ZERO;
        fold_versioning(&mut env, &mut chain, &sig, &mut scratch).unwrap();

        let mut packed = [0u8; 16];
        packed[..4].copy_from_slice(&[4, 3, 2, 1]);
        packed[8] = 7;
        assert_eq!(&scratch[..16], &packed);
        assert!(scratch[16..].iter().all(|b| *b == 0));

        let mut expected = AesBlock::ZERO;
        fold_blocks(&mut env, &mut expected, &packed).unwrap();
        assert_eq!(chain, expected);
    }

    #[test]
    fn test_fold_versioning_capacity() {
        let mut sig = LsbSignature::default();
        sig.set_dep_map_count(LSF_FALCON_DEP_MAP_SIZE as u32 + 1);
        let mut env = TestEnv::new(0);
        let mut chain = AesBlock::ZERO;
        assert_eq!(
            fold_versioning(&mut env, &mut chain, &sig, &mut [0; VERSION_BUF_SIZE]),
            Err(AcrError::ACR_DEP_MAP_COUNT_EXCEEDED)
        );

        sig.set_dep_map_count(LSF_FALCON_DEP_MAP_SIZE as u32);
        assert!(fold_versioning(&mut env, &mut chain, &sig, &mut [0; VERSION_BUF_SIZE]).is_ok());
    }

    #[test]
    fn test_derived_keys_differ_per_falcon() {
        let mut env = TestEnv::new(0);
        let salt = AesBlock::from([0x5Au8; 16]);
        let sec2 = derive_key(&mut env, &salt, LSF_FALCON_ID_SEC2).unwrap();
        let pmu = derive_key(&mut env, &salt, LSF_FALCON_ID_PMU).unwrap();
        assert_ne!(sec2, pmu);
        assert_eq!(pmu, env.aes_encrypt(&salt, &salt).unwrap());
    }

    #[test]
    fn test_verify_signature() {
        let mut env = TestEnv::new(0);
        let key = AesBlock::from([3u8; 16]);
        let hash = AesBlock::from([9u8; 16]);
        let good: LsSignature = compute_signature(&mut env, &key, &hash).unwrap().into();

        verify_signature(&mut env, LSF_FALCON_ID_FECS, &key, &hash, &good).unwrap();
        assert!(env.failures.is_empty());

        let mut bad = good;
        bad[15] ^= 1;
        assert_eq!(
            verify_signature(&mut env, LSF_FALCON_ID_FECS, &key, &hash, &bad),
            Err(AcrError::ACR_LS_SIGNATURE_MISMATCH)
        );
        assert_eq!(env.failures, vec![LSF_FALCON_ID_FECS]);
    }
}
