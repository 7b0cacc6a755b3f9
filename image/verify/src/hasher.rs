/*++

Licensed under the Apache-2.0 license.

File Name:

    hasher.rs

Abstract:

    AES based chaining hash and the double-buffered streaming hash of a
    WPR region.

--*/

use crate::sig_group::SigGroups;
use crate::LsVerificationEnv;
use acr_drivers::memory_layout::DMA_BLOCK_SIZE;
use acr_drivers::*;
use acr_image_types::SIG_GROUP_MAX_ID;
use zeroize::Zeroize;

const CHAIN_COUNT: usize = SIG_GROUP_MAX_ID as usize + 1;

/// Running hash values
///
/// Slot 0 holds the global hash, slots `1..=SIG_GROUP_MAX_ID` the sig-group
/// hashes.
#[derive(Default, Zeroize)]
pub struct HashState {
    chains: [AesBlock; CHAIN_COUNT],
}

impl HashState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every chain
    pub fn reset(&mut self) {
        self.chains.zeroize();
    }

    pub fn global(&self) -> &AesBlock {
        &self.chains[0]
    }

    pub fn global_mut(&mut self) -> &mut AesBlock {
        &mut self.chains[0]
    }

    /// Chain of a sig group
    ///
    /// # Arguments
    ///
    /// * `slot` - Group id in `1..=SIG_GROUP_MAX_ID`
    pub fn group(&self, slot: usize) -> Option<&AesBlock> {
        self.chains.get(slot).filter(|_| slot != 0)
    }

    pub fn group_mut(&mut self, slot: usize) -> Option<&mut AesBlock> {
        self.chains.get_mut(slot).filter(|_| slot != 0)
    }
}

impl Drop for HashState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Fold `data` into `chain` one 16 byte block at a time
///
/// Each block is used as the cipher key and the chain value as the
/// plaintext; the ciphertext is xor-ed back into the chain.
///
/// # Arguments
///
/// * `env` - Verification environment
/// * `chain` - Hash value to update
/// * `data` - Bytes to fold, a multiple of 16 bytes long
pub fn fold_blocks<E: LsVerificationEnv>(
    env: &mut E,
    chain: &mut AesBlock,
    data: &[u8],
) -> AcrResult<()> {
    if data.len() % AES_BLOCK_SIZE_BYTES != 0 {
        Err(AcrError::ACR_HASH_UNALIGNED_CHUNK)?;
    }

    for block in data.chunks_exact(AES_BLOCK_SIZE_BYTES) {
        let key = AesBlock::try_from(block)?;
        let cipher = env.aes_encrypt(&key, chain)?;
        *chain = chain.xor(&cipher);
    }

    Ok(())
}

fn chunk_len(from: u32, end: u32) -> usize {
    core::cmp::min(end - from, DMA_BLOCK_SIZE as u32) as usize
}

fn fetch<E: LsVerificationEnv>(env: &mut E, dst: &mut [u8], offset: u32) -> AcrResult<()> {
    let accepted = env.dma_read(dst, offset, DmaSync::NonBlocking)?;
    if accepted as usize != dst.len() {
        Err(AcrError::ACR_DMA_TRANSFER_INCOMPLETE)?;
    }
    Ok(())
}

/// Hash `size` bytes of the WPR starting at `offset`
///
/// The fetch of each block overlaps the hashing of the previous one. Every
/// completed block is folded into the global chain and, when `groups` is
/// given, into the chains of the sig groups covering it.
///
/// # Arguments
///
/// * `env` - Verification environment
/// * `buffers` - Transfer buffers
/// * `state` - Hash state to update
/// * `offset` - Region offset inside the WPR
/// * `size` - Region size, a non-zero multiple of 16 bytes
/// * `groups` - Sig groups of the code section being hashed
pub fn hash_region<E: LsVerificationEnv>(
    env: &mut E,
    buffers: &mut ActiveBuffer<DMA_BLOCK_SIZE>,
    state: &mut HashState,
    offset: u32,
    size: u32,
    mut groups: Option<&mut SigGroups>,
) -> AcrResult<()> {
    if size == 0 {
        Err(AcrError::ACR_HASH_ZERO_SIZE)?;
    }
    if size as usize % AES_BLOCK_SIZE_BYTES != 0 {
        Err(AcrError::ACR_HASH_UNALIGNED_CHUNK)?;
    }
    let end = offset
        .checked_add(size)
        .ok_or(AcrError::ACR_DMA_OUT_OF_BOUNDS)?;

    let mut fetched = offset;
    let len = chunk_len(fetched, end);
    fetch(env, &mut buffers.pending_mut()[..len], fetched)?;
    fetched += len as u32;

    let mut hashed = offset;
    while hashed < end {
        env.dma_wait()?;
        buffers.swap();

        let (done, pending) = buffers.split();
        let done_len = chunk_len(hashed, end);
        if fetched < end {
            let len = chunk_len(fetched, end);
            fetch(env, &mut pending[..len], fetched)?;
            fetched += len as u32;
        }

        let chunk = &done[..done_len];
        fold_blocks(env, state.global_mut(), chunk)?;
        if let Some(groups) = groups.as_deref_mut() {
            groups.fold_block(env, state, hashed - offset, chunk)?;
        }
        hashed += done_len as u32;
    }

    Ok(())
}
