/*++

Licensed under the Apache-2.0 license.

File Name:

    sig_group.rs

Abstract:

    Sig groups: overlay ranges of a code section hashed into their own
    chains so each overlay can be checked on its own at run time.

--*/

use crate::hasher::{fold_blocks, HashState};
use crate::signature::compute_signature;
use crate::LsVerificationEnv;
use acr_drivers::*;
use acr_image_types::*;
use arrayvec::ArrayVec;
use core::ops::{Range, RangeInclusive};

/// Intersection of a block and a sig-group entry
///
/// Both ranges are half-open and in the same coordinate space. Returns the
/// bytes of `block` covered by `entry`, or `None` if they do not overlap.
pub fn clip(block: Range<u32>, entry: Range<u32>) -> Option<Range<u32>> {
    let start = core::cmp::max(block.start, entry.start);
    let end = core::cmp::min(block.end, entry.end);
    if start < end {
        Some(start..end)
    } else {
        None
    }
}

/// Hash slots fed by a group id
pub fn group_slots(group_id: u32) -> AcrResult<RangeInclusive<usize>> {
    match group_id {
        SIG_GROUP_ID_ALL => Ok(1..=SIG_GROUP_MAX_ID as usize),
        1..=SIG_GROUP_MAX_ID => Ok(group_id as usize..=group_id as usize),
        _ => Err(AcrError::ACR_SIG_GROUP_INVALID_ID),
    }
}

/// Sig-group entries of the code section being hashed
#[derive(Debug, Default)]
pub struct SigGroups {
    entries: ArrayVec<SigGroupEntry, SIG_GROUP_MAX_ENTRIES>,

    /// Section offset where PC 0 lies
    pc_base: u32,

    /// Bit `n` set once group `n` received bytes
    touched: u32,
}

impl SigGroups {
    /// Create sig groups
    ///
    /// # Arguments
    ///
    /// * `entries` - Trailer entries
    /// * `pc_base` - Size of the bootloader prologue preceding PC 0
    pub fn new(entries: &[SigGroupEntry], pc_base: u32) -> AcrResult<Self> {
        let mut groups = Self {
            pc_base,
            ..Default::default()
        };
        for entry in entries {
            groups
                .entries
                .try_push(*entry)
                .map_err(|_| AcrError::ACR_SIG_GROUP_COUNT_EXCEEDED)?;
        }
        Ok(groups)
    }

    pub fn entries(&self) -> &[SigGroupEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group ids that received at least one byte
    pub fn touched(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=SIG_GROUP_MAX_ID).filter(move |id| self.touched & (1 << id) != 0)
    }

    /// Fold the part of a code block covered by each entry into its groups
    ///
    /// # Arguments
    ///
    /// * `env` - Verification environment
    /// * `state` - Hash state owning the group chains
    /// * `offset` - Block offset relative to the start of the code section
    /// * `block` - Block contents
    pub fn fold_block<E: LsVerificationEnv>(
        &mut self,
        env: &mut E,
        state: &mut HashState,
        offset: u32,
        block: &[u8],
    ) -> AcrResult<()> {
        let block_end = offset + block.len() as u32;
        if block_end <= self.pc_base {
            return Ok(());
        }
        let pcs = offset.saturating_sub(self.pc_base)..block_end - self.pc_base;
        let first_pc_index = offset as i64 - self.pc_base as i64;

        for entry in self.entries.iter() {
            let slots = group_slots(entry.group_id())?;
            let Some(hit) = clip(pcs.clone(), entry.pc_range()) else {
                continue;
            };

            let lo = (hit.start as i64 - first_pc_index) as usize;
            let hi = (hit.end as i64 - first_pc_index) as usize;
            for slot in slots {
                let chain = state
                    .group_mut(slot)
                    .ok_or(AcrError::ACR_SIG_GROUP_INVALID_ID)?;
                fold_blocks(env, chain, &block[lo..hi])?;
                self.touched |= 1 << slot;
            }
        }

        Ok(())
    }

    /// Sign and publish the hash of every group that received bytes
    pub fn publish<E: LsVerificationEnv>(
        &self,
        env: &mut E,
        derived_key: &AesBlock,
        state: &HashState,
    ) -> AcrResult<()> {
        for id in self.touched() {
            let chain = state
                .group(id as usize)
                .ok_or(AcrError::ACR_SIG_GROUP_INVALID_ID)?;
            let sig = compute_signature(env, derived_key, chain)?;
            env.write_sig_group_signature(id, &sig)?;
        }
        Ok(())
    }
}
