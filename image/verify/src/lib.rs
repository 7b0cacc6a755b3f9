/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    LS firmware verification and WPR scrub library.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod hasher;
mod revocation;
mod scrubber;
mod session;
mod sig_group;
mod signature;
mod wpr;

#[cfg(test)]
mod test_env;

use acr_drivers::*;
use acr_image_types::*;
use arrayvec::ArrayVec;
use core::ops::Range;

pub use hasher::{fold_blocks, hash_region, HashState};
pub use revocation::{check_revocation, FalconVersionTable};
pub use scrubber::Scrubber;
pub use session::VerificationSession;
pub use sig_group::{clip, group_slots, SigGroups};
pub use signature::{
    compute_signature, derive_key, fold_versioning, verify_signature, VERSION_BUF_SIZE,
};
pub use wpr::{read_lsb_header, read_sig_groups, WprHeaderScanner};

/// Falcon allowed to carry a bootloader argument blob
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlDataAllowance {
    pub falcon_id: u32,

    /// Largest blob accepted, in bytes
    pub max_size: u32,
}

pub const DEFAULT_BL_DATA_ALLOW_LIST: &[BlDataAllowance] = &[
    BlDataAllowance {
        falcon_id: LSF_FALCON_ID_SEC2,
        max_size: 64,
    },
    BlDataAllowance {
        falcon_id: LSF_FALCON_ID_GSPLITE,
        max_size: 64,
    },
];

/// Verification policy, fixed for the lifetime of a session
#[derive(Debug, Copy, Clone)]
pub struct VerificationPolicy<'a> {
    /// Production parts never skip scrubbing or tolerate unsigned images
    pub production: bool,

    /// Check LS signatures and revocation
    pub verify_signatures: bool,

    /// Leave unaccounted gaps untouched; ignored on production parts
    pub skip_gap_scrub: bool,

    /// Salt the per-falcon verification keys are derived from
    pub master_salt: AesBlock,

    /// Legacy falcons whose images may be unsigned on non-production parts
    pub unsigned_allow_list: &'a [u32],

    pub bl_data_allow_list: &'a [BlDataAllowance],
}

impl<'a> VerificationPolicy<'a> {
    pub fn production(master_salt: AesBlock) -> Self {
        Self {
            production: true,
            verify_signatures: true,
            skip_gap_scrub: false,
            master_salt,
            unsigned_allow_list: &[],
            bl_data_allow_list: DEFAULT_BL_DATA_ALLOW_LIST,
        }
    }

    pub fn scrubs_gaps(&self) -> bool {
        self.production || !self.skip_gap_scrub
    }

    pub fn tolerates_unsigned(&self, falcon_id: u32) -> bool {
        !self.production && self.unsigned_allow_list.contains(&falcon_id)
    }

    pub fn bl_data_allowance(&self, falcon_id: u32) -> Option<&BlDataAllowance> {
        self.bl_data_allow_list
            .iter()
            .find(|allowance| allowance.falcon_id == falcon_id)
    }
}

/// Geometry of the protected region
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WprLayout {
    /// End of the LS ucode sub-area; every byte below it is accounted for
    pub ls_ucode_end: u32,
}

/// Outcome for one staged image
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LsImageInfo {
    pub falcon_id: u32,

    pub status: LsImageStatus,

    /// Scrub cursor once the image's content was accounted for
    pub cursor: u32,
}

/// Verified WPR information
#[derive(Debug, Default)]
pub struct LsVerificationInfo {
    pub images: ArrayVec<LsImageInfo, MAX_WPR_HEADERS>,

    /// Final scrub cursor
    pub cursor: u32,
}

/// LS Verification Environment
pub trait LsVerificationEnv {
    /// Start a WPR to `dst` transfer
    fn dma_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32>;

    /// Start a `src` to WPR transfer
    fn dma_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32>;

    /// Non-blocking completion check
    fn dma_poll(&mut self) -> AcrResult<bool>;

    /// Busy-wait for the in-flight transfer
    fn dma_wait(&mut self) -> AcrResult<()> {
        wait::until_ok(|| self.dma_poll())
    }

    /// Single block encryption
    fn aes_encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock>;

    /// Select debug signatures
    fn debug_mode(&self) -> bool;

    /// Diagnostic report of a falcon that failed verification
    fn report_failure(&mut self, falcon_id: u32);

    /// Publish a sig-group signature
    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()>;

    /// Lock a verified image to its falcon
    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()>;

    fn dma_read_exact(&mut self, dst: &mut [u8], offset: u32) -> AcrResult<()> {
        let len = dst.len();
        if self.dma_read(dst, offset, DmaSync::Blocking)? as usize != len {
            return Err(AcrError::ACR_DMA_TRANSFER_INCOMPLETE);
        }
        Ok(())
    }

    fn dma_write_all(&mut self, src: &[u8], offset: u32) -> AcrResult<()> {
        if self.dma_write(src, offset, DmaSync::Blocking)? as usize != src.len() {
            return Err(AcrError::ACR_DMA_TRANSFER_INCOMPLETE);
        }
        Ok(())
    }
}

impl<T: LsVerificationEnv + ?Sized> LsVerificationEnv for &mut T {
    fn dma_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        (**self).dma_read(dst, offset, sync)
    }

    fn dma_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        (**self).dma_write(src, offset, sync)
    }

    fn dma_poll(&mut self) -> AcrResult<bool> {
        (**self).dma_poll()
    }

    fn dma_wait(&mut self) -> AcrResult<()> {
        (**self).dma_wait()
    }

    fn aes_encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock> {
        (**self).aes_encrypt(key, block)
    }

    fn debug_mode(&self) -> bool {
        (**self).debug_mode()
    }

    fn report_failure(&mut self, falcon_id: u32) {
        (**self).report_failure(falcon_id)
    }

    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()> {
        (**self).write_sig_group_signature(group_id, sig)
    }

    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()> {
        (**self).setup_falcon_protections(falcon_id, code, data)
    }
}
