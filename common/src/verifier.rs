/*++

Licensed under the Apache-2.0 license.

File Name:

    verifier.rs

Abstract:

    LS firmware verification support routines.

--*/

use acr_drivers::*;
use acr_image_verify::{
    LsVerificationEnv, LsVerificationInfo, VerificationPolicy, VerificationSession, WprLayout,
};
use core::ops::Range;

/// LS Firmware Verification Environment
pub struct LsFirmwareVerificationEnv<'a, D: WprDma, C: BlockCipherEngine, S: SocIfc> {
    pub dma: &'a mut D,
    pub aes: &'a mut C,
    pub soc_ifc: &'a mut S,
}

impl<'a, D: WprDma, C: BlockCipherEngine, S: SocIfc> LsFirmwareVerificationEnv<'a, D, C, S> {
    /// Run a verification pass over the WPR
    ///
    /// # Arguments
    ///
    /// * `policy` - Verification policy
    /// * `layout` - WPR geometry
    ///
    /// # Returns
    ///
    /// * `LsVerificationInfo` - Per-image outcome and the final scrub cursor
    pub fn verify(
        &mut self,
        policy: VerificationPolicy,
        layout: WprLayout,
    ) -> AcrResult<LsVerificationInfo> {
        let result = VerificationSession::new(&mut *self, policy, layout).run();
        if let Err(err) = result {
            cprintln!("[acr] WPR rejected {}", u32::from(err));
        }
        result
    }
}

impl<'a, D: WprDma, C: BlockCipherEngine, S: SocIfc> LsVerificationEnv
    for LsFirmwareVerificationEnv<'a, D, C, S>
{
    fn dma_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        self.dma.start_read(dst, offset, sync)
    }

    fn dma_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        self.dma.start_write(src, offset, sync)
    }

    fn dma_poll(&mut self) -> AcrResult<bool> {
        self.dma.is_idle()
    }

    /// Encrypt a single block using the AES engine
    fn aes_encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock> {
        self.aes.encrypt(key, block)
    }

    fn debug_mode(&self) -> bool {
        self.soc_ifc.debug_mode()
    }

    fn report_failure(&mut self, falcon_id: u32) {
        self.soc_ifc.report_failure(falcon_id)
    }

    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()> {
        self.soc_ifc.write_sig_group_signature(group_id, sig)
    }

    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()> {
        self.soc_ifc.setup_falcon_protections(falcon_id, code, data)
    }
}
