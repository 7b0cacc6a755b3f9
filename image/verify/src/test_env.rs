/*++

Licensed under the Apache-2.0 license.

File Name:

    test_env.rs

Abstract:

    In-memory verification environment used by the unit tests.

--*/

use crate::LsVerificationEnv;
use acr_drivers::*;
use core::ops::Range;

/// Deterministic keyed permutation standing in for the block cipher
pub(crate) fn toy_cipher(key: &AesBlock, block: &AesBlock) -> AesBlock {
    let mut state = block.0;
    for round in 0..4u8 {
        let mut carry = round.wrapping_mul(0x3B) ^ 0xA7;
        for i in 0..16 {
            carry = state[i]
                .wrapping_add(key.0[(i + round as usize) % 16])
                .rotate_left(3)
                ^ carry;
            state[i] = carry;
        }
    }
    AesBlock(state)
}

#[derive(Default)]
pub(crate) struct TestEnv {
    mem: Vec<u8>,
    busy: bool,
    pub polls: u32,
    pub debug: bool,
    pub reject_protections: bool,
    pub writes: Vec<(u32, u32)>,
    pub failures: Vec<u32>,
    pub sig_group_writes: Vec<(u32, AesBlock)>,
    pub protections: Vec<(u32, Range<u32>, Range<u32>)>,
}

impl TestEnv {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            ..Default::default()
        }
    }

    pub fn load(&mut self, offset: usize, data: &[u8]) {
        self.mem[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn mem(&self) -> &[u8] {
        &self.mem
    }

    pub fn dma_idle(&self) -> bool {
        !self.busy
    }

    fn range(&self, offset: u32, len: usize) -> AcrResult<Range<usize>> {
        let start = offset as usize;
        let end = start + len;
        if end > self.mem.len() {
            return Err(AcrError::ACR_DMA_OUT_OF_BOUNDS);
        }
        Ok(start..end)
    }

    fn begin(&mut self, sync: DmaSync) -> AcrResult<()> {
        if self.busy {
            return Err(AcrError::ACR_DMA_BUSY);
        }
        self.busy = sync == DmaSync::NonBlocking;
        Ok(())
    }
}

impl LsVerificationEnv for TestEnv {
    fn dma_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        let range = self.range(offset, dst.len())?;
        self.begin(sync)?;
        dst.copy_from_slice(&self.mem[range]);
        Ok(dst.len() as u32)
    }

    fn dma_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        let range = self.range(offset, src.len())?;
        self.begin(sync)?;
        self.mem[range].copy_from_slice(src);
        self.writes.push((offset, src.len() as u32));
        Ok(src.len() as u32)
    }

    fn dma_poll(&mut self) -> AcrResult<bool> {
        self.polls += 1;
        self.busy = false;
        Ok(true)
    }

    fn aes_encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock> {
        Ok(toy_cipher(key, block))
    }

    fn debug_mode(&self) -> bool {
        self.debug
    }

    fn report_failure(&mut self, falcon_id: u32) {
        self.failures.push(falcon_id);
    }

    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()> {
        self.sig_group_writes.push((group_id, *sig));
        Ok(())
    }

    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()> {
        if self.reject_protections {
            return Err(AcrError::ACR_SOC_SCRATCH_WRITE_FAILURE);
        }
        self.protections.push((falcon_id, code, data));
        Ok(())
    }
}
