/*++

Licensed under the Apache-2.0 license.

File Name:

    soc_ifc.rs

Abstract:

    File contains the emulated SoC interface: debug strap, failure
    register, sig-group scratch registers and the falcon protection hook.

--*/

use acr_drivers::memory_layout::SIG_GROUP_SCRATCH_COUNT;
use acr_drivers::{AcrError, AcrResult, AesBlock, SocIfc};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

/// Protection request made through the chip hook
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FalconProtection {
    pub falcon_id: u32,
    pub code: Range<u32>,
    pub data: Range<u32>,
}

#[derive(Default)]
struct SocRegs {
    debug: bool,

    /// Last falcon reported as failing
    failure_reg: Option<u32>,

    failure_log: Vec<u32>,

    sig_group_scratch: [Option<AesBlock>; SIG_GROUP_SCRATCH_COUNT],

    protections: Vec<FalconProtection>,

    reject_protections: bool,
}

/// Emulated SoC interface shared between the engine and the test bench
#[derive(Clone, Default)]
pub struct EmuSocIfc {
    regs: Rc<RefCell<SocRegs>>,
}

impl EmuSocIfc {
    pub fn new(debug: bool) -> Self {
        let soc = Self::default();
        soc.regs.borrow_mut().debug = debug;
        soc
    }

    pub fn set_reject_protections(&self, reject: bool) {
        self.regs.borrow_mut().reject_protections = reject;
    }

    pub fn failure_reg(&self) -> Option<u32> {
        self.regs.borrow().failure_reg
    }

    pub fn failure_log(&self) -> Vec<u32> {
        self.regs.borrow().failure_log.clone()
    }

    /// Sig-group scratch register of a group id
    pub fn sig_group_signature(&self, group_id: u32) -> Option<AesBlock> {
        let index = (group_id as usize).checked_sub(1)?;
        self.regs
            .borrow()
            .sig_group_scratch
            .get(index)
            .copied()
            .flatten()
    }

    pub fn protections(&self) -> Vec<FalconProtection> {
        self.regs.borrow().protections.clone()
    }
}

impl SocIfc for EmuSocIfc {
    fn debug_mode(&self) -> bool {
        self.regs.borrow().debug
    }

    fn report_failure(&mut self, falcon_id: u32) {
        let mut regs = self.regs.borrow_mut();
        regs.failure_reg = Some(falcon_id);
        regs.failure_log.push(falcon_id);
    }

    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()> {
        let index = (group_id as usize)
            .checked_sub(1)
            .ok_or(AcrError::ACR_SOC_SCRATCH_WRITE_FAILURE)?;
        let mut regs = self.regs.borrow_mut();
        let slot = regs
            .sig_group_scratch
            .get_mut(index)
            .ok_or(AcrError::ACR_SOC_SCRATCH_WRITE_FAILURE)?;
        *slot = Some(*sig);
        Ok(())
    }

    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()> {
        let mut regs = self.regs.borrow_mut();
        if regs.reject_protections {
            return Err(AcrError::ACR_PROTECTION_SETUP_FAILURE);
        }
        regs.protections.push(FalconProtection {
            falcon_id,
            code,
            data,
        });
        Ok(())
    }
}
