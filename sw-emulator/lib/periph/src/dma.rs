/*++

Licensed under the Apache-2.0 license.

File Name:

    dma.rs

Abstract:

    File contains the emulated protected region and its block transfer
    engine.

--*/

use acr_drivers::{AcrError, AcrResult, DmaSync, WprDma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmaDirection {
    /// Region to buffer
    Read,

    /// Buffer to region
    Write,
}

/// Transfer issued to the engine
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DmaTransfer {
    pub direction: DmaDirection,
    pub offset: u32,
    pub len: u32,
    pub sync: DmaSync,
}

impl DmaTransfer {
    pub fn range(&self) -> Range<u32> {
        self.offset..self.offset + self.len
    }
}

struct WprRegs {
    mem: Vec<u8>,

    /// Polls left before the in-flight transfer completes
    busy_polls: u32,

    max_latency: u32,

    rng: StdRng,

    log: Vec<DmaTransfer>,

    /// Fail every write touching this offset
    fault: Option<u32>,
}

impl WprRegs {
    fn range(&self, offset: u32, len: usize) -> AcrResult<Range<usize>> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or(AcrError::ACR_DMA_OUT_OF_BOUNDS)?;
        if end > self.mem.len() {
            return Err(AcrError::ACR_DMA_OUT_OF_BOUNDS);
        }
        Ok(start..end)
    }

    fn issue(&mut self, transfer: DmaTransfer) -> AcrResult<()> {
        if transfer.len == 0 {
            return Err(AcrError::ACR_DMA_INVALID_LENGTH);
        }
        if self.busy_polls != 0 {
            return Err(AcrError::ACR_DMA_BUSY);
        }
        if transfer.sync == DmaSync::NonBlocking && self.max_latency != 0 {
            self.busy_polls = self.rng.gen_range(1..=self.max_latency);
        }
        self.log.push(transfer);
        Ok(())
    }
}

/// Emulated WPR shared between the engine and the test bench
#[derive(Clone)]
pub struct EmuWpr {
    regs: Rc<RefCell<WprRegs>>,
}

impl EmuWpr {
    /// Create a zero filled region
    ///
    /// # Arguments
    ///
    /// * `size` - Region size in bytes
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0; size])
    }

    pub fn from_bytes(mem: Vec<u8>) -> Self {
        Self {
            regs: Rc::new(RefCell::new(WprRegs {
                mem,
                busy_polls: 0,
                max_latency: 0,
                rng: StdRng::seed_from_u64(0),
                log: Vec::new(),
                fault: None,
            })),
        }
    }

    /// Keep non-blocking transfers in flight for up to `max_polls` polls
    pub fn set_latency(&self, max_polls: u32, seed: u64) {
        let mut regs = self.regs.borrow_mut();
        regs.max_latency = max_polls;
        regs.rng = StdRng::seed_from_u64(seed);
    }

    /// Fail writes covering `offset`
    pub fn inject_write_fault(&self, offset: u32) {
        self.regs.borrow_mut().fault = Some(offset);
    }

    /// Stage bytes without going through the engine
    pub fn load(&self, offset: usize, data: &[u8]) {
        self.regs.borrow_mut().mem[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.regs.borrow().mem.clone()
    }

    pub fn size(&self) -> usize {
        self.regs.borrow().mem.len()
    }

    pub fn transfers(&self) -> Vec<DmaTransfer> {
        self.regs.borrow().log.clone()
    }

    /// Writes issued to the engine, in order
    pub fn writes(&self) -> Vec<DmaTransfer> {
        self.regs
            .borrow()
            .log
            .iter()
            .filter(|t| t.direction == DmaDirection::Write)
            .cloned()
            .collect()
    }

    pub fn is_busy(&self) -> bool {
        self.regs.borrow().busy_polls != 0
    }
}

impl WprDma for EmuWpr {
    fn start_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        let mut regs = self.regs.borrow_mut();
        let range = regs.range(offset, dst.len())?;
        regs.issue(DmaTransfer {
            direction: DmaDirection::Read,
            offset,
            len: dst.len() as u32,
            sync,
        })?;
        dst.copy_from_slice(&regs.mem[range]);
        Ok(dst.len() as u32)
    }

    fn start_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32> {
        let mut regs = self.regs.borrow_mut();
        let range = regs.range(offset, src.len())?;
        if matches!(regs.fault, Some(fault) if range.contains(&(fault as usize))) {
            return Err(AcrError::ACR_DMA_TRANSFER_INCOMPLETE);
        }
        regs.issue(DmaTransfer {
            direction: DmaDirection::Write,
            offset,
            len: src.len() as u32,
            sync,
        })?;
        regs.mem[range].copy_from_slice(src);
        Ok(src.len() as u32)
    }

    fn is_idle(&mut self) -> AcrResult<bool> {
        let mut regs = self.regs.borrow_mut();
        if regs.busy_polls == 0 {
            return Ok(true);
        }
        regs.busy_polls -= 1;
        Ok(regs.busy_polls == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut wpr = EmuWpr::new(64);
        assert_eq!(wpr.start_write(&[1, 2, 3, 4], 16, DmaSync::Blocking), Ok(4));
        let mut buf = [0u8; 4];
        assert_eq!(wpr.start_read(&mut buf, 16, DmaSync::Blocking), Ok(4));
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(wpr.writes().len(), 1);
        assert_eq!(wpr.transfers()[1].range(), 16..20);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut wpr = EmuWpr::new(64);
        let mut buf = [0u8; 16];
        assert_eq!(
            wpr.start_read(&mut buf, 56, DmaSync::Blocking),
            Err(AcrError::ACR_DMA_OUT_OF_BOUNDS)
        );
        assert_eq!(
            wpr.start_write(&[], 0, DmaSync::Blocking),
            Err(AcrError::ACR_DMA_INVALID_LENGTH)
        );
    }

    #[test]
    fn test_single_transfer_in_flight() {
        let mut wpr = EmuWpr::new(64);
        wpr.set_latency(3, 7);
        let mut buf = [0u8; 16];
        wpr.start_read(&mut buf, 0, DmaSync::NonBlocking).unwrap();
        assert!(wpr.is_busy());
        assert_eq!(
            wpr.start_read(&mut buf, 16, DmaSync::NonBlocking),
            Err(AcrError::ACR_DMA_BUSY)
        );
        acr_drivers::wait::until_ok(|| wpr.is_idle()).unwrap();
        assert!(!wpr.is_busy());
        wpr.start_read(&mut buf, 16, DmaSync::NonBlocking).unwrap();
    }

    #[test]
    fn test_write_fault() {
        let mut wpr = EmuWpr::new(64);
        wpr.inject_write_fault(40);
        assert_eq!(wpr.start_write(&[0; 16], 0, DmaSync::Blocking), Ok(16));
        assert_eq!(
            wpr.start_write(&[0; 16], 32, DmaSync::Blocking),
            Err(AcrError::ACR_DMA_TRANSFER_INCOMPLETE)
        );
    }

    #[test]
    fn test_clones_share_memory() {
        let wpr = EmuWpr::new(32);
        let mut engine_side = wpr.clone();
        engine_side
            .start_write(&[0xAA; 16], 0, DmaSync::Blocking)
            .unwrap();
        assert_eq!(&wpr.bytes()[..16], &[0xAA; 16]);
    }
}
