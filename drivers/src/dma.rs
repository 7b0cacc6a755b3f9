/*++

Licensed under the Apache-2.0 license.

File Name:

    dma.rs

Abstract:

    File contains the block transfer interface to the WPR and the
    double-buffer used to overlap transfers with hashing.

--*/

use acr_error::AcrResult;

/// Completion mode of a transfer
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DmaSync {
    /// Return once the transfer has completed
    Blocking,

    /// Return once the transfer has been issued; completion is polled
    NonBlocking,
}

/// Block transfer engine with access to the WPR
///
/// At most one transfer is in flight at any time. A non-blocking read fills
/// its destination at some point before `is_idle` next reports `true`; the
/// destination must not be inspected before then.
pub trait WprDma {
    /// Copy `dst.len()` bytes from WPR `offset` into `dst`
    ///
    /// # Returns
    ///
    /// * Number of bytes the engine accepted
    fn start_read(&mut self, dst: &mut [u8], offset: u32, sync: DmaSync) -> AcrResult<u32>;

    /// Copy `src` to WPR `offset`
    fn start_write(&mut self, src: &[u8], offset: u32, sync: DmaSync) -> AcrResult<u32>;

    /// Non-blocking completion check
    fn is_idle(&mut self) -> AcrResult<bool>;
}

/// Two transfer buffers: one being hashed, one being filled
pub struct ActiveBuffer<const N: usize> {
    slots: [[u8; N]; 2],
    done: usize,
    pending: usize,
}

impl<const N: usize> Default for ActiveBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ActiveBuffer<N> {
    pub const fn new() -> Self {
        Self {
            slots: [[0u8; N]; 2],
            done: 0,
            pending: 1,
        }
    }

    /// Exchange the roles of the two buffers
    pub fn swap(&mut self) {
        core::mem::swap(&mut self.done, &mut self.pending);
    }

    pub fn pending_mut(&mut self) -> &mut [u8; N] {
        &mut self.slots[self.pending]
    }

    /// Borrow the completed buffer and the buffer being filled at once
    pub fn split(&mut self) -> (&[u8; N], &mut [u8; N]) {
        let [first, second] = &mut self.slots;
        if self.done == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        }
    }

    /// Clear both buffers
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| slot.fill(0));
    }
}
