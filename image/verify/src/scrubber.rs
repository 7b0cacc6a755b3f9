/*++

Licensed under the Apache-2.0 license.

File Name:

    scrubber.rs

Abstract:

    Accounting of the WPR bytes claimed by staged images. Every byte that
    is not claimed is overwritten with zeros.

--*/

use crate::LsVerificationEnv;
use acr_drivers::memory_layout::ZERO_BUF_SIZE;
use acr_drivers::*;
use acr_image_types::LsbHeader;

/// Scrub cursor and its zero source
pub struct Scrubber {
    /// Every byte below the cursor is either claimed content or zeroed
    cursor: u32,

    zero_buf: [u8; ZERO_BUF_SIZE],

    zero_buf_ready: bool,

    scrub_gaps: bool,
}

impl Scrubber {
    /// Create a scrubber starting at WPR offset zero
    ///
    /// # Arguments
    ///
    /// * `scrub_gaps` - Zero unclaimed gaps; when clear only the cursor moves
    pub fn new(scrub_gaps: bool) -> Self {
        Self {
            cursor: 0,
            zero_buf: [0u8; ZERO_BUF_SIZE],
            zero_buf_ready: false,
            scrub_gaps,
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    fn prepare(&mut self) {
        if !self.zero_buf_ready {
            self.zero_buf.fill(0);
            self.zero_buf_ready = true;
        }
    }

    /// Claim `content_size` bytes at `next_known`, zeroing the gap before it
    ///
    /// # Arguments
    ///
    /// * `env` - Verification environment
    /// * `next_known` - Start of the next claimed content
    /// * `content_size` - Size of the claimed content
    pub fn scrub_gap<E: LsVerificationEnv>(
        &mut self,
        env: &mut E,
        next_known: u32,
        content_size: u32,
    ) -> AcrResult<()> {
        if next_known < self.cursor {
            Err(AcrError::ACR_SCRUB_NEGATIVE_GAP)?;
        }
        let next_cursor = next_known
            .checked_add(content_size)
            .ok_or(AcrError::ACR_SCRUB_CURSOR_OVERFLOW)?;

        let gap = next_known - self.cursor;
        if gap > 0 && self.scrub_gaps {
            self.zero_fill(env, self.cursor, gap)?;
        }

        self.cursor = next_cursor;
        Ok(())
    }

    /// Zero everything between the cursor and the end of the LS ucode area
    ///
    /// Fails when claimed content already reaches past `end`.
    pub fn finish<E: LsVerificationEnv>(&mut self, env: &mut E, end: u32) -> AcrResult<()> {
        if self.cursor > end {
            Err(AcrError::ACR_SCRUB_FINAL_CURSOR_MISMATCH)?;
        }
        self.scrub_gap(env, end, 0)
    }

    /// Overwrite `len` bytes at `offset` with zeros
    pub fn zero_fill<E: LsVerificationEnv>(
        &mut self,
        env: &mut E,
        offset: u32,
        len: u32,
    ) -> AcrResult<()> {
        self.prepare();

        let end = offset
            .checked_add(len)
            .ok_or(AcrError::ACR_SCRUB_CURSOR_OVERFLOW)?;
        let mut at = offset;
        while at < end {
            let chunk = core::cmp::min(end - at, ZERO_BUF_SIZE as u32);
            env.dma_write_all(&self.zero_buf[..chunk as usize], at)?;
            at += chunk;
        }
        Ok(())
    }

    /// Zero the code and data sections of a rejected image
    pub fn scrub_image<E: LsVerificationEnv>(
        &mut self,
        env: &mut E,
        lsb: &LsbHeader,
    ) -> AcrResult<()> {
        let code = lsb.code_range();
        self.zero_fill(env, code.start, code.end - code.start)?;

        let data = lsb.data_range();
        if data.end > data.start {
            self.zero_fill(env, data.start, data.end - data.start)?;
        }
        Ok(())
    }
}
