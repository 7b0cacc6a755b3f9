/*++

Licensed under the Apache-2.0 license.

File Name:

    wpr.rs

Abstract:

    Readers for the records staged in the WPR: the header table, the LSB
    headers and the sig-group trailers.

--*/

use crate::sig_group::SigGroups;
use crate::{LsVerificationEnv, WprLayout};
use acr_drivers::*;
use acr_image_types::*;
use zerocopy::AsBytes;

/// Iterator over the WPR header table
///
/// Stops at the sentinel record, after `MAX_WPR_HEADERS` records, or after
/// the first error.
pub struct WprHeaderScanner<'a, E: LsVerificationEnv> {
    env: &'a mut E,
    layout: WprLayout,
    index: usize,
    done: bool,
}

impl<'a, E: LsVerificationEnv> WprHeaderScanner<'a, E> {
    pub fn new(env: &'a mut E, layout: WprLayout) -> Self {
        Self {
            env,
            layout,
            index: 0,
            done: false,
        }
    }

    fn read(&mut self) -> AcrResult<Option<WprHeader>> {
        let offset = WprHeader::table_offset(self.index);
        if offset as usize + WPR_HEADER_BYTE_SIZE > self.layout.ls_ucode_end as usize {
            Err(AcrError::ACR_WPR_LAYOUT_INVALID)?;
        }

        let mut header = WprHeader::default();
        self.env.dma_read_exact(header.as_bytes_mut(), offset)?;
        if header.is_sentinel() {
            return Ok(None);
        }

        if header.falcon_id() >= LSF_FALCON_ID_END {
            Err(AcrError::ACR_WPR_HEADER_INVALID_FALCON_ID)?;
        }
        if header.lsb_offset() == LSF_LSB_OFFSET_INVALID {
            Err(AcrError::ACR_WPR_HEADER_HALF_SENTINEL)?;
        }
        if header.lsb_offset() % LSF_LSB_HEADER_ALIGNMENT != 0 {
            Err(AcrError::ACR_WPR_HEADER_LSB_OFFSET_UNALIGNED)?;
        }
        Ok(Some(header))
    }
}

impl<'a, E: LsVerificationEnv> Iterator for WprHeaderScanner<'a, E> {
    type Item = AcrResult<WprHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.index >= MAX_WPR_HEADERS {
            return None;
        }

        match self.read() {
            Ok(Some(header)) => {
                self.index += 1;
                Some(Ok(header))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn is_aligned(value: u32) -> bool {
    value % LSF_UCODE_DATA_ALIGNMENT == 0
}

fn end_of(offset: u32, size: u32) -> Option<u32> {
    offset.checked_add(size)
}

/// Read and validate the LSB header of a staged image
///
/// # Arguments
///
/// * `env` - Verification environment
/// * `header` - WPR header of the image
/// * `layout` - WPR geometry
/// * `table_end` - End of the WPR header table
pub fn read_lsb_header<E: LsVerificationEnv>(
    env: &mut E,
    header: &WprHeader,
    layout: &WprLayout,
    table_end: u32,
) -> AcrResult<LsbHeader> {
    let limit = layout.ls_ucode_end;
    let lsb_offset = header.lsb_offset();
    let lsb_end = end_of(lsb_offset, LSB_HEADER_BYTE_SIZE as u32)
        .ok_or(AcrError::ACR_LSB_OFFSET_OUT_OF_BOUNDS)?;
    if lsb_offset < table_end || lsb_end > limit {
        Err(AcrError::ACR_LSB_OFFSET_OUT_OF_BOUNDS)?;
    }

    let mut lsb = LsbHeader::default();
    env.dma_read_exact(lsb.as_bytes_mut(), lsb_offset)?;

    if !is_aligned(lsb.ucode_offset())
        || !is_aligned(lsb.ucode_size())
        || !is_aligned(lsb.data_size())
        || !is_aligned(lsb.bl_code_size())
    {
        Err(AcrError::ACR_LSB_UCODE_UNALIGNED)?;
    }

    let code_end = end_of(lsb.ucode_offset(), lsb.ucode_size())
        .ok_or(AcrError::ACR_LSB_UCODE_OUT_OF_BOUNDS)?;
    if lsb.ucode_size() == 0 || lsb.ucode_offset() < lsb_end || code_end > limit {
        Err(AcrError::ACR_LSB_UCODE_OUT_OF_BOUNDS)?;
    }

    let data_end =
        end_of(code_end, lsb.data_size()).ok_or(AcrError::ACR_LSB_DATA_OUT_OF_BOUNDS)?;
    if data_end > limit {
        Err(AcrError::ACR_LSB_DATA_OUT_OF_BOUNDS)?;
    }

    if lsb.bl_code_size() > lsb.ucode_size() {
        Err(AcrError::ACR_LSB_BL_CODE_SIZE_INVALID)?;
    }

    let app_code_end = end_of(lsb.app_code_offset(), lsb.app_code_size());
    if !matches!(app_code_end, Some(end) if end <= lsb.ucode_size()) {
        Err(AcrError::ACR_LSB_APP_CODE_OUT_OF_BOUNDS)?;
    }

    let app_data_end = end_of(lsb.app_data_offset(), lsb.app_data_size());
    let image_size = lsb.ucode_size() + lsb.data_size();
    if lsb.app_data_size() != 0
        && (lsb.app_data_offset() < lsb.ucode_size()
            || !matches!(app_data_end, Some(end) if end <= image_size))
    {
        Err(AcrError::ACR_LSB_APP_DATA_OUT_OF_BOUNDS)?;
    }

    if lsb.bl_data_size() != 0 {
        if lsb.bl_data_offset() % LSF_BL_DATA_ALIGNMENT != 0 {
            Err(AcrError::ACR_LSB_BL_DATA_UNALIGNED)?;
        }
        let bl_data_end = end_of(lsb.bl_data_offset(), lsb.bl_data_size())
            .ok_or(AcrError::ACR_LSB_BL_DATA_OUT_OF_BOUNDS)?;
        if lsb.bl_data_offset() < data_end || bl_data_end > limit {
            Err(AcrError::ACR_LSB_BL_DATA_OUT_OF_BOUNDS)?;
        }
    }

    if lsb.signature().dep_map_count() as usize > LSF_FALCON_DEP_MAP_SIZE {
        Err(AcrError::ACR_DEP_MAP_COUNT_EXCEEDED)?;
    }

    Ok(lsb)
}

/// Read the sig-group trailer at the end of an image's code section
///
/// Returns empty sig groups when the section carries no trailer.
///
/// # Arguments
///
/// * `env` - Verification environment
/// * `lsb` - Validated LSB header
/// * `trailer` - Buffer the trailer is read into
pub fn read_sig_groups<E: LsVerificationEnv>(
    env: &mut E,
    lsb: &LsbHeader,
    trailer: &mut SigGroupTrailer,
) -> AcrResult<SigGroups> {
    let app_size = lsb.ucode_size() - lsb.bl_code_size();
    if (app_size as usize) < SIG_GROUP_TRAILER_BYTE_SIZE {
        return Ok(SigGroups::default());
    }

    let offset = lsb.data_offset() - SIG_GROUP_TRAILER_BYTE_SIZE as u32;
    env.dma_read_exact(trailer.as_bytes_mut(), offset)?;
    if !trailer.header().is_valid() {
        return Ok(SigGroups::default());
    }

    let count = trailer.header().count() as usize;
    if count > SIG_GROUP_MAX_ENTRIES {
        Err(AcrError::ACR_SIG_GROUP_COUNT_EXCEEDED)?;
    }

    let entries = &trailer.entries()[..count];
    for entry in entries {
        if entry.start_pc() > entry.end_pc() {
            Err(AcrError::ACR_SIG_GROUP_ENTRY_INVALID_RANGE)?;
        }
        if !is_aligned(entry.start_pc()) || !is_aligned(entry.end_pc()) {
            Err(AcrError::ACR_SIG_GROUP_ENTRY_UNALIGNED)?;
        }
    }

    SigGroups::new(entries, lsb.bl_code_size())
}
