/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures for the records staged in the WPR.

--*/

#![cfg_attr(not(feature = "std"), no_std)]

use core::ops::Range;

use getset::{CopyGetters, Getters, MutGetters, Setters};
use zerocopy::{AsBytes, FromBytes};

pub const LSF_FALCON_ID_PMU: u32 = 0;
pub const LSF_FALCON_ID_DPU: u32 = 1;
pub const LSF_FALCON_ID_FECS: u32 = 2;
pub const LSF_FALCON_ID_GPCCS: u32 = 3;
pub const LSF_FALCON_ID_NVDEC: u32 = 4;
pub const LSF_FALCON_ID_SEC2: u32 = 7;
pub const LSF_FALCON_ID_GSPLITE: u32 = 8;
pub const LSF_FALCON_ID_NVENC: u32 = 11;
pub const LSF_FALCON_ID_END: u32 = 32;
pub const LSF_FALCON_ID_INVALID: u32 = 0xFFFF_FFFF;

pub const LSF_LSB_OFFSET_INVALID: u32 = 0xFFFF_FFFF;
pub const LSF_FALCON_BIN_VERSION_INVALID: u32 = 0xFFFF_FFFF;

pub const MAX_WPR_HEADERS: usize = LSF_FALCON_ID_END as usize;
pub const LSF_FALCON_DEP_MAP_SIZE: usize = 11;

pub const LSF_LSB_HEADER_ALIGNMENT: u32 = 16;
pub const LSF_UCODE_DATA_ALIGNMENT: u32 = 16;
pub const LSF_BL_DATA_ALIGNMENT: u32 = 16;

pub const LS_SIG_BYTE_SIZE: usize = 16;
pub const WPR_HEADER_BYTE_SIZE: usize = core::mem::size_of::<WprHeader>();
pub const LSB_HEADER_BYTE_SIZE: usize = core::mem::size_of::<LsbHeader>();

/// Magic words opening a sig-group trailer
pub const SIG_GROUP_MAGIC: [u32; 3] = [0x5347_5250, 0x4F56_4C59, 0x4C53_4143];
pub const SIG_GROUP_MAX_ID: u32 = 4;
pub const SIG_GROUP_ID_ALL: u32 = 0xFF;
pub const SIG_GROUP_MAX_ENTRIES: usize = 20;
pub const SIG_GROUP_TRAILER_BYTE_SIZE: usize = core::mem::size_of::<SigGroupTrailer>();

/// Value written over the first word of a bootloader argument blob
pub const BL_DATA_HALT_MARKER: u32 = 0x4841_4C54;

pub type LsSignature = [u8; LS_SIG_BYTE_SIZE];

/// Progress of a staged image, recorded in its WPR header
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LsImageStatus {
    None = 0,
    Copy = 1,
    ValidationCodeFailed = 2,
    ValidationDataFailed = 3,
    ValidationDone = 4,
    ValidationSkipped = 5,
    BootstrapReady = 6,
    RevocationCheckFailed = 7,
}

impl From<LsImageStatus> for u32 {
    /// Converts to this type from the input type.
    fn from(value: LsImageStatus) -> Self {
        value as u32
    }
}

impl TryFrom<u32> for LsImageStatus {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let status = match value {
            0 => Self::None,
            1 => Self::Copy,
            2 => Self::ValidationCodeFailed,
            3 => Self::ValidationDataFailed,
            4 => Self::ValidationDone,
            5 => Self::ValidationSkipped,
            6 => Self::BootstrapReady,
            7 => Self::RevocationCheckFailed,
            _ => return Err(()),
        };
        Ok(status)
    }
}

/// Section of an LS image covered by its own signature
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LsSection {
    Code = 0,
    Data = 1,
}

/// WPR header, one per staged image
#[repr(C)]
#[derive(
    AsBytes, FromBytes, Default, Debug, CopyGetters, Setters, Copy, Clone, Eq, PartialEq,
)]
pub struct WprHeader {
    /// Falcon the image is loaded on
    #[getset(get_copy = "pub", set = "pub")]
    falcon_id: u32,

    /// Offset of the LSB header inside the WPR
    #[getset(get_copy = "pub", set = "pub")]
    lsb_offset: u32,

    /// Falcon responsible for bootstrapping this one
    #[getset(get_copy = "pub", set = "pub")]
    bootstrap_owner: u32,

    /// Non-zero if the falcon is bootstrapped on demand
    #[getset(get_copy = "pub", set = "pub")]
    lazy_bootstrap: u32,

    /// Binary version of the staged image
    #[getset(get_copy = "pub", set = "pub")]
    bin_version: u32,

    /// `LsImageStatus` value
    #[getset(get_copy = "pub", set = "pub")]
    status: u32,
}

impl WprHeader {
    /// Record terminating the header table
    pub fn sentinel() -> Self {
        Self {
            falcon_id: LSF_FALCON_ID_INVALID,
            lsb_offset: LSF_LSB_OFFSET_INVALID,
            ..Default::default()
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.falcon_id == LSF_FALCON_ID_INVALID && self.lsb_offset == LSF_LSB_OFFSET_INVALID
    }

    /// Offset of the `index`th record inside the WPR
    pub fn table_offset(index: usize) -> u32 {
        (index * WPR_HEADER_BYTE_SIZE) as u32
    }
}

/// Signature block of an LSB header
#[repr(C)]
#[derive(
    AsBytes, FromBytes, Default, Debug, Getters, CopyGetters, MutGetters, Setters, Copy, Clone,
)]
pub struct LsbSignature {
    /// Production signatures, indexed by `LsSection`
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    prd_keys: [LsSignature; 2],

    /// Debug signatures, indexed by `LsSection`
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    dbg_keys: [LsSignature; 2],

    #[getset(get_copy = "pub", set = "pub")]
    prd_present: u32,

    #[getset(get_copy = "pub", set = "pub")]
    dbg_present: u32,

    #[getset(get_copy = "pub", set = "pub")]
    falcon_id: u32,

    #[getset(get_copy = "pub", set = "pub")]
    supports_versioning: u32,

    #[getset(get_copy = "pub", set = "pub")]
    version: u32,

    #[getset(get_copy = "pub", set = "pub")]
    dep_map_count: u32,

    /// `(falcon_id, min_version)` pairs
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    dep_map: [u32; LSF_FALCON_DEP_MAP_SIZE * 2],
}

impl LsbSignature {
    /// Dependency pairs, clamped to the map capacity
    pub fn dependencies(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let count = core::cmp::min(self.dep_map_count as usize, LSF_FALCON_DEP_MAP_SIZE);
        self.dep_map
            .chunks_exact(2)
            .take(count)
            .map(|pair| (pair[0], pair[1]))
    }

    pub fn set_dependency(&mut self, index: usize, falcon_id: u32, min_version: u32) {
        self.dep_map[index * 2] = falcon_id;
        self.dep_map[index * 2 + 1] = min_version;
    }

    pub fn key(&self, debug: bool, section: LsSection) -> &LsSignature {
        if debug {
            &self.dbg_keys[section as usize]
        } else {
            &self.prd_keys[section as usize]
        }
    }

    pub fn key_present(&self, debug: bool) -> bool {
        if debug {
            self.dbg_present != 0
        } else {
            self.prd_present != 0
        }
    }
}

/// LSB header, the per-image descriptor
#[repr(C)]
#[derive(
    AsBytes, FromBytes, Default, Debug, Getters, CopyGetters, MutGetters, Setters, Copy, Clone,
)]
pub struct LsbHeader {
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    signature: LsbSignature,

    /// Ucode offset inside the WPR
    #[getset(get_copy = "pub", set = "pub")]
    ucode_offset: u32,

    /// Size of the code section, bootloader included
    #[getset(get_copy = "pub", set = "pub")]
    ucode_size: u32,

    /// Size of the data section following the code
    #[getset(get_copy = "pub", set = "pub")]
    data_size: u32,

    /// Bootloader prologue at the start of the code section
    #[getset(get_copy = "pub", set = "pub")]
    bl_code_size: u32,

    #[getset(get_copy = "pub", set = "pub")]
    bl_imem_offset: u32,

    /// Bootloader argument blob offset inside the WPR
    #[getset(get_copy = "pub", set = "pub")]
    bl_data_offset: u32,

    #[getset(get_copy = "pub", set = "pub")]
    bl_data_size: u32,

    /// Application code, relative to `ucode_offset`
    #[getset(get_copy = "pub", set = "pub")]
    app_code_offset: u32,

    #[getset(get_copy = "pub", set = "pub")]
    app_code_size: u32,

    /// Application data, relative to `ucode_offset`
    #[getset(get_copy = "pub", set = "pub")]
    app_data_offset: u32,

    #[getset(get_copy = "pub", set = "pub")]
    app_data_size: u32,

    #[getset(get_copy = "pub", set = "pub")]
    flags: u32,
}

impl LsbHeader {
    pub fn data_offset(&self) -> u32 {
        self.ucode_offset.wrapping_add(self.ucode_size)
    }

    pub fn code_range(&self) -> Range<u32> {
        self.ucode_offset..self.data_offset()
    }

    pub fn data_range(&self) -> Range<u32> {
        self.data_offset()..self.data_offset().wrapping_add(self.data_size)
    }

    pub fn bl_data_range(&self) -> Range<u32> {
        self.bl_data_offset..self.bl_data_offset.wrapping_add(self.bl_data_size)
    }
}

/// Sig-group trailer header
#[repr(C)]
#[derive(AsBytes, FromBytes, Default, Debug, CopyGetters, Setters, Copy, Clone, Eq, PartialEq)]
pub struct SigGroupHeader {
    #[getset(get_copy = "pub", set = "pub")]
    magic: [u32; 3],

    #[getset(get_copy = "pub", set = "pub")]
    count: u32,
}

impl SigGroupHeader {
    pub fn is_valid(&self) -> bool {
        self.magic == SIG_GROUP_MAGIC
    }
}

/// Overlay range hashed into its own group
#[repr(C)]
#[derive(AsBytes, FromBytes, Default, Debug, CopyGetters, Setters, Copy, Clone, Eq, PartialEq)]
pub struct SigGroupEntry {
    #[getset(get_copy = "pub", set = "pub")]
    start_pc: u32,

    #[getset(get_copy = "pub", set = "pub")]
    end_pc: u32,

    #[getset(get_copy = "pub", set = "pub")]
    group_id: u32,
}

impl SigGroupEntry {
    pub fn new(start_pc: u32, end_pc: u32, group_id: u32) -> Self {
        Self {
            start_pc,
            end_pc,
            group_id,
        }
    }

    pub fn pc_range(&self) -> Range<u32> {
        self.start_pc..self.end_pc
    }
}

/// Trailer as laid out at the end of the ucode code section
#[repr(C)]
#[derive(AsBytes, FromBytes, Default, Debug, Getters, MutGetters, Setters, Copy, Clone)]
pub struct SigGroupTrailer {
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    header: SigGroupHeader,

    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    entries: [SigGroupEntry; SIG_GROUP_MAX_ENTRIES],
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    #[test]
    fn test_record_sizes() {
        assert_eq!(WPR_HEADER_BYTE_SIZE, 24);
        assert_eq!(core::mem::size_of::<LsbSignature>(), 176);
        assert_eq!(LSB_HEADER_BYTE_SIZE, 224);
        assert_eq!(SIG_GROUP_TRAILER_BYTE_SIZE, 256);
    }

    #[test]
    fn test_lsb_header_layout() {
        assert_eq!(offset_of!(LsbHeader, signature), 0);
        assert_eq!(offset_of!(LsbHeader, ucode_offset), 176);
        assert_eq!(offset_of!(LsbHeader, bl_data_offset), 196);
        assert_eq!(offset_of!(LsbHeader, flags), 220);
        assert_eq!(offset_of!(LsbSignature, version), 80);
        assert_eq!(offset_of!(LsbSignature, dep_map), 88);
    }

    #[test]
    fn test_status_from_u32() {
        for status in [
            LsImageStatus::None,
            LsImageStatus::Copy,
            LsImageStatus::ValidationDone,
            LsImageStatus::RevocationCheckFailed,
        ] {
            assert_eq!(LsImageStatus::try_from(u32::from(status)), Ok(status));
        }
        assert_eq!(LsImageStatus::try_from(8), Err(()));
    }

    #[test]
    fn test_sentinel() {
        assert!(WprHeader::sentinel().is_sentinel());
        let mut header = WprHeader::sentinel();
        header.set_lsb_offset(0x100);
        assert!(!header.is_sentinel());
        assert!(!WprHeader::default().is_sentinel());
    }

    #[test]
    fn test_wpr_header_round_trip_bytes() {
        let mut header = WprHeader::default();
        header
            .set_falcon_id(LSF_FALCON_ID_SEC2)
            .set_lsb_offset(0x40)
            .set_bin_version(3);
        let parsed = WprHeader::read_from(header.as_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&header.as_bytes()[..8], &[7, 0, 0, 0, 0x40, 0, 0, 0]);
    }

    #[test]
    fn test_dependencies_clamped() {
        let mut sig = LsbSignature::default();
        sig.set_dependency(0, LSF_FALCON_ID_PMU, 2);
        sig.set_dependency(1, LSF_FALCON_ID_FECS, 5);
        sig.set_dep_map_count(1);
        assert_eq!(
            sig.dependencies().collect::<Vec<_>>(),
            vec![(LSF_FALCON_ID_PMU, 2)]
        );
        sig.set_dep_map_count(100);
        assert_eq!(sig.dependencies().count(), LSF_FALCON_DEP_MAP_SIZE);
    }

    #[test]
    fn test_sections() {
        let mut lsb = LsbHeader::default();
        lsb.set_ucode_offset(0x100).set_ucode_size(0x200).set_data_size(0x40);
        assert_eq!(lsb.code_range(), 0x100..0x300);
        assert_eq!(lsb.data_range(), 0x300..0x340);
    }

    #[test]
    fn test_signature_key_selection() {
        let mut sig = LsbSignature::default();
        sig.prd_keys_mut()[1] = [1; 16];
        sig.dbg_keys_mut()[0] = [2; 16];
        sig.set_prd_present(1);
        assert_eq!(sig.key(false, LsSection::Data), &[1; 16]);
        assert_eq!(sig.key(true, LsSection::Code), &[2; 16]);
        assert!(sig.key_present(false));
        assert!(!sig.key_present(true));
    }
}
