/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures for the WPR Image Generator.

--*/

mod crypto;
mod generator;

pub use crypto::AesGeneratorCrypto;
pub use generator::WprGenerator;

use acr_image_types::*;
use core::ops::Range;

/// Block size used to stream a code section through the sig-group hashes
pub const GEN_DMA_BLOCK_SIZE: usize = 256;

/// WPR Generator Crypto Trait
pub trait WprGeneratorCrypto {
    /// Encrypt a single block
    fn aes_encrypt(&self, key: &[u8; 16], block: &[u8; 16]) -> anyhow::Result<[u8; 16]>;

    /// Fold `data` into a chaining value
    fn chain_update(&self, chain: &mut [u8; 16], data: &[u8]) -> anyhow::Result<()> {
        if data.len() % 16 != 0 {
            anyhow::bail!("Hash input of {} bytes is not block aligned", data.len());
        }
        for block in data.chunks_exact(16) {
            let mut key = [0u8; 16];
            key.copy_from_slice(block);
            let cipher = self.aes_encrypt(&key, chain)?;
            for (c, x) in chain.iter_mut().zip(cipher) {
                *c ^= x;
            }
        }
        Ok(())
    }

    /// Chaining hash of `data`
    fn chain_hash(&self, data: &[u8]) -> anyhow::Result<[u8; 16]> {
        let mut chain = [0u8; 16];
        self.chain_update(&mut chain, data)?;
        Ok(chain)
    }
}

/// Key sets an image is signed with
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum SigningMode {
    /// Production and debug signatures
    #[default]
    Both,

    Production,

    Debug,

    /// No signature present
    Unsigned,
}

/// LS image to stage
#[derive(Debug, Default, Clone)]
pub struct LsImageConfig {
    pub falcon_id: u32,

    /// Version recorded in the WPR header
    pub bin_version: u32,

    /// Version declared in the signature block, `bin_version` when absent
    pub signed_version: Option<u32>,

    /// Code section, bootloader prologue included
    pub code: Vec<u8>,

    pub data: Vec<u8>,

    pub bl_code_size: u32,

    /// Bootloader argument blob
    pub bl_data: Vec<u8>,

    /// Fold the version and dependency map into the signatures
    pub versioning: bool,

    /// `(falcon_id, min_version)` pairs
    pub dependencies: Vec<(u32, u32)>,

    /// Sig-group entries written into the code section trailer
    pub sig_groups: Vec<SigGroupEntry>,

    pub signing: SigningMode,
}

/// WPR Generator Configuration
#[derive(Debug, Default, Clone)]
pub struct WprGeneratorConfig {
    /// Salt the per-falcon keys are derived from
    pub salt: [u8; 16],

    pub images: Vec<LsImageConfig>,

    /// Byte used for every unclaimed byte of the region
    pub gap_fill: u8,

    /// Unclaimed bytes appended after the last image
    pub tail_size: u32,
}

/// Image placed in the WPR
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub falcon_id: u32,

    pub lsb_offset: u32,

    pub lsb: LsbHeader,

    /// Expected sig-group signatures, by group id
    pub group_signatures: Vec<(u32, [u8; 16])>,
}

impl StagedImage {
    /// Byte ranges the image claims in the region
    pub fn claimed(&self) -> Vec<Range<u32>> {
        let mut ranges = vec![
            self.lsb_offset..self.lsb_offset + LSB_HEADER_BYTE_SIZE as u32,
            self.lsb.ucode_offset()..self.lsb.data_range().end,
        ];
        if self.lsb.bl_data_size() != 0 {
            ranges.push(self.lsb.bl_data_range());
        }
        ranges
    }
}

/// Generated WPR contents
#[derive(Debug, Clone)]
pub struct WprImage {
    pub bytes: Vec<u8>,

    /// End of the LS ucode area, equal to the region size
    pub ls_ucode_end: u32,

    pub images: Vec<StagedImage>,
}

impl WprImage {
    /// End of the header table, sentinel included
    pub fn table_end(&self) -> u32 {
        let records = core::cmp::min(self.images.len() + 1, MAX_WPR_HEADERS);
        (records * WPR_HEADER_BYTE_SIZE) as u32
    }

    /// Whether `offset` is claimed by the header table or an image
    pub fn is_claimed(&self, offset: u32) -> bool {
        offset < self.table_end()
            || self
                .images
                .iter()
                .flat_map(|image| image.claimed())
                .any(|range| range.contains(&offset))
    }
}
