/*++

Licensed under the Apache-2.0 license.

File Name:

   generator.rs

Abstract:

    WPR image generator

--*/
use anyhow::{bail, Context};
use acr_image_types::*;
use zerocopy::AsBytes;

use crate::*;

const IMAGE_ALIGNMENT: u32 = 256;
const BL_DATA_PLACEMENT: u32 = 64;

fn align_up(value: u32, align: u32) -> anyhow::Result<u32> {
    value
        .checked_add(align - 1)
        .map(|v| v / align * align)
        .context("WPR layout overflows 32 bits")
}

fn pad_to_block(bytes: &[u8]) -> Vec<u8> {
    let mut padded = bytes.to_vec();
    padded.resize((bytes.len() + 15) / 16 * 16, 0);
    padded
}

/// Placement of one image's records
struct Placement {
    lsb_offset: u32,
    lsb: LsbHeader,
    code: Vec<u8>,
    data: Vec<u8>,
    end: u32,
}

/// WPR generator
pub struct WprGenerator<Crypto: WprGeneratorCrypto> {
    crypto: Crypto,
}

impl<Crypto: WprGeneratorCrypto> WprGenerator<Crypto> {
    /// Create an instance `WprGenerator`
    pub fn new(crypto: Crypto) -> Self {
        Self { crypto }
    }

    /// Generate the WPR contents
    ///
    /// # Arguments
    ///
    /// * `config` - Generator configuration
    ///
    /// # Returns
    ///
    /// * `WprImage` - Region bytes and the placement of every image
    pub fn generate(&self, config: &WprGeneratorConfig) -> anyhow::Result<WprImage> {
        if config.images.is_empty() {
            bail!("WPR needs at least one image");
        }
        if config.images.len() > MAX_WPR_HEADERS {
            bail!("WPR holds at most {MAX_WPR_HEADERS} images");
        }

        let records = core::cmp::min(config.images.len() + 1, MAX_WPR_HEADERS);
        let mut cursor = align_up((records * WPR_HEADER_BYTE_SIZE) as u32, IMAGE_ALIGNMENT)?;

        let mut placements = vec![];
        let mut staged = vec![];
        for image in config.images.iter() {
            let mut placement = self.place(image, cursor)?;
            let group_signatures = self.sign(image, &config.salt, &mut placement)?;
            cursor = align_up(placement.end, IMAGE_ALIGNMENT)?;
            staged.push(StagedImage {
                falcon_id: image.falcon_id,
                lsb_offset: placement.lsb_offset,
                lsb: placement.lsb,
                group_signatures,
            });
            placements.push(placement);
        }

        let ls_ucode_end = cursor
            .checked_add(config.tail_size)
            .context("WPR layout overflows 32 bits")?;
        let mut bytes = vec![config.gap_fill; ls_ucode_end as usize];

        let mut write = |offset: u32, src: &[u8]| {
            bytes[offset as usize..offset as usize + src.len()].copy_from_slice(src);
        };
        for (index, (image, staged)) in config.images.iter().zip(staged.iter()).enumerate() {
            let mut header = WprHeader::default();
            header
                .set_falcon_id(image.falcon_id)
                .set_lsb_offset(staged.lsb_offset)
                .set_bootstrap_owner(LSF_FALCON_ID_SEC2)
                .set_bin_version(image.bin_version)
                .set_status(LsImageStatus::Copy.into());
            write(WprHeader::table_offset(index), header.as_bytes());
        }
        if config.images.len() < MAX_WPR_HEADERS {
            write(
                WprHeader::table_offset(config.images.len()),
                WprHeader::sentinel().as_bytes(),
            );
        }
        for (image, (placement, staged)) in config
            .images
            .iter()
            .zip(placements.iter().zip(staged.iter()))
        {
            write(placement.lsb_offset, staged.lsb.as_bytes());
            write(staged.lsb.ucode_offset(), &placement.code);
            write(staged.lsb.data_offset(), &placement.data);
            if !image.bl_data.is_empty() {
                write(staged.lsb.bl_data_offset(), &image.bl_data);
            }
        }

        Ok(WprImage {
            bytes,
            ls_ucode_end,
            images: staged,
        })
    }

    /// Lay out one image starting at `cursor`
    fn place(&self, image: &LsImageConfig, cursor: u32) -> anyhow::Result<Placement> {
        if image.falcon_id >= LSF_FALCON_ID_END {
            bail!("Falcon id {} out of range", image.falcon_id);
        }
        if image.dependencies.len() > LSF_FALCON_DEP_MAP_SIZE {
            bail!(
                "Falcon {} declares more than {LSF_FALCON_DEP_MAP_SIZE} dependencies",
                image.falcon_id
            );
        }
        if image.sig_groups.len() > SIG_GROUP_MAX_ENTRIES {
            bail!(
                "Falcon {} declares more than {SIG_GROUP_MAX_ENTRIES} sig groups",
                image.falcon_id
            );
        }
        if image.bl_code_size % 16 != 0 {
            bail!("Bootloader code size of falcon {} is misaligned", image.falcon_id);
        }

        let mut code = pad_to_block(&image.code);
        if code.is_empty() {
            bail!("Falcon {} has an empty code section", image.falcon_id);
        }
        if image.bl_code_size as usize > code.len() {
            bail!(
                "Bootloader code of falcon {} larger than its code section",
                image.falcon_id
            );
        }
        if !image.sig_groups.is_empty() {
            if code.len() < image.bl_code_size as usize + SIG_GROUP_TRAILER_BYTE_SIZE {
                bail!(
                    "Code section of falcon {} cannot hold a sig-group trailer",
                    image.falcon_id
                );
            }
            let mut trailer = SigGroupTrailer::default();
            trailer
                .header_mut()
                .set_magic(SIG_GROUP_MAGIC)
                .set_count(image.sig_groups.len() as u32);
            trailer.entries_mut()[..image.sig_groups.len()].copy_from_slice(&image.sig_groups);
            let at = code.len() - SIG_GROUP_TRAILER_BYTE_SIZE;
            code[at..].copy_from_slice(trailer.as_bytes());
        }
        let data = pad_to_block(&image.data);

        let lsb_offset = cursor;
        let ucode_offset = align_up(lsb_offset + LSB_HEADER_BYTE_SIZE as u32, IMAGE_ALIGNMENT)?;
        let data_offset = ucode_offset + code.len() as u32;
        let data_end = data_offset + data.len() as u32;

        let mut lsb = LsbHeader::default();
        lsb.set_ucode_offset(ucode_offset)
            .set_ucode_size(code.len() as u32)
            .set_data_size(data.len() as u32)
            .set_bl_code_size(image.bl_code_size)
            .set_app_code_offset(image.bl_code_size)
            .set_app_code_size(code.len() as u32 - image.bl_code_size)
            .set_app_data_offset(code.len() as u32)
            .set_app_data_size(data.len() as u32);

        let mut end = data_end;
        if !image.bl_data.is_empty() {
            let bl_data_offset = align_up(data_end, BL_DATA_PLACEMENT)?;
            lsb.set_bl_data_offset(bl_data_offset)
                .set_bl_data_size(image.bl_data.len() as u32);
            end = bl_data_offset + image.bl_data.len() as u32;
        }

        let sig = lsb.signature_mut();
        sig.set_falcon_id(image.falcon_id)
            .set_supports_versioning(image.versioning as u32)
            .set_version(image.signed_version.unwrap_or(image.bin_version))
            .set_dep_map_count(image.dependencies.len() as u32);
        for (i, (falcon_id, min_version)) in image.dependencies.iter().enumerate() {
            sig.set_dependency(i, *falcon_id, *min_version);
        }

        Ok(Placement {
            lsb_offset,
            lsb,
            code,
            data,
            end,
        })
    }

    /// Per-falcon key derived from the salt
    pub fn derive_key(&self, salt: &[u8; 16], falcon_id: u32) -> anyhow::Result<[u8; 16]> {
        let mut key = *salt;
        for (k, id) in key.iter_mut().zip(falcon_id.to_le_bytes()) {
            *k ^= id;
        }
        self.crypto.aes_encrypt(&key, salt)
    }

    /// Signature of one section
    pub fn section_signature(
        &self,
        derived_key: &[u8; 16],
        section: &[u8],
        sig: &LsbSignature,
    ) -> anyhow::Result<[u8; 16]> {
        let mut chain = self.crypto.chain_hash(section)?;
        if sig.supports_versioning() != 0 {
            let mut packed = sig.version().to_le_bytes().to_vec();
            for (falcon_id, min_version) in sig.dependencies() {
                packed.extend_from_slice(&falcon_id.to_le_bytes());
                packed.extend_from_slice(&min_version.to_le_bytes());
            }
            self.crypto
                .chain_update(&mut chain, &pad_to_block(&packed))?;
        }
        self.crypto.aes_encrypt(derived_key, &chain)
    }

    /// Sig-group signatures of a code section
    ///
    /// The section is streamed in `GEN_DMA_BLOCK_SIZE` blocks; within a block
    /// entries contribute in trailer order.
    pub fn group_signatures(
        &self,
        derived_key: &[u8; 16],
        code: &[u8],
        bl_code_size: u32,
        entries: &[SigGroupEntry],
    ) -> anyhow::Result<Vec<(u32, [u8; 16])>> {
        let mut chains = [[0u8; 16]; SIG_GROUP_MAX_ID as usize + 1];
        let mut touched = [false; SIG_GROUP_MAX_ID as usize + 1];
        let bl = bl_code_size as usize;

        for block_start in (0..code.len()).step_by(GEN_DMA_BLOCK_SIZE) {
            let block_end = core::cmp::min(block_start + GEN_DMA_BLOCK_SIZE, code.len());
            for entry in entries {
                let ids = match entry.group_id() {
                    SIG_GROUP_ID_ALL => 1..=SIG_GROUP_MAX_ID,
                    id @ 1..=SIG_GROUP_MAX_ID => id..=id,
                    id => bail!("Sig-group id {id} is invalid"),
                };
                let start = (bl + entry.start_pc() as usize).max(block_start).max(bl);
                let end = (bl + entry.end_pc() as usize).min(block_end);
                if start >= end {
                    continue;
                }
                for id in ids {
                    self.crypto
                        .chain_update(&mut chains[id as usize], &code[start..end])?;
                    touched[id as usize] = true;
                }
            }
        }

        let mut signatures = vec![];
        for id in 1..=SIG_GROUP_MAX_ID as usize {
            if touched[id] {
                signatures.push((id as u32, self.crypto.aes_encrypt(derived_key, &chains[id])?));
            }
        }
        Ok(signatures)
    }

    /// Sign a placed image and return its sig-group signatures
    fn sign(
        &self,
        image: &LsImageConfig,
        salt: &[u8; 16],
        placement: &mut Placement,
    ) -> anyhow::Result<Vec<(u32, [u8; 16])>> {
        let derived_key = self.derive_key(salt, image.falcon_id)?;
        let sig = *placement.lsb.signature();
        let code_sig = self.section_signature(&derived_key, &placement.code, &sig)?;
        let data_sig = if placement.data.is_empty() {
            [0u8; 16]
        } else {
            self.section_signature(&derived_key, &placement.data, &sig)?
        };

        let keys = [code_sig, data_sig];
        let signature = placement.lsb.signature_mut();
        if matches!(image.signing, SigningMode::Both | SigningMode::Production) {
            signature.set_prd_keys(keys).set_prd_present(1);
        }
        if matches!(image.signing, SigningMode::Both | SigningMode::Debug) {
            signature.set_dbg_keys(keys).set_dbg_present(1);
        }

        self.group_signatures(
            &derived_key,
            &placement.code,
            image.bl_code_size,
            &image.sig_groups,
        )
    }
}
