/*++

Licensed under the Apache-2.0 license.

File Name:

   mod.rs

Abstract:

    File contains implementation of the WPR image creation command.

--*/

mod config;

use acr_image_gen::*;
use acr_image_types::*;
use anyhow::{bail, Context};
use clap::ArgMatches;
use std::path::{Path, PathBuf};

use config::{ImageConfig, SigningConfig, WprConfig};

/// Run the command
pub(crate) fn run_cmd(args: &ArgMatches) -> anyhow::Result<()> {
    let config_path: &PathBuf = args
        .get_one::<PathBuf>("config")
        .with_context(|| "config arg not specified")?;

    let out_path: &PathBuf = args
        .get_one::<PathBuf>("out")
        .with_context(|| "out arg not specified")?;

    let config = config::load_wpr_config(config_path)?;
    let base = config_path.parent().unwrap_or(Path::new("."));
    let gen_config = gen_config(&config, base)?;

    let gen = WprGenerator::new(AesGeneratorCrypto);
    let mut image = gen.generate(&gen_config)?;
    if let Some(size) = config.wpr.size {
        if size < image.ls_ucode_end {
            bail!(
                "WPR size {size:#x} smaller than the staged images ({:#x})",
                image.ls_ucode_end
            );
        }
        let tail_size = size - image.ls_ucode_end;
        image = gen.generate(&WprGeneratorConfig {
            tail_size,
            ..gen_config
        })?;
    }

    std::fs::write(out_path, &image.bytes)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!("WPR image {} ({} bytes)", out_path.display(), image.bytes.len());
    for staged in image.images.iter() {
        println!(
            "  falcon {:2}  lsb {:#07x}  code {:#07x}..{:#07x}  data {:#07x}..{:#07x}",
            staged.falcon_id,
            staged.lsb_offset,
            staged.lsb.code_range().start,
            staged.lsb.code_range().end,
            staged.lsb.data_range().start,
            staged.lsb.data_range().end,
        );
        for (group_id, sig) in staged.group_signatures.iter() {
            println!("    sig group {group_id}: {}", hex::encode(sig));
        }
    }

    Ok(())
}

/// Translate the TOML configuration into a generator configuration
fn gen_config(config: &WprConfig, base: &Path) -> anyhow::Result<WprGeneratorConfig> {
    let salt = parse_salt(&config.wpr.salt)?;
    let images = config
        .image
        .iter()
        .map(|image| image_config(image, base))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(WprGeneratorConfig {
        salt,
        images,
        gap_fill: config.wpr.gap_fill.unwrap_or(0),
        tail_size: 0,
    })
}

fn image_config(image: &ImageConfig, base: &Path) -> anyhow::Result<LsImageConfig> {
    let load = |section: &Option<config::SectionConfig>| -> anyhow::Result<Vec<u8>> {
        match section {
            Some(section) => section.load(base),
            None => Ok(vec![]),
        }
    };

    Ok(LsImageConfig {
        falcon_id: image.falcon_id,
        bin_version: image.version,
        signed_version: image.signed_version,
        code: image.code.load(base)?,
        data: load(&image.data)?,
        bl_code_size: image.bl_code_size,
        bl_data: load(&image.bl_data)?,
        versioning: image.versioning,
        dependencies: image
            .dependencies
            .iter()
            .map(|dep| (dep.falcon_id, dep.min_version))
            .collect(),
        sig_groups: image
            .sig_groups
            .iter()
            .map(|group| SigGroupEntry::new(group.start_pc, group.end_pc, group.group_id))
            .collect(),
        signing: match image.signing {
            SigningConfig::Both => SigningMode::Both,
            SigningConfig::Production => SigningMode::Production,
            SigningConfig::Debug => SigningMode::Debug,
            SigningConfig::Unsigned => SigningMode::Unsigned,
        },
    })
}

/// Parse a hex encoded 16 byte salt
pub(crate) fn parse_salt(salt: &str) -> anyhow::Result<[u8; 16]> {
    let bytes = hex::decode(salt.trim()).with_context(|| "Salt is not valid hex")?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow::anyhow!("Salt is {} bytes, expected 16", bytes.len()))
}
