/*++

Licensed under the Apache-2.0 license.

File Name:

   verify.rs

Abstract:

    File contains implementation of the WPR verification command. The
    engine runs against the image inside the software emulator.

--*/

use crate::create::parse_salt;
use acr_common::{LsFirmwareVerificationEnv, VerificationPolicy, WprLayout};
use acr_drivers::AesBlock;
use acr_emu_periph::{EmuAes, EmuSocIfc, EmuWpr};
use acr_image_types::{LsImageStatus, WprHeader, MAX_WPR_HEADERS, SIG_GROUP_MAX_ID};
use anyhow::{anyhow, Context};
use clap::ArgMatches;
use std::path::PathBuf;
use zerocopy::FromBytes;

/// Falcon id and status of every record in a persisted header table
///
/// A status outside `LsImageStatus` is returned raw.
fn persisted_statuses(wpr: &[u8]) -> Vec<(u32, Result<LsImageStatus, u32>)> {
    wpr.chunks_exact(core::mem::size_of::<WprHeader>())
        .take(MAX_WPR_HEADERS)
        .filter_map(WprHeader::read_from)
        .take_while(|header| !header.is_sentinel())
        .map(|header| {
            let status = LsImageStatus::try_from(header.status()).map_err(|_| header.status());
            (header.falcon_id(), status)
        })
        .collect()
}

/// Run the command
pub(crate) fn run_cmd(args: &ArgMatches) -> anyhow::Result<()> {
    let image_path: &PathBuf = args
        .get_one::<PathBuf>("image")
        .with_context(|| "image arg not specified")?;

    let salt: &String = args
        .get_one::<String>("salt")
        .with_context(|| "salt arg not specified")?;

    let unsigned: Vec<u32> = args
        .get_many::<u32>("unsigned")
        .map(|ids| ids.copied().collect())
        .unwrap_or_default();

    let bytes = std::fs::read(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let ls_ucode_end = match args.get_one::<u32>("ls-ucode-end") {
        Some(end) => *end,
        None => u32::try_from(bytes.len()).with_context(|| "Image too large")?,
    };

    let policy = VerificationPolicy {
        production: !args.get_flag("non-production"),
        verify_signatures: !args.get_flag("no-signatures"),
        skip_gap_scrub: args.get_flag("skip-gap-scrub"),
        unsigned_allow_list: &unsigned,
        ..VerificationPolicy::production(AesBlock::from(parse_salt(salt)?))
    };

    let wpr = EmuWpr::from_bytes(bytes);
    let soc = EmuSocIfc::new(args.get_flag("debug"));
    let mut dma = wpr.clone();
    let mut aes = EmuAes::new();
    let mut soc_ifc = soc.clone();
    let mut env = LsFirmwareVerificationEnv {
        dma: &mut dma,
        aes: &mut aes,
        soc_ifc: &mut soc_ifc,
    };
    let result = env.verify(policy, WprLayout { ls_ucode_end });

    if let Some(out_path) = args.get_one::<PathBuf>("out") {
        std::fs::write(out_path, wpr.bytes())
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
    }

    if result.is_err() {
        for (falcon_id, status) in persisted_statuses(&wpr.bytes()) {
            match status {
                Ok(status) => println!("falcon {falcon_id:2}  {status:?}"),
                Err(raw) => println!("falcon {falcon_id:2}  unknown status {raw:#x}"),
            }
        }
    }

    let info = result.map_err(|err| {
        anyhow!(
            "WPR verification failed: error {:#010x}, last failing falcon {:?}",
            u32::from(err),
            soc.failure_reg()
        )
    })?;

    for image in info.images.iter() {
        println!(
            "falcon {:2}  {:?}  cursor {:#07x}",
            image.falcon_id, image.status, image.cursor
        );
    }
    for group_id in 1..=SIG_GROUP_MAX_ID {
        if let Some(sig) = soc.sig_group_signature(group_id) {
            println!("sig group {group_id}: {}", hex::encode(sig.as_bytes()));
        }
    }
    for protection in soc.protections() {
        println!(
            "falcon {:2} protected  code {:#x?}  data {:#x?}",
            protection.falcon_id, protection.code, protection.data
        );
    }
    println!("WPR verified, final cursor {:#x}", info.cursor);

    Ok(())
}
