/*++

Licensed under the Apache-2.0 license.

File Name:

   config.rs

Abstract:

    File contains utilities for parsing WPR configuration files

--*/

use anyhow::{bail, Context};
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Region Configuration
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct RegionConfig {
    /// Master salt, hex encoded
    pub salt: String,

    /// Total region size; the unclaimed tail pads the blob up to it
    pub size: Option<u32>,

    /// Byte written to every unclaimed byte
    pub gap_fill: Option<u8>,
}

/// Section contents, read from a file or generated from a fill byte
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct SectionConfig {
    pub path: Option<PathBuf>,

    pub fill: Option<u8>,

    pub size: Option<u32>,
}

impl SectionConfig {
    /// Load the section bytes; relative paths resolve against `base`
    pub fn load(&self, base: &Path) -> anyhow::Result<Vec<u8>> {
        match (&self.path, self.fill, self.size) {
            (Some(path), None, None) => {
                let path = base.join(path);
                std::fs::read(&path)
                    .with_context(|| format!("Failed to read section file {}", path.display()))
            }
            (None, Some(fill), Some(size)) => Ok(vec![fill; size as usize]),
            _ => bail!("A section needs either `path` or both `fill` and `size`"),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct DependencyConfig {
    pub falcon_id: u32,

    pub min_version: u32,
}

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct SigGroupConfig {
    pub start_pc: u32,

    pub end_pc: u32,

    /// 1 to 4, or 255 for every group
    pub group_id: u32,
}

#[derive(Default, Serialize, Deserialize, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SigningConfig {
    #[default]
    Both,
    Production,
    Debug,
    Unsigned,
}

/// LS Image Configuration
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct ImageConfig {
    pub falcon_id: u32,

    pub version: u32,

    /// Version declared in the signature block, `version` when absent
    pub signed_version: Option<u32>,

    pub code: SectionConfig,

    pub data: Option<SectionConfig>,

    #[serde(default)]
    pub bl_code_size: u32,

    pub bl_data: Option<SectionConfig>,

    #[serde(default)]
    pub versioning: bool,

    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,

    #[serde(default)]
    pub sig_groups: Vec<SigGroupConfig>,

    #[serde(default)]
    pub signing: SigningConfig,
}

// WPR Configuration
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct WprConfig {
    pub wpr: RegionConfig,

    pub image: Vec<ImageConfig>,
}

/// Load WPR Configuration from file
pub(crate) fn load_wpr_config(path: &PathBuf) -> anyhow::Result<WprConfig> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read the config file {}", path.display()))?;

    let config: WprConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(config)
}
