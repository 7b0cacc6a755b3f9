/*++

Licensed under the Apache-2.0 license.

File Name:

    revocation.rs

Abstract:

    Falcon version table and the dependency based revocation check.

--*/

use acr_drivers::*;
use acr_image_types::*;

/// Binary version of every staged falcon, indexed by falcon id
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FalconVersionTable {
    versions: [u32; LSF_FALCON_ID_END as usize],
}

impl Default for FalconVersionTable {
    fn default() -> Self {
        Self {
            versions: [LSF_FALCON_BIN_VERSION_INVALID; LSF_FALCON_ID_END as usize],
        }
    }
}

impl FalconVersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the WPR header table
    pub fn from_headers(headers: &[WprHeader]) -> Self {
        let mut table = Self::new();
        for header in headers {
            table.record(header.falcon_id(), header.bin_version());
        }
        table
    }

    pub fn record(&mut self, falcon_id: u32, version: u32) {
        if let Some(slot) = self.versions.get_mut(falcon_id as usize) {
            *slot = version;
        }
    }

    /// Version of a staged falcon
    pub fn version(&self, falcon_id: u32) -> Option<u32> {
        self.versions
            .get(falcon_id as usize)
            .copied()
            .filter(|version| *version != LSF_FALCON_BIN_VERSION_INVALID)
    }
}

/// Check an image's declared version and dependencies
///
/// # Arguments
///
/// * `table` - Versions of the staged falcons, consulted for dependencies
/// * `header` - The image's own WPR header
/// * `sig` - Signature block declaring the version and dependency map
pub fn check_revocation(
    table: &FalconVersionTable,
    header: &WprHeader,
    sig: &LsbSignature,
) -> AcrResult<()> {
    if header.bin_version() != sig.version() {
        Err(AcrError::ACR_REVOCATION_VERSION_MISMATCH)?;
    }

    for (dep_id, min_version) in sig.dependencies() {
        if matches!(table.version(dep_id), Some(version) if version < min_version) {
            return Err(AcrError::ACR_REVOCATION_DEPENDENCY_TOO_OLD);
        }
    }

    Ok(())
}
