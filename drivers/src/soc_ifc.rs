/*++

Licensed under the Apache-2.0 license.

File Name:

    soc_ifc.rs

Abstract:

    Chip specific hooks and registers used by the LS verification flow.

--*/

use crate::AesBlock;
use acr_error::AcrResult;
use core::ops::Range;

/// SoC interface
pub trait SocIfc {
    /// Debug-fused parts verify against the debug signatures
    fn debug_mode(&self) -> bool;

    /// Record the falcon whose image failed verification.
    ///
    /// Diagnostic only; the flow never depends on it succeeding.
    fn report_failure(&mut self, falcon_id: u32);

    /// Publish the signature of sig-group `group_id` (1-based)
    fn write_sig_group_signature(&mut self, group_id: u32, sig: &AesBlock) -> AcrResult<()>;

    /// Lock a verified image's sections to its falcon
    fn setup_falcon_protections(
        &mut self,
        falcon_id: u32,
        code: Range<u32>,
        data: Range<u32>,
    ) -> AcrResult<()>;
}
