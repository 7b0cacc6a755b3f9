/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the ACR Emulator Peripheral library.

--*/

mod aes;
pub mod dma;
pub mod soc_ifc;

pub use aes::EmuAes;
pub use dma::{DmaDirection, DmaTransfer, EmuWpr};
pub use soc_ifc::{EmuSocIfc, FalconProtection};
