/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the ACR driver interfaces.

--*/

#![cfg_attr(not(feature = "std"), no_std)]

mod aes;
mod array;
mod dma;
mod soc_ifc;

pub mod memory_layout;
pub mod printer;
pub mod wait;

pub use acr_error::{AcrError, AcrErrorKind, AcrResult};
pub use aes::BlockCipherEngine;
pub use array::{AesBlock, AES_BLOCK_SIZE_BYTES};
pub use dma::{ActiveBuffer, DmaSync, WprDma};
pub use soc_ifc::SocIfc;
