// Licensed under the Apache-2.0 license.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod verifier;

pub use acr_drivers::cprint;
pub use acr_drivers::cprintln;
pub use acr_drivers::memory_layout;
pub use acr_drivers::printer::Printer;
pub use verifier::LsFirmwareVerificationEnv;

pub use acr_image_verify::{
    LsImageInfo, LsVerificationInfo, VerificationPolicy, WprLayout, DEFAULT_BL_DATA_ALLOW_LIST,
};
