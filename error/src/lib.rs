/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the ACR engine for error handling

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// ACR Error Type
/// Derives debug, copy, clone, eq, and partial eq
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AcrError(pub NonZeroU32);

/// Error class, stored in the upper 16 bits of every error code.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum AcrErrorKind {
    Configuration = 0x0001,
    Argument = 0x0002,
    Alignment = 0x0003,
    Capacity = 0x0004,
    Transfer = 0x0005,
    SignatureMismatch = 0x0006,
    RevocationFailure = 0x0007,
    Sanity = 0x0008,
    Accounting = 0x0009,
    Unreachable = 0x000A,
}

impl AcrErrorKind {
    fn from_class(class: u16) -> Option<Self> {
        let kind = match class {
            0x0001 => Self::Configuration,
            0x0002 => Self::Argument,
            0x0003 => Self::Alignment,
            0x0004 => Self::Capacity,
            0x0005 => Self::Transfer,
            0x0006 => Self::SignatureMismatch,
            0x0007 => Self::RevocationFailure,
            0x0008 => Self::Sanity,
            0x0009 => Self::Accounting,
            0x000A => Self::Unreachable,
            _ => return None,
        };
        Some(kind)
    }
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: AcrError = AcrError::new_const($value);
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(& 'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl AcrError {
    /// Create an ACR error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get an AcrError from a u32 is to
    /// use `AcrError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("AcrError cannot be 0"),
        }
    }

    /// Error class encoded in the upper half of the code.
    ///
    /// Codes that did not originate from this crate report `Unreachable`.
    pub fn kind(&self) -> AcrErrorKind {
        AcrErrorKind::from_class((self.0.get() >> 16) as u16).unwrap_or(AcrErrorKind::Unreachable)
    }

    /// Errors that indicate tampering or a broken invariant rather than a
    /// failed bus operation or a caller mistake.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            AcrErrorKind::Transfer | AcrErrorKind::Argument
        )
    }

    define_error_constants![
        (
            ACR_WPR_HEADER_NONE_FOUND,
            0x0001_0001,
            "WPR header table holds no image before the sentinel"
        ),
        (
            ACR_WPR_HEADER_INVALID_FALCON_ID,
            0x0001_0002,
            "WPR header falcon id out of range"
        ),
        (
            ACR_WPR_HEADER_HALF_SENTINEL,
            0x0001_0003,
            "WPR header has an invalid LSB offset without being a sentinel"
        ),
        (
            ACR_WPR_HEADER_DUPLICATE_FALCON_ID,
            0x0001_0004,
            "Two WPR headers describe the same falcon"
        ),
        (
            ACR_LSB_OFFSET_OUT_OF_BOUNDS,
            0x0001_0005,
            "LSB header lies outside the LS ucode area"
        ),
        (
            ACR_LSB_UCODE_OUT_OF_BOUNDS,
            0x0001_0006,
            "Ucode section lies outside the LS ucode area"
        ),
        (
            ACR_LSB_DATA_OUT_OF_BOUNDS,
            0x0001_0007,
            "Data section lies outside the LS ucode area"
        ),
        (
            ACR_LSB_BL_CODE_SIZE_INVALID,
            0x0001_0008,
            "Bootloader code larger than the ucode section"
        ),
        (
            ACR_LSB_BL_DATA_OUT_OF_BOUNDS,
            0x0001_0009,
            "Bootloader data lies outside the LS ucode area"
        ),
        (
            ACR_LSB_APP_CODE_OUT_OF_BOUNDS,
            0x0001_000A,
            "Application code range outside the ucode section"
        ),
        (
            ACR_LSB_APP_DATA_OUT_OF_BOUNDS,
            0x0001_000B,
            "Application data range outside the data section"
        ),
        (
            ACR_SIG_GROUP_INVALID_ID,
            0x0001_000C,
            "Sig-group entry carries an unknown group id"
        ),
        (
            ACR_SIG_GROUP_ENTRY_INVALID_RANGE,
            0x0001_000D,
            "Sig-group entry start is past its end"
        ),
        (
            ACR_WPR_LAYOUT_INVALID,
            0x0001_000E,
            "LS ucode area cannot hold the WPR header table"
        ),
        (
            ACR_HASH_ZERO_SIZE,
            0x0002_0001,
            "Hash requested over an empty range"
        ),
        (
            ACR_DMA_INVALID_LENGTH,
            0x0002_0002,
            "Transfer length is zero or exceeds the buffer"
        ),
        (
            ACR_HASH_UNALIGNED_CHUNK,
            0x0003_0001,
            "Hash input is not a multiple of the cipher block size"
        ),
        (
            ACR_SIG_BUFFER_UNALIGNED,
            0x0003_0002,
            "Signature buffer is not 16-byte aligned"
        ),
        (
            ACR_WPR_HEADER_LSB_OFFSET_UNALIGNED,
            0x0003_0003,
            "LSB header offset is misaligned"
        ),
        (
            ACR_LSB_UCODE_UNALIGNED,
            0x0003_0004,
            "Ucode offset or section size is misaligned"
        ),
        (
            ACR_LSB_BL_DATA_UNALIGNED,
            0x0003_0005,
            "Bootloader data offset is misaligned"
        ),
        (
            ACR_SIG_GROUP_ENTRY_UNALIGNED,
            0x0003_0006,
            "Sig-group entry bounds are misaligned"
        ),
        (
            ACR_DEP_MAP_COUNT_EXCEEDED,
            0x0004_0001,
            "Dependency map count exceeds capacity"
        ),
        (
            ACR_SIG_GROUP_COUNT_EXCEEDED,
            0x0004_0002,
            "Sig-group entry count exceeds trailer capacity"
        ),
        (
            ACR_DMA_TRANSFER_INCOMPLETE,
            0x0005_0001,
            "Transfer moved fewer bytes than requested"
        ),
        (
            ACR_DMA_OUT_OF_BOUNDS,
            0x0005_0002,
            "Transfer addresses bytes outside the protected region"
        ),
        (
            ACR_DMA_BUSY,
            0x0005_0003,
            "Transfer issued while another one is in flight"
        ),
        (
            ACR_AES_ENGINE_FAILURE,
            0x0005_0004,
            "Block cipher engine reported a failure"
        ),
        (
            ACR_SOC_SCRATCH_WRITE_FAILURE,
            0x0005_0005,
            "Sig-group scratch register write failed"
        ),
        (
            ACR_LS_SIGNATURE_MISMATCH,
            0x0006_0001,
            "Computed LS signature does not match the expected signature"
        ),
        (
            ACR_LS_SIGNATURE_NOT_PRESENT,
            0x0006_0002,
            "LS image carries no signature for the selected key set"
        ),
        (
            ACR_REVOCATION_VERSION_MISMATCH,
            0x0007_0001,
            "Signed version differs from the WPR header version"
        ),
        (
            ACR_REVOCATION_DEPENDENCY_TOO_OLD,
            0x0007_0002,
            "A staged dependency is older than required"
        ),
        (
            ACR_BL_DATA_NOT_PERMITTED,
            0x0008_0001,
            "Falcon is not permitted to carry bootloader arguments"
        ),
        (
            ACR_BL_DATA_SIZE_INVALID,
            0x0008_0002,
            "Bootloader argument blob size out of bounds"
        ),
        (
            ACR_LSB_FALCON_ID_MISMATCH,
            0x0008_0003,
            "Signature falcon id differs from the WPR header"
        ),
        (
            ACR_PROTECTION_SETUP_FAILURE,
            0x0008_0004,
            "Chip hook failed to set up falcon protections"
        ),
        (
            ACR_SCRUB_NEGATIVE_GAP,
            0x0009_0001,
            "Scrub target lies behind the scrub cursor"
        ),
        (
            ACR_SCRUB_FINAL_CURSOR_MISMATCH,
            0x0009_0002,
            "Claimed content reaches past the end of the LS ucode area"
        ),
        (
            ACR_SCRUB_CURSOR_OVERFLOW,
            0x0009_0003,
            "Scrub cursor arithmetic overflowed"
        ),
        (
            ACR_UNREACHABLE_NO_IMAGES,
            0x000A_0001,
            "Finalize reached without any image processed"
        ),
        (
            ACR_UNREACHABLE_SESSION_STATE,
            0x000A_0002,
            "Session state reached without the image it operates on"
        ),
    ];
}

impl From<core::num::NonZeroU32> for crate::AcrError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::AcrError(val)
    }
}

impl From<AcrError> for core::num::NonZeroU32 {
    fn from(val: AcrError) -> Self {
        val.0
    }
}

impl From<AcrError> for u32 {
    fn from(val: AcrError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for AcrError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(AcrError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type AcrResult<T> = Result<T, AcrError>;
