/*++

Licensed under the Apache-2.0 license.

File Name:

    array.rs

Abstract:

    File contains the 16-byte block type exchanged with the block cipher
    engine.

--*/

use acr_error::{AcrError, AcrResult};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

pub const AES_BLOCK_SIZE_BYTES: usize = 16;

/// One cipher block: a key, a plaintext, a chaining value or a signature
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Zeroize)]
pub struct AesBlock(pub [u8; AES_BLOCK_SIZE_BYTES]);

impl AesBlock {
    pub const ZERO: AesBlock = AesBlock([0u8; AES_BLOCK_SIZE_BYTES]);

    #[inline(never)]
    pub fn xor(&self, other: &AesBlock) -> AesBlock {
        let mut result = *self;
        result
            .0
            .iter_mut()
            .zip(other.0.iter())
            .for_each(|(a, b)| *a ^= b);
        result
    }

    /// Comparison whose running time does not depend on where the blocks differ.
    pub fn ct_eq(&self, other: &AesBlock) -> bool {
        bool::from(self.0[..].ct_eq(&other.0[..]))
    }

    pub fn as_bytes(&self) -> &[u8; AES_BLOCK_SIZE_BYTES] {
        &self.0
    }
}

impl From<[u8; AES_BLOCK_SIZE_BYTES]> for AesBlock {
    fn from(value: [u8; AES_BLOCK_SIZE_BYTES]) -> Self {
        Self(value)
    }
}

impl<'a> From<&'a [u8; AES_BLOCK_SIZE_BYTES]> for AesBlock {
    fn from(value: &'a [u8; AES_BLOCK_SIZE_BYTES]) -> Self {
        Self(*value)
    }
}

impl From<AesBlock> for [u8; AES_BLOCK_SIZE_BYTES] {
    fn from(value: AesBlock) -> Self {
        value.0
    }
}

impl<'a> TryFrom<&'a [u8]> for AesBlock {
    type Error = AcrError;

    fn try_from(value: &'a [u8]) -> AcrResult<Self> {
        <[u8; AES_BLOCK_SIZE_BYTES]>::try_from(value)
            .map(Self)
            .map_err(|_| AcrError::ACR_SIG_BUFFER_UNALIGNED)
    }
}
