/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    Interface to the block cipher engine.

    The engine is only ever asked for single-block encryptions under a
    one-shot key: compression steps of the chaining hash, key derivation
    and signature re-encryption all reduce to that operation.

--*/

use crate::AesBlock;
use acr_error::AcrResult;

/// Block cipher engine
pub trait BlockCipherEngine {
    /// Encrypt `block` under `key`
    fn encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock>;
}
