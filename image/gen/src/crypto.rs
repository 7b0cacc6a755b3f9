/*++

Licensed under the Apache-2.0 license.

File Name:

   crypto.rs

Abstract:

    File contains the software crypto used by the WPR generator.

--*/

use crate::WprGeneratorCrypto;
use acr_emu_crypto::Aes128Block;

/// Generator crypto backed by the software AES-128 implementation
#[derive(Default, Copy, Clone)]
pub struct AesGeneratorCrypto;

impl WprGeneratorCrypto for AesGeneratorCrypto {
    fn aes_encrypt(&self, key: &[u8; 16], block: &[u8; 16]) -> anyhow::Result<[u8; 16]> {
        Ok(Aes128Block::encrypt(key, block))
    }
}
