/*++

Licensed under the Apache-2.0 license.

File Name:

    aes128.rs

Abstract:

    File contains single block AES-128 encryption.

--*/

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

pub const AES_128_BLOCK_SIZE: usize = 16;
pub const AES_128_KEY_SIZE: usize = 16;

/// Stateless single block AES-128 encryptor
#[derive(Default)]
pub struct Aes128Block;

impl Aes128Block {
    /// Encrypt one block under `key` and return the output.
    pub fn encrypt(
        key: &[u8; AES_128_KEY_SIZE],
        block: &[u8; AES_128_BLOCK_SIZE],
    ) -> [u8; AES_128_BLOCK_SIZE] {
        let cipher = Aes128::new(key.into());
        let mut out = (*block).into();
        cipher.encrypt_block(&mut out);
        out.into()
    }
}
