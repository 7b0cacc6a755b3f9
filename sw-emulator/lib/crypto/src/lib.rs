/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the ACR Emulator Crypto library.

--*/

mod aes128;

pub use aes128::{Aes128Block, AES_128_BLOCK_SIZE, AES_128_KEY_SIZE};
