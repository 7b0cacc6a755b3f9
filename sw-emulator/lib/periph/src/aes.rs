// Licensed under the Apache-2.0 license

use acr_drivers::{AcrResult, AesBlock, BlockCipherEngine};
use acr_emu_crypto::Aes128Block;

/// Emulated AES engine
#[derive(Default)]
pub struct EmuAes {
    operations: u64,
}

impl EmuAes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks encrypted so far
    pub fn operations(&self) -> u64 {
        self.operations
    }
}

impl BlockCipherEngine for EmuAes {
    fn encrypt(&mut self, key: &AesBlock, block: &AesBlock) -> AcrResult<AesBlock> {
        self.operations += 1;
        Ok(AesBlock(Aes128Block::encrypt(key.as_bytes(), block.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_operations() {
        let mut aes = EmuAes::new();
        let a = aes.encrypt(&AesBlock::ZERO, &AesBlock::ZERO).unwrap();
        let b = aes.encrypt(&AesBlock::ZERO, &AesBlock::ZERO).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, AesBlock::ZERO);
        assert_eq!(aes.operations(), 2);
    }
}
