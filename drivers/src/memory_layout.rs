/*++

Licensed under the Apache-2.0 license.

File Name:

    memory_layout.rs

Abstract:

    Sizes of the statically reserved engine buffers.

--*/

/// Size of each of the two streaming transfer buffers
pub const DMA_BLOCK_SIZE: usize = 256;

/// Size of the zero-fill source buffer
pub const ZERO_BUF_SIZE: usize = 256;

/// Number of sig-group signature scratch registers
pub const SIG_GROUP_SCRATCH_COUNT: usize = 4;
