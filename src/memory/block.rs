//! Block size tiers and slot addressing
//!
//! Every value is built from chained blocks of exactly [`BLOCK_SIZE`]
//! bytes, all drawn from one allocator tier. The tier follows the
//! native pointer width: 16-bit targets get 16-byte blocks, 32-bit get
//! 32 and 64-bit get 64. Blocks are addressed by pool-wide slot index
//! rather than raw pointer; a chain is a sequence of slot indices with
//! each non-last block carrying the next index in its trailing bytes.

use std::fmt;
use std::num::NonZeroU32;

/// Size in bytes of every allocation block (8 × native pointer size)
pub const BLOCK_SIZE: usize = 8 * std::mem::size_of::<usize>();

/// Size in bytes of an in-block chain link or stored address field
pub const LINK_SIZE: usize = std::mem::size_of::<usize>();

const _: () = assert!(BLOCK_SIZE % LINK_SIZE == 0);
const _: () = assert!(BLOCK_SIZE == 16 || BLOCK_SIZE == 32 || BLOCK_SIZE == 64);

/// Pool-wide address of one allocation block.
///
/// Addresses are 1-based so that zero is the null link / empty address
/// in every stored form (and `Option<BlockAddr>` costs nothing).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockAddr(NonZeroU32);

impl BlockAddr {
    /// Interpret a stored word, zero meaning none
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(BlockAddr)
    }

    /// The 1-based stored form
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    /// Pool-wide slot index
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.get())
    }
}

impl fmt::Debug for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAddr({})", self.0.get())
    }
}

/// Read an address field of [`LINK_SIZE`] bytes, zero meaning none
pub(crate) fn read_addr(field: &[u8]) -> Option<BlockAddr> {
    debug_assert_eq!(field.len(), LINK_SIZE);
    let mut word = [0u8; 8];
    word[..LINK_SIZE].copy_from_slice(field);
    BlockAddr::from_raw(u64::from_le_bytes(word) as u32)
}

/// Write an address field of [`LINK_SIZE`] bytes, zero meaning none
pub(crate) fn write_addr(field: &mut [u8], addr: Option<BlockAddr>) {
    debug_assert_eq!(field.len(), LINK_SIZE);
    let raw = addr.map(BlockAddr::raw).unwrap_or(0) as u64;
    field.copy_from_slice(&raw.to_le_bytes()[..LINK_SIZE]);
}

/// Read the chain link from a non-last block
pub(crate) fn read_link(block: &[u8]) -> Option<BlockAddr> {
    read_addr(&block[BLOCK_SIZE - LINK_SIZE..])
}

/// Write the chain link of a non-last block
pub(crate) fn write_link(block: &mut [u8], link: Option<BlockAddr>) {
    write_addr(&mut block[BLOCK_SIZE - LINK_SIZE..], link)
}
