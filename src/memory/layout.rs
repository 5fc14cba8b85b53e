//! Chain capacity arithmetic
//!
//! A value is one head block plus zero or more tail blocks. Only the
//! last block of a chain has no trailing link, so it fits one extra
//! item ("borrowed" capacity); every preceding block gives up its
//! trailing [`LINK_SIZE`] bytes to the link. [`ChainSpec`] fixes the
//! four capacities for one value kind and provides the closed-form
//! functions that map item counts to block counts and item indices to
//! chain positions without walking the chain. Growth
//! (`Heap::append_block`) relocates the borrowed items, so these
//! formulas and the physical chain must agree exactly — the tests
//! below drive them against a simulated chain to prove it.

use super::block::{BLOCK_SIZE, LINK_SIZE};

/// Whether item regions are aligned down to link-sized multiples (the
/// 16-byte tier packs items unaligned to save its few bytes)
const ALIGN_ITEM_REGION: bool = BLOCK_SIZE != 16;

const fn item_region(header_size: usize) -> usize {
    let usable = BLOCK_SIZE - header_size;
    if ALIGN_ITEM_REGION {
        usable - usable % LINK_SIZE
    } else {
        usable
    }
}

/// Capacity model for one value kind's block chain.
///
/// `max_items` is the ceiling imposed by the header's item count field
/// (`u32::MAX` means effectively unbounded on the wide tiers).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChainSpec {
    /// Bytes of header at the front of the head block
    pub header_size: usize,
    /// Bytes per item slot
    pub item_size: usize,
    /// Items in the head block when it is the only block
    pub last: u32,
    /// Items in the head block when tails follow
    pub not_last: u32,
    /// Items in a tail block at the end of the chain
    pub tail_last: u32,
    /// Items in a tail block with more chain behind it
    pub tail_not_last: u32,
    /// Header ceiling on the item count
    pub max_items: u32,
}

impl ChainSpec {
    /// Derive the capacities for a kind from its header and item sizes
    /// on the native tier
    pub const fn for_layout(header_size: usize, item_size: usize, max_items: u32) -> Self {
        let region = item_region(header_size);
        ChainSpec {
            header_size,
            item_size,
            last: (region / item_size) as u32,
            not_last: ((region - LINK_SIZE) / item_size) as u32,
            tail_last: (BLOCK_SIZE / item_size) as u32,
            tail_not_last: ((BLOCK_SIZE - LINK_SIZE) / item_size) as u32,
            max_items,
        }
    }

    /// Spell out every capacity; for exercising the arithmetic of
    /// other tiers
    pub const fn from_capacities(
        header_size: usize,
        item_size: usize,
        last: u32,
        not_last: u32,
        tail_last: u32,
        tail_not_last: u32,
        max_items: u32,
    ) -> Self {
        ChainSpec {
            header_size,
            item_size,
            last,
            not_last,
            tail_last,
            tail_not_last,
            max_items,
        }
    }

    /// Number of blocks in the chain of a value holding `item_count`
    /// items
    pub fn block_count(&self, item_count: u32) -> u32 {
        if item_count <= self.last {
            return 1;
        }
        let middle =
            item_count as i64 - self.not_last as i64 - self.tail_last as i64;
        let full = if middle > 0 {
            middle / self.tail_not_last as i64
        } else {
            0
        };
        let partial = (middle > 0 && middle % self.tail_not_last as i64 > 0) as i64;
        (2 + full + partial) as u32
    }

    /// Chain position of the block holding item `index`
    pub fn block_index_of_item(&self, index: u32, item_count: u32) -> u32 {
        if item_count <= self.last || index < self.not_last {
            return 0;
        }
        let rest = (index - self.not_last) as i64;
        let middle_blocks = (self.block_count(item_count) - 2) as i64;
        if rest >= middle_blocks * self.tail_not_last as i64 {
            (middle_blocks + 1) as u32
        } else {
            1 + (rest / self.tail_not_last as i64) as u32
        }
    }

    /// Cumulative item capacity of blocks up to and including chain
    /// position `block_index` (negative positions hold nothing)
    pub fn capacity_through(&self, block_index: i64, item_count: u32) -> u32 {
        if block_index < 0 {
            return 0;
        }
        if item_count <= self.last {
            return self.last;
        }
        if block_index < 1 {
            return self.not_last;
        }
        let end_capacity = if self.is_last_block(block_index as u32, item_count) {
            self.tail_last
        } else {
            self.tail_not_last
        };
        self.not_last + (block_index as u32 - 1) * self.tail_not_last + end_capacity
    }

    /// Whether chain position `block_index` is the final block
    pub fn is_last_block(&self, block_index: u32, item_count: u32) -> bool {
        self.block_count(item_count) <= block_index + 1
    }

    /// Item capacity of the single block at chain position
    /// `block_index`
    pub fn block_capacity_at(&self, block_index: u32, item_count: u32) -> u32 {
        if item_count <= self.last {
            return self.last;
        }
        if block_index < 1 {
            return self.not_last;
        }
        if self.is_last_block(block_index, item_count) {
            self.tail_last
        } else {
            self.tail_not_last
        }
    }

    /// Items actually stored in the block at chain position
    /// `block_index`
    pub fn block_items_at(&self, block_index: u32, item_count: u32) -> u32 {
        if self.is_last_block(block_index, item_count) {
            let preceding =
                self.capacity_through(self.block_count(item_count) as i64 - 2, item_count);
            return item_count - preceding;
        }
        if block_index < 1 {
            self.not_last
        } else {
            self.tail_not_last
        }
    }

    /// Byte offset of a block-local item slot
    pub(crate) fn item_offset(&self, is_head: bool, local_index: u32) -> usize {
        let base = if is_head { self.header_size } else { 0 };
        base + local_index as usize * self.item_size
    }
}
