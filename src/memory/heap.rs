//! The object heap
//!
//! One uniform bag of [`BLOCK_SIZE`] blocks backs every value kind;
//! the structural size checks in the kind modules are what make that
//! sound. The heap owns the pool and is the single mutation point for
//! chains, headers and reference counts, so exclusive access (`&mut
//! Heap`) is the whole concurrency story.

use itertools::Itertools;
use pretty_hex::simple_hex;

use crate::error::MemoryError;

use super::bag::BlockPool;
use super::block::{read_addr, read_link, write_link, BlockAddr, BLOCK_SIZE, LINK_SIZE};
use super::header;
use super::layout::ChainSpec;
use super::net::NetInstanceRef;
use super::signature::Signature;
use super::string::StringRef;
use super::token::{load_bits, store_bits, Token};
use super::{event, place};

/// Blocks in the default heap
pub const DEFAULT_BLOCK_COUNT: usize = 1024;

/// Largest item slot of any kind (a place item: token plus weight)
pub(crate) const MAX_ITEM_SIZE: usize = 2 * LINK_SIZE;

/// Write a kind's empty item pattern into a slot
pub(crate) fn init_item_bytes(sig: Signature, slot: &mut [u8]) {
    match sig {
        Signature::Tuple | Signature::Array => store_bits(slot, Token::invalid_bits()),
        Signature::Place => {
            store_bits(&mut slot[..LINK_SIZE], Token::invalid_bits());
            slot[LINK_SIZE..].fill(0);
        }
        _ => slot.fill(0),
    }
}

/// The block pool plus every operation on the values built in it
pub struct Heap {
    pool: BlockPool,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap::with_block_count(DEFAULT_BLOCK_COUNT)
    }

    /// A heap of `block_count` uniform blocks
    pub fn with_block_count(block_count: usize) -> Self {
        let mut pool = BlockPool::new();
        pool.add_bag(BLOCK_SIZE, block_count);
        Heap { pool }
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn total_bytes(&self) -> usize {
        self.pool.total_bytes()
    }

    pub fn free_bytes(&self) -> usize {
        self.pool.free_bytes()
    }

    /// Claim and zero one block
    pub(crate) fn alloc_block(&mut self) -> Result<BlockAddr, MemoryError> {
        let addr = self
            .pool
            .allocate(BLOCK_SIZE)
            .ok_or(MemoryError::NoMemory {
                requested: BLOCK_SIZE,
            })?;
        self.block_mut(addr).fill(0);
        Ok(addr)
    }

    pub(crate) fn free_block(&mut self, addr: BlockAddr) {
        self.pool.free(Some(addr));
    }

    pub(crate) fn block(&self, addr: BlockAddr) -> &[u8] {
        self.pool.block(addr).expect("dangling block address")
    }

    pub(crate) fn block_mut(&mut self, addr: BlockAddr) -> &mut [u8] {
        self.pool.block_mut(addr).expect("dangling block address")
    }

    pub(crate) fn tail_of(&self, addr: BlockAddr) -> Option<BlockAddr> {
        read_link(self.block(addr))
    }

    pub(crate) fn set_tail(&mut self, addr: BlockAddr, tail: Option<BlockAddr>) {
        write_link(self.block_mut(addr), tail);
    }

    /// A fresh zeroed head block with item and reference counts at
    /// zero
    pub(crate) fn new_head(&mut self, sig: Signature) -> Result<BlockAddr, MemoryError> {
        debug_assert!(sig.is_indexable(), "head factory is for indexable kinds");
        let addr = self.alloc_block()?;
        let block = self.block_mut(addr);
        if sig.is_collectable() {
            header::init_ic(block, sig.tag());
        } else {
            header::init_i(block, sig.tag());
        }
        Ok(addr)
    }

    // ------------------------------------------------------------
    // generic, signature-dispatched surface
    // ------------------------------------------------------------

    /// Classify a type-erased head block
    pub fn signature_of(&self, addr: BlockAddr) -> Signature {
        Signature::from_tag(header::signature_tag(self.block(addr))).expect("corrupt signature")
    }

    /// Items stored in an indexable value (zero for the others)
    pub fn item_count(&self, addr: BlockAddr) -> u32 {
        let sig = self.signature_of(addr);
        if !sig.is_indexable() {
            return 0;
        }
        if sig.is_collectable() {
            header::ic_item_count(self.block(addr))
        } else {
            header::i_item_count(self.block(addr))
        }
    }

    /// References outstanding on a collectable value (zero for the
    /// others)
    pub fn ref_count(&self, addr: BlockAddr) -> u32 {
        if self.signature_of(addr).is_collectable() {
            header::ic_ref_count(self.block(addr))
        } else {
            0
        }
    }

    /// Update the header item count alone; the chain must already
    /// match
    pub(crate) fn set_item_count_raw(
        &mut self,
        addr: BlockAddr,
        count: u32,
    ) -> Result<(), MemoryError> {
        let sig = self.signature_of(addr);
        let spec = sig.chain_spec().expect("indexable value");
        if spec.max_items != u32::MAX && count > spec.max_items {
            return Err(MemoryError::CollectionFull {
                limit: spec.max_items,
                value: self.render(addr),
            });
        }
        let block = self.block_mut(addr);
        if sig.is_collectable() {
            header::ic_set_item_count(block, count);
        } else {
            header::i_set_item_count(block, count);
        }
        Ok(())
    }

    /// Blocks in the value's chain by the closed form
    pub fn block_count(&self, addr: BlockAddr) -> u32 {
        match self.signature_of(addr).chain_spec() {
            Some(spec) => spec.block_count(self.item_count(addr)),
            None => 1,
        }
    }

    /// The chain's block addresses, head first, following tail links
    pub fn chain_blocks(&self, addr: BlockAddr) -> Vec<BlockAddr> {
        let count = self.block_count(addr);
        let mut chain = Vec::with_capacity(count as usize);
        chain.push(addr);
        let mut current = addr;
        for _ in 1..count {
            current = self.tail_of(current).expect("broken chain");
            chain.push(current);
        }
        chain
    }

    /// Blocks actually reachable by following tail links
    pub fn walked_block_count(&self, addr: BlockAddr) -> u32 {
        self.chain_blocks(addr).len() as u32
    }

    /// Count one more reference to a collectable value (no-op
    /// otherwise)
    pub fn reference(&mut self, addr: BlockAddr) {
        if self.signature_of(addr).is_collectable() {
            let block = self.block_mut(addr);
            let count = header::ic_ref_count(block);
            header::ic_set_ref_count(block, count + 1);
        }
    }

    /// Release one reference to a collectable value, destroying it
    /// when none remain; the destroyed case reports `None`
    pub fn unreference(&mut self, addr: BlockAddr) -> Option<BlockAddr> {
        if !self.signature_of(addr).is_collectable() {
            return Some(addr);
        }
        let block = self.block_mut(addr);
        let count = header::ic_ref_count(block).saturating_sub(1);
        header::ic_set_ref_count(block, count);
        if count == 0 {
            self.value_delete(addr);
            None
        } else {
            Some(addr)
        }
    }

    /// Destroy a value outright: release everything its items own,
    /// then return every chain block to the pool
    pub fn value_delete(&mut self, addr: BlockAddr) {
        match self.signature_of(addr) {
            Signature::Template => self.free_block(addr),
            Signature::Event => {
                let bits = event::stored_token_bits(self.block(addr));
                self.release_token_bits(bits);
                self.free_block(addr);
            }
            Signature::NetInstance => {
                self.net_unregister(addr);
                self.delete_indexable(addr);
            }
            _ => self.delete_indexable(addr),
        }
    }

    fn delete_indexable(&mut self, addr: BlockAddr) {
        let sig = self.signature_of(addr);
        let spec = sig.chain_spec().expect("indexable value");
        let item_count = self.item_count(addr);
        let chain = self.chain_blocks(addr);

        for (bi, &block) in chain.iter().enumerate() {
            let stored = spec.block_items_at(bi as u32, item_count);
            for local in 0..stored {
                let offset = spec.item_offset(bi == 0, local);
                let mut buf = [0u8; MAX_ITEM_SIZE];
                let item = &mut buf[..spec.item_size];
                item.copy_from_slice(&self.block(block)[offset..offset + spec.item_size]);
                self.release_item(sig, item);
            }
        }
        for block in chain {
            self.free_block(block);
        }
    }

    /// Release whatever one stored item slot owns
    pub(crate) fn release_item(&mut self, sig: Signature, item: &[u8]) {
        match sig {
            Signature::String => {}
            Signature::Tuple | Signature::Array => {
                self.release_token_bits(load_bits(item));
            }
            Signature::Place => {
                self.release_token_bits(place::item_token_bits(item));
            }
            Signature::NetInstance => {
                if let Some(place) = read_addr(&item[..LINK_SIZE]) {
                    self.value_delete(place);
                }
            }
            Signature::Template | Signature::Event => {}
        }
    }

    // ------------------------------------------------------------
    // chain growth and shrinkage
    // ------------------------------------------------------------

    /// Link a fresh tail onto the chain's current last block,
    /// relocating the items that borrowed the link area
    pub(crate) fn append_block(
        &mut self,
        last_block: BlockAddr,
        is_head: bool,
        spec: &ChainSpec,
        sig: Signature,
    ) -> Result<BlockAddr, MemoryError> {
        let tail = self.alloc_block()?;
        let (last_cap, not_last_cap) = if is_head {
            (spec.last, spec.not_last)
        } else {
            (spec.tail_last, spec.tail_not_last)
        };

        for slot in not_last_cap..last_cap {
            let src = spec.item_offset(is_head, slot);
            let dest = spec.item_offset(false, slot - not_last_cap);
            let mut buf = [0u8; MAX_ITEM_SIZE];
            let item = &mut buf[..spec.item_size];
            item.copy_from_slice(&self.block(last_block)[src..src + spec.item_size]);
            self.block_mut(tail)[dest..dest + spec.item_size].copy_from_slice(item);
            init_item_bytes(
                sig,
                &mut self.block_mut(last_block)[src..src + spec.item_size],
            );
        }

        // the link lands over the vacated slot space
        self.set_tail(last_block, Some(tail));
        Ok(tail)
    }

    /// Set an indexable value's item count, restructuring the chain so
    /// the closed form stays exact: growth appends and initialises,
    /// shrinkage releases trimmed items and reclaims blocks
    pub fn set_item_count(&mut self, addr: BlockAddr, count: u32) -> Result<(), MemoryError> {
        let sig = self.signature_of(addr);
        assert!(sig.is_indexable(), "set_item_count on non-indexable value");
        let spec = sig.chain_spec().expect("indexable value");
        if spec.max_items != u32::MAX && count > spec.max_items {
            return Err(MemoryError::CollectionFull {
                limit: spec.max_items,
                value: self.render(addr),
            });
        }
        let old = self.item_count(addr);
        if count > old {
            self.grow_items(addr, sig, &spec, old, count)
        } else if count < old {
            self.shrink_items(addr, sig, &spec, old, count)
        } else {
            Ok(())
        }
    }

    fn grow_items(
        &mut self,
        addr: BlockAddr,
        sig: Signature,
        spec: &ChainSpec,
        old: u32,
        new: u32,
    ) -> Result<(), MemoryError> {
        let mut chain = self.chain_blocks(addr);
        let target = spec.block_count(new) as usize;

        // refuse up front rather than unpick a half-grown chain
        let needed = target.saturating_sub(chain.len());
        if self.pool.free_bytes() < needed * BLOCK_SIZE {
            return Err(MemoryError::NoMemory {
                requested: needed * BLOCK_SIZE,
            });
        }

        while chain.len() < target {
            let last = *chain.last().expect("chain never empty");
            let tail = self.append_block(last, chain.len() == 1, spec, sig)?;
            chain.push(tail);
        }
        self.set_item_count_raw(addr, new)?;

        for index in old..new {
            let bi = spec.block_index_of_item(index, new);
            let local = index - spec.capacity_through(bi as i64 - 1, new);
            let offset = spec.item_offset(bi == 0, local);
            let block = chain[bi as usize];
            init_item_bytes(
                sig,
                &mut self.block_mut(block)[offset..offset + spec.item_size],
            );
        }
        Ok(())
    }

    fn shrink_items(
        &mut self,
        addr: BlockAddr,
        sig: Signature,
        spec: &ChainSpec,
        old: u32,
        new: u32,
    ) -> Result<(), MemoryError> {
        let chain = self.chain_blocks(addr);

        // trimmed items go first, located by the old structure
        for index in new..old {
            let bi = spec.block_index_of_item(index, old);
            let local = index - spec.capacity_through(bi as i64 - 1, old);
            let offset = spec.item_offset(bi == 0, local);
            let block = chain[bi as usize];
            let mut buf = [0u8; MAX_ITEM_SIZE];
            let item = &mut buf[..spec.item_size];
            item.copy_from_slice(&self.block(block)[offset..offset + spec.item_size]);
            self.release_item(sig, item);
        }

        let target = spec.block_count(new) as usize;
        if target < chain.len() {
            // the new last block takes back the slots it lends to the
            // link; surviving items in them live at the front of the
            // next block
            let new_last = chain[target - 1];
            let donor = chain[target];
            let is_head = target == 1;
            let (last_cap, not_last_cap) = if is_head {
                (spec.last, spec.not_last)
            } else {
                (spec.tail_last, spec.tail_not_last)
            };
            let before = spec.capacity_through(target as i64 - 2, new);

            for slot in not_last_cap..last_cap {
                let dest = spec.item_offset(is_head, slot);
                let global = before + slot;
                if global < new {
                    let src = spec.item_offset(false, slot - not_last_cap);
                    let mut buf = [0u8; MAX_ITEM_SIZE];
                    let item = &mut buf[..spec.item_size];
                    item.copy_from_slice(&self.block(donor)[src..src + spec.item_size]);
                    self.block_mut(new_last)[dest..dest + spec.item_size].copy_from_slice(item);
                } else {
                    init_item_bytes(
                        sig,
                        &mut self.block_mut(new_last)[dest..dest + spec.item_size],
                    );
                }
            }

            for &block in &chain[target..] {
                self.free_block(block);
            }
        }
        self.set_item_count_raw(addr, new)
    }

    // ------------------------------------------------------------
    // item addressing
    // ------------------------------------------------------------

    /// Locate item `index`: owning block and byte offset within it
    pub(crate) fn item_location(
        &self,
        addr: BlockAddr,
        spec: &ChainSpec,
        index: u32,
        item_count: u32,
    ) -> (BlockAddr, usize) {
        let bi = spec.block_index_of_item(index, item_count);
        let mut block = addr;
        for _ in 0..bi {
            block = self.tail_of(block).expect("broken chain");
        }
        let local = index - spec.capacity_through(bi as i64 - 1, item_count);
        (block, spec.item_offset(bi == 0, local))
    }

    /// Borrow item `index`'s stored bytes
    pub(crate) fn item_bytes(
        &self,
        addr: BlockAddr,
        spec: &ChainSpec,
        index: u32,
        item_count: u32,
    ) -> &[u8] {
        let (block, offset) = self.item_location(addr, spec, index, item_count);
        &self.block(block)[offset..offset + spec.item_size]
    }

    // ------------------------------------------------------------
    // diagnostics
    // ------------------------------------------------------------

    /// Textual form of any value, for logging and fault context
    pub fn render(&self, addr: BlockAddr) -> String {
        let sig = self.signature_of(addr);
        match sig {
            Signature::String => format!(
                "String({}, rc={}, len={}, bc={}, {:?})",
                addr,
                self.ref_count(addr),
                self.item_count(addr),
                self.block_count(addr),
                self.string_to_string(StringRef(addr)),
            ),
            Signature::Tuple | Signature::Array => {
                let spec = sig.chain_spec().expect("indexable value");
                let count = self.item_count(addr);
                let items = (0..count)
                    .map(|i| self.render_token_bits(load_bits(self.item_bytes(addr, &spec, i, count))))
                    .join(", ");
                format!(
                    "{}({}, rc={}, ic={}, bc={}, [{}])",
                    sig.name(),
                    addr,
                    self.ref_count(addr),
                    count,
                    self.block_count(addr),
                    items
                )
            }
            Signature::Place => {
                let spec = sig.chain_spec().expect("indexable value");
                let count = self.item_count(addr);
                let items = (0..count)
                    .map(|i| {
                        let bytes = self.item_bytes(addr, &spec, i, count);
                        format!(
                            "{}x{}",
                            place::item_weight(bytes),
                            self.render_token_bits(place::item_token_bits(bytes))
                        )
                    })
                    .join(", ");
                format!(
                    "Place({}, ic={}, bc={}, {{{}}})",
                    addr,
                    count,
                    self.block_count(addr),
                    items
                )
            }
            Signature::NetInstance => {
                let name = self
                    .net_template(NetInstanceRef(addr))
                    .and_then(|tmpl| self.template_name(tmpl))
                    .map(|s| self.string_to_string(s))
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "NetInst({}, rc={}, ic={}, bc={}, tmpl={:?})",
                    addr,
                    self.ref_count(addr),
                    self.item_count(addr),
                    self.block_count(addr),
                    name
                )
            }
            Signature::Template => self.render_template(addr),
            Signature::Event => self.render_event(addr),
        }
    }

    /// Textual form of a token
    pub fn render_token(&self, token: &Token) -> String {
        self.render_token_bits(token.bits())
    }

    pub(crate) fn render_token_bits(&self, bits: usize) -> String {
        let token = Token::from_bits(bits);
        if !token.is_valid() {
            return "invalid".to_string();
        }
        match token.address() {
            None => format!("{}", token.as_integer()),
            Some(addr) => match token.kind() {
                super::token::TokenKind::NetRef => format!("net@{addr}"),
                _ => format!("@{addr}"),
            },
        }
    }

    /// Hex dump of one block for low-level inspection
    pub fn dump_block(&self, addr: BlockAddr) -> String {
        format!("{} {}", addr, simple_hex(&self.block(addr)))
    }
}
