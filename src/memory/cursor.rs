//! Cross-block cursor over a value's chain
//!
//! A cursor is `(head, current block, logical index)` and advances
//! transparently across block boundaries. Writing one past the last
//! item appends: the item count rises first and, when the closed form
//! calls for it, a tail block is linked on (with the borrowed-slot
//! relocation) before the write lands. Capacity violations report
//! `CollectionFull`, access violations `OutOfRange`; neither ever
//! touches bytes outside the allocated blocks.

use crate::error::MemoryError;

use super::block::{read_addr, write_addr, BlockAddr};
use super::heap::{Heap, MAX_ITEM_SIZE};
use super::layout::ChainSpec;
use super::place;
use super::signature::Signature;
use super::token::{load_bits, store_bits, Token};

/// Position within an indexable value's chain
#[derive(Clone, Debug)]
pub struct Cursor {
    head: BlockAddr,
    current: BlockAddr,
    index: u32,
    sig: Signature,
    spec: ChainSpec,
}

impl Heap {
    /// A cursor at the start of an indexable value
    pub fn cursor(&self, addr: BlockAddr) -> Cursor {
        let sig = self.signature_of(addr);
        let spec = sig
            .chain_spec()
            .unwrap_or_else(|| panic!("no cursor over {} values", sig.name()));
        let mut cursor = Cursor {
            head: addr,
            current: addr,
            index: 0,
            sig,
            spec,
        };
        cursor.rewind(self);
        cursor
    }
}

impl Cursor {
    pub fn head(&self) -> BlockAddr {
        self.head
    }

    pub fn current_block(&self) -> BlockAddr {
        self.current
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn at_start(&self) -> bool {
        self.index == 0
    }

    pub fn at_end(&self, heap: &Heap) -> bool {
        self.index >= heap.item_count(self.head)
    }

    /// Whether another append would still be within the kind's
    /// maximum item count
    pub fn can_append(&self) -> bool {
        self.spec.max_items == u32::MAX || self.index < self.spec.max_items
    }

    /// Chain position of the block holding the cursor's index
    pub fn block_index(&self, heap: &Heap) -> u32 {
        self.spec
            .block_index_of_item(self.index, heap.item_count(self.head))
    }

    pub fn at_block_start(&self, heap: &Heap) -> bool {
        self.local_index(heap) == 0
    }

    pub fn at_block_end(&self, heap: &Heap) -> bool {
        let count = heap.item_count(self.head);
        let bi = self.block_index(heap);
        self.spec.capacity_through(bi as i64, count) == self.index + 1
    }

    pub fn at_last_block(&self, heap: &Heap) -> bool {
        self.spec
            .is_last_block(self.block_index(heap), heap.item_count(self.head))
    }

    fn local_index(&self, heap: &Heap) -> u32 {
        let count = heap.item_count(self.head);
        let bi = self.block_index(heap);
        self.index - self.spec.capacity_through(bi as i64 - 1, count)
    }

    fn offset(&self, heap: &Heap) -> usize {
        let bi = self.block_index(heap);
        debug_assert_eq!(bi == 0, self.current == self.head, "cursor out of step");
        self.spec.item_offset(bi == 0, self.local_index(heap))
    }

    /// Step to the next item, crossing into the next block when the
    /// current one is spent
    pub fn advance(&mut self, heap: &Heap) {
        if self.at_block_end(heap) && !self.at_last_block(heap) {
            self.current = heap.tail_of(self.current).expect("broken chain");
        }
        self.index += 1;
    }

    /// Back to index zero
    pub fn rewind(&mut self, heap: &Heap) {
        let count = heap.item_count(self.head);
        self.index = 0;
        // a head whose header leaves no item room delegates to its
        // first tail
        if self.spec.block_count(count) > 1 && self.spec.capacity_through(0, count) == 0 {
            self.current = heap.tail_of(self.head).expect("broken chain");
        } else {
            self.current = self.head;
        }
    }

    /// Reposition on `index` (one past the last item is the append
    /// position), walking block by block from the start
    pub fn seek(&mut self, heap: &Heap, index: u32) -> Result<(), MemoryError> {
        let count = heap.item_count(self.head);
        if index > count {
            return Err(self.out_of_range(heap, index as i64, count));
        }
        self.rewind(heap);
        let blocks = self.spec.block_count(count);
        let mut bi = 0;
        while bi + 1 < blocks && index >= self.spec.capacity_through(bi as i64, count) {
            self.current = heap.tail_of(self.current).expect("broken chain");
            bi += 1;
        }
        self.index = index;
        Ok(())
    }

    /// Reposition past the last item
    pub fn seek_end(&mut self, heap: &Heap) {
        let count = heap.item_count(self.head);
        self.seek(heap, count).expect("end is always in range");
    }

    /// Jump to the first item of the next block
    pub fn next_block(&mut self, heap: &Heap) -> Result<(), MemoryError> {
        let count = heap.item_count(self.head);
        let boundary = self
            .spec
            .capacity_through(self.block_index(heap) as i64, count);
        if boundary >= count {
            return Err(self.out_of_range(heap, boundary as i64, count));
        }
        self.index = boundary;
        self.current = heap.tail_of(self.current).expect("broken chain");
        Ok(())
    }

    /// Borrow the stored bytes of the item under the cursor
    pub fn item<'heap>(&self, heap: &'heap Heap) -> Result<&'heap [u8], MemoryError> {
        let count = heap.item_count(self.head);
        if self.index >= count {
            return Err(self.out_of_range(heap, self.index as i64, count));
        }
        let offset = self.offset(heap);
        Ok(&heap.block(self.current)[offset..offset + self.spec.item_size])
    }

    /// Store raw item bytes under the cursor; writing at the item
    /// count appends and grows the chain as required
    pub(crate) fn set_raw(&mut self, heap: &mut Heap, bytes: &[u8]) -> Result<(), MemoryError> {
        debug_assert_eq!(bytes.len(), self.spec.item_size);
        if !self.can_append() {
            return Err(MemoryError::CollectionFull {
                limit: self.spec.max_items,
                value: heap.render(self.head),
            });
        }
        let count = heap.item_count(self.head);
        if self.index > count {
            return Err(self.out_of_range(heap, self.index as i64, count));
        }

        if self.index == count {
            // append: count rises first, growing the chain when the
            // closed form says so
            let blocks = self.spec.block_count(count);
            heap.set_item_count_raw(self.head, count + 1)?;
            if self.spec.block_count(count + 1) > blocks {
                let is_head = self.current == self.head;
                match heap.append_block(self.current, is_head, &self.spec, self.sig) {
                    Ok(tail) => self.current = tail,
                    Err(e) => {
                        heap.set_item_count_raw(self.head, count)?;
                        return Err(e);
                    }
                }
            }
        } else {
            // overwrite: release whatever the slot owns first
            let offset = self.offset(heap);
            let mut buf = [0u8; MAX_ITEM_SIZE];
            let old = &mut buf[..self.spec.item_size];
            old.copy_from_slice(&heap.block(self.current)[offset..offset + self.spec.item_size]);
            heap.release_item(self.sig, old);
        }

        let offset = self.offset(heap);
        heap.block_mut(self.current)[offset..offset + self.spec.item_size].copy_from_slice(bytes);
        Ok(())
    }

    // ------------------------------------------------------------
    // typed access
    // ------------------------------------------------------------

    pub fn read_byte(&self, heap: &Heap) -> Result<u8, MemoryError> {
        debug_assert_eq!(self.sig, Signature::String);
        Ok(self.item(heap)?[0])
    }

    pub fn set_byte(&mut self, heap: &mut Heap, byte: u8) -> Result<(), MemoryError> {
        debug_assert_eq!(self.sig, Signature::String);
        self.set_raw(heap, &[byte])
    }

    pub fn write_byte(&mut self, heap: &mut Heap, byte: u8) -> Result<(), MemoryError> {
        self.set_byte(heap, byte)?;
        self.advance(heap);
        Ok(())
    }

    pub(crate) fn peek_token_bits(&self, heap: &Heap) -> Result<usize, MemoryError> {
        Ok(load_bits(self.item(heap)?))
    }

    /// Clone out the token under the cursor (the caller owns the
    /// clone's reference)
    pub fn read_token(&self, heap: &mut Heap) -> Result<Token, MemoryError> {
        debug_assert!(matches!(self.sig, Signature::Tuple | Signature::Array));
        let bits = self.peek_token_bits(heap)?;
        heap.clone_token_bits(bits);
        Ok(Token::from_bits(bits))
    }

    /// Store a token under the cursor, transferring its reference into
    /// the collection
    pub fn set_token(&mut self, heap: &mut Heap, token: Token) -> Result<(), MemoryError> {
        debug_assert!(matches!(self.sig, Signature::Tuple | Signature::Array));
        let bits = token.into_bits();
        let mut slot = [0u8; MAX_ITEM_SIZE];
        store_bits(&mut slot[..self.spec.item_size], bits);
        match self.set_raw(heap, &slot[..self.spec.item_size]) {
            Ok(()) => Ok(()),
            Err(e) => {
                // the collection never took it; let it go
                heap.release_token_bits(bits);
                Err(e)
            }
        }
    }

    pub fn write_token(&mut self, heap: &mut Heap, token: Token) -> Result<(), MemoryError> {
        self.set_token(heap, token)?;
        self.advance(heap);
        Ok(())
    }

    /// Clone out the (token, weight) pair under the cursor
    pub fn read_place_item(&self, heap: &mut Heap) -> Result<(Token, u32), MemoryError> {
        debug_assert_eq!(self.sig, Signature::Place);
        let (bits, weight) = {
            let bytes = self.item(heap)?;
            (place::item_token_bits(bytes), place::item_weight(bytes))
        };
        heap.clone_token_bits(bits);
        Ok((Token::from_bits(bits), weight))
    }

    /// Store a (token, weight) pair, transferring the token in
    pub fn set_place_item(
        &mut self,
        heap: &mut Heap,
        token: Token,
        weight: u32,
    ) -> Result<(), MemoryError> {
        debug_assert_eq!(self.sig, Signature::Place);
        let bits = token.into_bits();
        let mut slot = [0u8; MAX_ITEM_SIZE];
        place::encode_item(&mut slot[..self.spec.item_size], bits, weight);
        match self.set_raw(heap, &slot[..self.spec.item_size]) {
            Ok(()) => Ok(()),
            Err(e) => {
                heap.release_token_bits(bits);
                Err(e)
            }
        }
    }

    pub fn write_place_item(
        &mut self,
        heap: &mut Heap,
        token: Token,
        weight: u32,
    ) -> Result<(), MemoryError> {
        self.set_place_item(heap, token, weight)?;
        self.advance(heap);
        Ok(())
    }

    /// The owned place address under a net instance cursor
    pub(crate) fn read_place_addr(&self, heap: &Heap) -> Result<Option<BlockAddr>, MemoryError> {
        debug_assert_eq!(self.sig, Signature::NetInstance);
        Ok(read_addr(self.item(heap)?))
    }

    /// Store an owned place address under a net instance cursor
    pub(crate) fn set_place_addr(
        &mut self,
        heap: &mut Heap,
        place: Option<BlockAddr>,
    ) -> Result<(), MemoryError> {
        debug_assert_eq!(self.sig, Signature::NetInstance);
        let mut slot = [0u8; MAX_ITEM_SIZE];
        write_addr(&mut slot[..self.spec.item_size], place);
        self.set_raw(heap, &slot[..self.spec.item_size])
    }

    fn out_of_range(&self, heap: &Heap, index: i64, limit: u32) -> MemoryError {
        MemoryError::OutOfRange {
            index,
            limit,
            value: heap.render(self.head),
        }
    }
}
