//! Tuples: token collections that are immutable once filled
//!
//! A tuple is built by appending and read thereafter; there is no
//! overwrite surface. On the 16-byte tier tuples share the array
//! signature (see [`TUPLE_SIGNATURE`]).

use crate::error::MemoryError;

use super::block::{BlockAddr, LINK_SIZE};
use super::header::{HEADER_IC_MAX_ITEMS, HEADER_IC_SIZE};
use super::heap::Heap;
use super::layout::ChainSpec;
use super::signature::TUPLE_SIGNATURE;
use super::token::Token;

pub(crate) const SPEC: ChainSpec =
    ChainSpec::for_layout(HEADER_IC_SIZE, LINK_SIZE, HEADER_IC_MAX_ITEMS);

/// Typed handle on a tuple value's head block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TupleRef(pub(crate) BlockAddr);

impl TupleRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// A fresh empty tuple
    pub fn tuple_new(&mut self) -> Result<TupleRef, MemoryError> {
        Ok(TupleRef(self.new_head(TUPLE_SIGNATURE)?))
    }

    pub fn tuple_len(&self, tuple: TupleRef) -> u32 {
        self.item_count(tuple.0)
    }

    /// Append a token, transferring its reference into the tuple
    pub fn tuple_push(&mut self, tuple: TupleRef, token: Token) -> Result<(), MemoryError> {
        let mut cursor = self.cursor(tuple.0);
        cursor.seek_end(self);
        cursor.write_token(self, token)
    }

    /// Clone out the token at `index`; the caller owns the clone
    pub fn tuple_get(&mut self, tuple: TupleRef, index: u32) -> Result<Token, MemoryError> {
        let mut cursor = self.cursor(tuple.0);
        cursor.seek(self, index)?;
        cursor.read_token(self)
    }

    /// Downcast a type-erased block known to hold a tuple
    pub fn as_tuple(&self, addr: BlockAddr) -> Option<TupleRef> {
        (self.signature_of(addr) == TUPLE_SIGNATURE).then_some(TupleRef(addr))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::memory::block::BLOCK_SIZE;

    #[test]
    pub fn test_push_and_get() {
        let mut heap = Heap::new();
        let t = heap.tuple_new().unwrap();

        heap.tuple_push(t, Token::integer(11)).unwrap();
        heap.tuple_push(t, Token::integer(-4)).unwrap();
        assert_eq!(heap.tuple_len(t), 2);

        let a = heap.tuple_get(t, 0).unwrap();
        let b = heap.tuple_get(t, 1).unwrap();
        assert_eq!(a.as_integer(), 11);
        assert_eq!(b.as_integer(), -4);
        assert!(heap.tuple_get(t, 2).is_err());

        heap.release_token(a);
        heap.release_token(b);
        heap.value_delete(t.addr());
    }

    #[test]
    pub fn test_stored_refs_are_counted() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();

        let t = heap.tuple_new().unwrap();
        let s = heap.string_from_str("pallet").unwrap();
        let token = heap.new_value_token(s.addr());
        assert_eq!(heap.ref_count(s.addr()), 1);

        heap.tuple_push(t, token).unwrap();
        assert_eq!(heap.ref_count(s.addr()), 1);

        // reading out clones and counts
        let out = heap.tuple_get(t, 0).unwrap();
        assert_eq!(heap.ref_count(s.addr()), 2);
        assert_eq!(out.address(), Some(s.addr()));
        heap.release_token(out);
        assert_eq!(heap.ref_count(s.addr()), 1);

        // deleting the tuple releases the string too
        heap.value_delete(t.addr());
        assert_eq!(heap.free_bytes(), before);
    }

    #[test]
    pub fn test_growth_across_blocks() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();
        let t = heap.tuple_new().unwrap();

        let total = SPEC.last + SPEC.tail_last + 1;
        for i in 0..total {
            heap.tuple_push(t, Token::integer(i as isize * 3)).unwrap();
        }
        assert_eq!(heap.tuple_len(t), total);
        assert_eq!(heap.walked_block_count(t.addr()), SPEC.block_count(total));
        assert_eq!(
            heap.free_bytes(),
            before - SPEC.block_count(total) as usize * BLOCK_SIZE
        );

        for i in 0..total {
            let token = heap.tuple_get(t, i).unwrap();
            assert_eq!(token.as_integer(), i as isize * 3, "item {i}");
            heap.release_token(token);
        }

        heap.value_delete(t.addr());
        assert_eq!(heap.free_bytes(), before);
    }
}
