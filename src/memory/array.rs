//! Arrays: mutable token collections

use crate::error::MemoryError;

use super::block::{BlockAddr, LINK_SIZE};
use super::header::{HEADER_IC_MAX_ITEMS, HEADER_IC_SIZE};
use super::heap::Heap;
use super::layout::ChainSpec;
use super::signature::Signature;
use super::token::Token;

pub(crate) const SPEC: ChainSpec =
    ChainSpec::for_layout(HEADER_IC_SIZE, LINK_SIZE, HEADER_IC_MAX_ITEMS);

/// Typed handle on an array value's head block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArrayRef(pub(crate) BlockAddr);

impl ArrayRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// A fresh empty array
    pub fn array_new(&mut self) -> Result<ArrayRef, MemoryError> {
        Ok(ArrayRef(self.new_head(Signature::Array)?))
    }

    pub fn array_len(&self, array: ArrayRef) -> u32 {
        self.item_count(array.0)
    }

    /// Append a token, transferring its reference into the array
    pub fn array_push(&mut self, array: ArrayRef, token: Token) -> Result<(), MemoryError> {
        let mut cursor = self.cursor(array.0);
        cursor.seek_end(self);
        cursor.write_token(self, token)
    }

    /// Clone out the token at `index`; the caller owns the clone
    pub fn array_get(&mut self, array: ArrayRef, index: u32) -> Result<Token, MemoryError> {
        let mut cursor = self.cursor(array.0);
        cursor.seek(self, index)?;
        cursor.read_token(self)
    }

    /// Store a token at `index` (or append at the length), releasing
    /// whatever the slot held
    pub fn array_set(
        &mut self,
        array: ArrayRef,
        index: u32,
        token: Token,
    ) -> Result<(), MemoryError> {
        let mut cursor = self.cursor(array.0);
        if let Err(e) = cursor.seek(self, index) {
            self.release_token(token);
            return Err(e);
        }
        cursor.set_token(self, token)
    }

    /// Downcast a type-erased block known to hold an array
    pub fn as_array(&self, addr: BlockAddr) -> Option<ArrayRef> {
        (self.signature_of(addr) == Signature::Array).then_some(ArrayRef(addr))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_set_releases_previous_item() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();

        let array = heap.array_new().unwrap();
        let s = heap.string_from_str("displaced").unwrap();
        let token = heap.new_value_token(s.addr());
        heap.array_push(array, token).unwrap();

        // overwriting the only reference destroys the string
        heap.array_set(array, 0, Token::integer(1)).unwrap();
        let got = heap.array_get(array, 0).unwrap();
        assert_eq!(got.as_integer(), 1);
        heap.release_token(got);

        heap.value_delete(array.addr());
        assert_eq!(heap.free_bytes(), before);
    }

    #[test]
    pub fn test_set_out_of_range_releases_token() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();

        let array = heap.array_new().unwrap();
        let s = heap.string_from_str("stray").unwrap();
        let token = heap.new_value_token(s.addr());

        // index 3 of an empty array is unreachable; the token's
        // reference must not leak
        assert!(heap.array_set(array, 3, token).is_err());
        heap.value_delete(array.addr());
        assert_eq!(heap.free_bytes(), before);
    }

    #[test]
    pub fn test_set_at_length_appends() {
        let mut heap = Heap::new();
        let array = heap.array_new().unwrap();
        heap.array_set(array, 0, Token::integer(5)).unwrap();
        heap.array_set(array, 1, Token::integer(6)).unwrap();
        assert_eq!(heap.array_len(array), 2);
        heap.value_delete(array.addr());
    }
}
