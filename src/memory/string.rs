//! Byte string values: indexable, collectable, one byte per item

use crate::error::MemoryError;

use super::block::BlockAddr;
use super::header::{HEADER_IC_MAX_ITEMS, HEADER_IC_SIZE};
use super::heap::Heap;
use super::layout::ChainSpec;
use super::signature::Signature;

pub(crate) const SPEC: ChainSpec = ChainSpec::for_layout(HEADER_IC_SIZE, 1, HEADER_IC_MAX_ITEMS);

/// Typed handle on a string value's head block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StringRef(pub(crate) BlockAddr);

impl StringRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// A fresh empty string
    pub fn string_new(&mut self) -> Result<StringRef, MemoryError> {
        Ok(StringRef(self.new_head(Signature::String)?))
    }

    /// Ingest host text (bytes of its UTF-8 form)
    pub fn string_from_str(&mut self, text: &str) -> Result<StringRef, MemoryError> {
        let value = self.string_new()?;
        let mut cursor = self.cursor(value.0);
        for &byte in text.as_bytes() {
            if let Err(e) = cursor.write_byte(self, byte) {
                self.value_delete(value.0);
                return Err(e);
            }
        }
        Ok(value)
    }

    pub fn string_len(&self, value: StringRef) -> u32 {
        self.item_count(value.0)
    }

    /// Append one byte, growing the chain when the last block is full
    pub fn string_push(&mut self, value: StringRef, byte: u8) -> Result<(), MemoryError> {
        let mut cursor = self.cursor(value.0);
        cursor.seek_end(self);
        cursor.write_byte(self, byte)
    }

    pub fn string_byte_at(&self, value: StringRef, index: u32) -> Result<u8, MemoryError> {
        let mut cursor = self.cursor(value.0);
        cursor.seek(self, index)?;
        cursor.read_byte(self)
    }

    /// Walk the chain back out into host text
    pub fn string_to_string(&self, value: StringRef) -> String {
        let count = self.item_count(value.0);
        let mut bytes = Vec::with_capacity(count as usize);
        let mut cursor = self.cursor(value.0);
        for _ in 0..count {
            bytes.push(cursor.read_byte(self).expect("read within item count"));
            cursor.advance(self);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Downcast a type-erased block known to hold a string
    pub fn as_string(&self, addr: BlockAddr) -> Option<StringRef> {
        (self.signature_of(addr) == Signature::String).then_some(StringRef(addr))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_round_trip() {
        let mut heap = Heap::new();
        let s = heap.string_from_str("conveyor").unwrap();
        assert_eq!(heap.string_len(s), 8);
        assert_eq!(heap.string_to_string(s), "conveyor");
        assert_eq!(heap.string_byte_at(s, 0).unwrap(), b'c');
        assert!(heap.string_byte_at(s, 8).is_err());
        heap.value_delete(s.addr());
    }

    #[test]
    pub fn test_push_grows_chain() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();
        let s = heap.string_new().unwrap();

        let total = SPEC.last + 5;
        for i in 0..total {
            heap.string_push(s, b'a' + (i % 26) as u8).unwrap();
        }
        assert_eq!(heap.string_len(s), total);
        assert_eq!(heap.block_count(s.addr()), 2);
        assert_eq!(heap.walked_block_count(s.addr()), 2);

        let text = heap.string_to_string(s);
        assert_eq!(text.len(), total as usize);
        assert!(text.starts_with("abcdef"));

        heap.value_delete(s.addr());
        assert_eq!(heap.free_bytes(), before);
    }

    #[test]
    pub fn test_downcast() {
        let mut heap = Heap::new();
        let s = heap.string_from_str("x").unwrap();
        let a = heap.array_new().unwrap();
        assert_eq!(heap.as_string(s.addr()), Some(s));
        assert_eq!(heap.as_string(a.addr()), None);
        heap.value_delete(s.addr());
        heap.value_delete(a.addr());
    }
}
