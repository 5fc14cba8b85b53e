//! Templates: the compiled form of a net
//!
//! A template is neither indexable nor collectable; one block holds
//! the whole record: name, place-name tuple, symbol tuple, the live
//! instance registry, and the code window (offset, length, transition
//! start) into the shared code buffer. Template fields are unowned
//! addresses — everything a template points at shares its lifetime.

use crate::error::MemoryError;

use super::array::ArrayRef;
use super::block::{read_addr, write_addr, BlockAddr, BLOCK_SIZE, LINK_SIZE};
use super::heap::Heap;
use super::signature::Signature;
use super::string::StringRef;
use super::tuple::TupleRef;

#[cfg(target_pointer_width = "16")]
mod codec {
    //! 16-byte tier: signature and place count share a packed word,
    //! code fields are 16-bit, and the record fills the block exactly

    use super::super::block::LINK_SIZE;

    pub const CODE_OFFSET: usize = 2;
    pub const CODE_LENGTH: usize = 4;
    pub const TRANSITIONS: usize = 6;
    pub const NAME: usize = 8;
    pub const PLACES: usize = NAME + LINK_SIZE;
    pub const SYMBOLS: usize = PLACES + LINK_SIZE;
    pub const INSTANCES: usize = SYMBOLS + LINK_SIZE;
    pub const HEADER_SIZE: usize = INSTANCES + LINK_SIZE;
    pub const MAX_PLACE_COUNT: u32 = (1 << 12) - 1;

    pub fn init(block: &mut [u8], tag: u8) {
        block[0] = tag & 0x0f;
        block[1] = 0;
    }

    pub fn place_count(block: &[u8]) -> u32 {
        (u16::from_le_bytes([block[0], block[1]]) >> 4) as u32
    }

    pub fn set_place_count(block: &mut [u8], count: u32) {
        debug_assert!(count <= MAX_PLACE_COUNT);
        let word = (u16::from_le_bytes([block[0], block[1]]) & 0x000f) | ((count as u16) << 4);
        block[..2].copy_from_slice(&word.to_le_bytes());
    }

    pub fn signed(block: &[u8], offset: usize) -> i32 {
        i16::from_le_bytes(block[offset..offset + 2].try_into().unwrap()) as i32
    }

    pub fn set_signed(block: &mut [u8], offset: usize, value: i32) {
        block[offset..offset + 2].copy_from_slice(&(value as i16).to_le_bytes());
    }

    pub fn unsigned(block: &[u8], offset: usize) -> u32 {
        u16::from_le_bytes(block[offset..offset + 2].try_into().unwrap()) as u32
    }

    pub fn set_unsigned(block: &mut [u8], offset: usize, value: u32) {
        block[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes());
    }
}

#[cfg(not(target_pointer_width = "16"))]
mod codec {
    //! Wide tiers: 32-bit fields, address fields aligned to link size

    use super::super::block::LINK_SIZE;

    const fn align_up(n: usize, a: usize) -> usize {
        (n + a - 1) / a * a
    }

    pub const CODE_OFFSET: usize = 8;
    pub const CODE_LENGTH: usize = 12;
    pub const TRANSITIONS: usize = 16;
    pub const NAME: usize = align_up(20, LINK_SIZE);
    pub const PLACES: usize = NAME + LINK_SIZE;
    pub const SYMBOLS: usize = PLACES + LINK_SIZE;
    pub const INSTANCES: usize = SYMBOLS + LINK_SIZE;
    pub const HEADER_SIZE: usize = INSTANCES + LINK_SIZE;
    pub const MAX_PLACE_COUNT: u32 = u32::MAX;

    pub fn init(block: &mut [u8], tag: u8) {
        block[..4].copy_from_slice(&(tag as u32).to_le_bytes());
    }

    pub fn place_count(block: &[u8]) -> u32 {
        unsigned(block, 4)
    }

    pub fn set_place_count(block: &mut [u8], count: u32) {
        set_unsigned(block, 4, count);
    }

    pub fn signed(block: &[u8], offset: usize) -> i32 {
        i32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_signed(block: &mut [u8], offset: usize, value: i32) {
        block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn unsigned(block: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_unsigned(block: &mut [u8], offset: usize, value: u32) {
        block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

pub(crate) const TEMPLATE_HEADER_SIZE: usize = codec::HEADER_SIZE;

/// Largest place count a template header can carry
pub const MAX_PLACE_COUNT: u32 = codec::MAX_PLACE_COUNT;

// the whole record must fit the uniform block (rules out 32-bit
// pointer targets, whose record would spill)
const _: () = assert!(TEMPLATE_HEADER_SIZE <= BLOCK_SIZE, "template record must fit one block");

/// Typed handle on a template block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TemplateRef(pub(crate) BlockAddr);

impl TemplateRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// A fresh zeroed template
    pub fn template_new(&mut self) -> Result<TemplateRef, MemoryError> {
        let addr = self.alloc_block()?;
        codec::init(self.block_mut(addr), Signature::Template.tag());
        Ok(TemplateRef(addr))
    }

    pub fn template_place_count(&self, tmpl: TemplateRef) -> u32 {
        codec::place_count(self.block(tmpl.0))
    }

    pub fn template_set_place_count(&mut self, tmpl: TemplateRef, count: u32) {
        codec::set_place_count(self.block_mut(tmpl.0), count);
    }

    pub fn template_code_offset(&self, tmpl: TemplateRef) -> i32 {
        codec::signed(self.block(tmpl.0), codec::CODE_OFFSET)
    }

    pub fn template_set_code_offset(&mut self, tmpl: TemplateRef, offset: i32) {
        codec::set_signed(self.block_mut(tmpl.0), codec::CODE_OFFSET, offset);
    }

    pub fn template_code_length(&self, tmpl: TemplateRef) -> u32 {
        codec::unsigned(self.block(tmpl.0), codec::CODE_LENGTH)
    }

    pub fn template_set_code_length(&mut self, tmpl: TemplateRef, length: u32) {
        codec::set_unsigned(self.block_mut(tmpl.0), codec::CODE_LENGTH, length);
    }

    pub fn template_transitions(&self, tmpl: TemplateRef) -> i32 {
        codec::signed(self.block(tmpl.0), codec::TRANSITIONS)
    }

    pub fn template_set_transitions(&mut self, tmpl: TemplateRef, offset: i32) {
        codec::set_signed(self.block_mut(tmpl.0), codec::TRANSITIONS, offset);
    }

    pub fn template_name(&self, tmpl: TemplateRef) -> Option<StringRef> {
        read_addr(self.field(tmpl, codec::NAME)).map(StringRef)
    }

    pub fn template_set_name(&mut self, tmpl: TemplateRef, name: Option<StringRef>) {
        write_addr(self.field_mut(tmpl, codec::NAME), name.map(StringRef::addr));
    }

    pub fn template_places(&self, tmpl: TemplateRef) -> Option<TupleRef> {
        read_addr(self.field(tmpl, codec::PLACES)).map(TupleRef)
    }

    pub fn template_set_places(&mut self, tmpl: TemplateRef, places: Option<TupleRef>) {
        write_addr(self.field_mut(tmpl, codec::PLACES), places.map(TupleRef::addr));
    }

    pub fn template_symbols(&self, tmpl: TemplateRef) -> Option<TupleRef> {
        read_addr(self.field(tmpl, codec::SYMBOLS)).map(TupleRef)
    }

    pub fn template_set_symbols(&mut self, tmpl: TemplateRef, symbols: Option<TupleRef>) {
        write_addr(self.field_mut(tmpl, codec::SYMBOLS), symbols.map(TupleRef::addr));
    }

    pub fn template_instances(&self, tmpl: TemplateRef) -> Option<ArrayRef> {
        read_addr(self.field(tmpl, codec::INSTANCES)).map(ArrayRef)
    }

    pub fn template_set_instances(&mut self, tmpl: TemplateRef, instances: Option<ArrayRef>) {
        write_addr(
            self.field_mut(tmpl, codec::INSTANCES),
            instances.map(ArrayRef::addr),
        );
    }

    /// Downcast a type-erased block known to hold a template
    pub fn as_template(&self, addr: BlockAddr) -> Option<TemplateRef> {
        (self.signature_of(addr) == Signature::Template).then_some(TemplateRef(addr))
    }

    fn field(&self, tmpl: TemplateRef, offset: usize) -> &[u8] {
        &self.block(tmpl.0)[offset..offset + LINK_SIZE]
    }

    fn field_mut(&mut self, tmpl: TemplateRef, offset: usize) -> &mut [u8] {
        &mut self.block_mut(tmpl.0)[offset..offset + LINK_SIZE]
    }

    pub(crate) fn render_template(&self, addr: BlockAddr) -> String {
        let tmpl = TemplateRef(addr);
        let name = self
            .template_name(tmpl)
            .map(|s| self.string_to_string(s))
            .unwrap_or_default();
        let len = |addr: Option<BlockAddr>| addr.map(|a| self.item_count(a)).unwrap_or(0);
        format!(
            "Template({}, name={:?}, pc={}, co={}, cl={}, tr={}, places={}, symbols={}, instances={})",
            addr,
            name,
            self.template_place_count(tmpl),
            self.template_code_offset(tmpl),
            self.template_code_length(tmpl),
            self.template_transitions(tmpl),
            len(self.template_places(tmpl).map(TupleRef::addr)),
            len(self.template_symbols(tmpl).map(TupleRef::addr)),
            len(self.template_instances(tmpl).map(ArrayRef::addr)),
        )
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_code_window_round_trip() {
        let mut heap = Heap::new();
        let tmpl = heap.template_new().unwrap();

        assert_eq!(heap.signature_of(tmpl.addr()), Signature::Template);
        assert_eq!(heap.template_place_count(tmpl), 0);
        assert_eq!(heap.template_name(tmpl), None);

        heap.template_set_place_count(tmpl, 5);
        heap.template_set_code_offset(tmpl, -12);
        heap.template_set_code_length(tmpl, 933);
        heap.template_set_transitions(tmpl, 153);

        assert_eq!(heap.template_place_count(tmpl), 5);
        assert_eq!(heap.template_code_offset(tmpl), -12);
        assert_eq!(heap.template_code_length(tmpl), 933);
        assert_eq!(heap.template_transitions(tmpl), 153);

        heap.value_delete(tmpl.addr());
    }

    #[test]
    pub fn test_field_addresses_round_trip() {
        let mut heap = Heap::new();
        let tmpl = heap.template_new().unwrap();
        let name = heap.string_from_str("platform").unwrap();
        let places = heap.tuple_new().unwrap();
        let symbols = heap.tuple_new().unwrap();
        let instances = heap.array_new().unwrap();

        heap.template_set_name(tmpl, Some(name));
        heap.template_set_places(tmpl, Some(places));
        heap.template_set_symbols(tmpl, Some(symbols));
        heap.template_set_instances(tmpl, Some(instances));

        assert_eq!(heap.template_name(tmpl), Some(name));
        assert_eq!(heap.template_places(tmpl), Some(places));
        assert_eq!(heap.template_symbols(tmpl), Some(symbols));
        assert_eq!(heap.template_instances(tmpl), Some(instances));

        let rendered = heap.render(tmpl.addr());
        assert!(rendered.contains("platform"));
        assert!(rendered.contains("cl=0"));

        // template deletion frees only its own record
        let before = heap.free_bytes();
        heap.value_delete(tmpl.addr());
        assert_eq!(
            heap.free_bytes(),
            before + crate::memory::block::BLOCK_SIZE
        );
    }
}
