//! Net instances: a running net's marking
//!
//! An instance owns one place per slot and carries a back-reference to
//! the template it was built from. Instances are collectable; while a
//! template has a live-instance registry attached, instances enrol on
//! creation and strike themselves off inside deletion, so the registry
//! never holds a dead instance. Registry entries are unowned
//! back-pointers — they take no part in the reference count.

use crate::error::MemoryError;

use super::block::{read_addr, write_addr, BlockAddr, LINK_SIZE};
use super::header::HEADER_IC_MAX_ITEMS;
use super::heap::{Heap, MAX_ITEM_SIZE};
use super::layout::ChainSpec;
use super::place::PlaceRef;
use super::signature::Signature;
use super::template::TemplateRef;
use super::token::{load_bits, store_bits, Token};
use super::{array, header};

#[cfg(target_pointer_width = "16")]
mod shape {
    use super::header::HEADER_IC_SIZE;
    use super::LINK_SIZE;

    pub const TMPL_OFFSET: usize = HEADER_IC_SIZE;
    pub const NET_HEADER_SIZE: usize = HEADER_IC_SIZE + LINK_SIZE;
}

#[cfg(not(target_pointer_width = "16"))]
mod shape {
    use super::header::HEADER_IC_SIZE;
    use super::LINK_SIZE;

    const fn align_up(n: usize, a: usize) -> usize {
        (n + a - 1) / a * a
    }

    pub const TMPL_OFFSET: usize = align_up(HEADER_IC_SIZE, LINK_SIZE);
    pub const NET_HEADER_SIZE: usize = TMPL_OFFSET + LINK_SIZE;
}

pub(crate) const SPEC: ChainSpec =
    ChainSpec::for_layout(shape::NET_HEADER_SIZE, LINK_SIZE, HEADER_IC_MAX_ITEMS);

/// Typed handle on a net instance's head block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NetInstanceRef(pub(crate) BlockAddr);

impl NetInstanceRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// A fresh instance of `tmpl` with no places yet
    pub fn net_instance_new(&mut self, tmpl: TemplateRef) -> Result<NetInstanceRef, MemoryError> {
        let addr = self.new_head(Signature::NetInstance)?;
        let field = &mut self.block_mut(addr)[shape::TMPL_OFFSET..shape::TMPL_OFFSET + LINK_SIZE];
        write_addr(field, Some(tmpl.addr()));
        let inst = NetInstanceRef(addr);
        if let Err(e) = self.net_register(inst, tmpl) {
            self.value_delete(addr);
            return Err(e);
        }
        Ok(inst)
    }

    /// Instantiate `tmpl` with `place_count` freshly allocated empty
    /// places
    pub fn net_instance_new_with_places(
        &mut self,
        tmpl: TemplateRef,
        place_count: u32,
    ) -> Result<NetInstanceRef, MemoryError> {
        let inst = self.net_instance_new(tmpl)?;
        for _ in 0..place_count {
            let place = match self.place_new() {
                Ok(place) => place,
                Err(e) => {
                    self.value_delete(inst.0);
                    return Err(e);
                }
            };
            let mut cursor = self.cursor(inst.0);
            cursor.seek_end(self);
            if let Err(e) = cursor.set_place_addr(self, Some(place.addr())) {
                self.value_delete(place.addr());
                self.value_delete(inst.0);
                return Err(e);
            }
        }
        Ok(inst)
    }

    /// The template this instance runs
    pub fn net_template(&self, inst: NetInstanceRef) -> Option<TemplateRef> {
        let field = &self.block(inst.0)[shape::TMPL_OFFSET..shape::TMPL_OFFSET + LINK_SIZE];
        read_addr(field).map(TemplateRef)
    }

    pub fn net_place_count(&self, inst: NetInstanceRef) -> u32 {
        self.item_count(inst.0)
    }

    /// The owned place in slot `index`
    pub fn net_place_at(
        &self,
        inst: NetInstanceRef,
        index: u32,
    ) -> Result<Option<PlaceRef>, MemoryError> {
        let mut cursor = self.cursor(inst.0);
        cursor.seek(self, index)?;
        Ok(cursor.read_place_addr(self)?.map(PlaceRef))
    }

    /// Put a place into slot `index` (or append at the count),
    /// destroying whatever place the slot owned
    pub fn net_set_place_at(
        &mut self,
        inst: NetInstanceRef,
        index: u32,
        place: PlaceRef,
    ) -> Result<(), MemoryError> {
        let mut cursor = self.cursor(inst.0);
        cursor.seek(self, index)?;
        cursor.set_place_addr(self, Some(place.addr()))
    }

    /// Downcast a type-erased block known to hold a net instance
    pub fn as_net_instance(&self, addr: BlockAddr) -> Option<NetInstanceRef> {
        (self.signature_of(addr) == Signature::NetInstance).then_some(NetInstanceRef(addr))
    }

    /// Enrol a fresh instance in its template's registry (when one is
    /// attached); entries are raw, unowned bits
    fn net_register(
        &mut self,
        inst: NetInstanceRef,
        tmpl: TemplateRef,
    ) -> Result<(), MemoryError> {
        let Some(registry) = self.template_instances(tmpl) else {
            return Ok(());
        };
        let mut cursor = self.cursor(registry.addr());
        cursor.seek_end(self);
        let mut slot = [0u8; MAX_ITEM_SIZE];
        store_bits(&mut slot[..LINK_SIZE], Token::net_ref_bits(inst.addr()));
        cursor.set_raw(self, &slot[..LINK_SIZE])
    }

    /// Strike a dying instance off its template's registry
    pub(crate) fn net_unregister(&mut self, inst_addr: BlockAddr) {
        let Some(tmpl) = self.net_template(NetInstanceRef(inst_addr)) else {
            return;
        };
        let Some(registry) = self.template_instances(tmpl) else {
            return;
        };
        let registry = registry.addr();
        let count = self.item_count(registry);
        let found = (0..count).find(|&i| {
            let bits = load_bits(self.item_bytes(registry, &array::SPEC, i, count));
            Token::from_bits(bits).address() == Some(inst_addr)
        });
        let Some(position) = found else { return };

        // the final entry moves into the hole (raw bit moves: registry
        // entries are unowned), then the invalidated end slot is
        // trimmed off
        let last_bits = load_bits(self.item_bytes(registry, &array::SPEC, count - 1, count));
        let (block, offset) = self.item_location(registry, &array::SPEC, position, count);
        store_bits(
            &mut self.block_mut(block)[offset..offset + LINK_SIZE],
            last_bits,
        );
        let (block, offset) = self.item_location(registry, &array::SPEC, count - 1, count);
        store_bits(
            &mut self.block_mut(block)[offset..offset + LINK_SIZE],
            Token::invalid_bits(),
        );
        self.set_item_count(registry, count - 1)
            .expect("registry shrink cannot overflow");
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_instantiation_with_places() {
        let mut heap = Heap::new();
        let before = heap.free_bytes();

        let tmpl = heap.template_new().unwrap();
        heap.template_set_place_count(tmpl, 3);

        let inst = heap
            .net_instance_new_with_places(tmpl, heap.template_place_count(tmpl))
            .unwrap();
        assert_eq!(heap.net_place_count(inst), 3);
        assert_eq!(heap.net_template(inst), Some(tmpl));
        assert_eq!(heap.block_count(inst.addr()), 1);

        // each slot owns a distinct empty place
        let a = heap.net_place_at(inst, 0).unwrap().unwrap();
        let c = heap.net_place_at(inst, 2).unwrap().unwrap();
        assert_ne!(a, c);
        assert_eq!(heap.place_len(a), 0);

        // deleting the only reference destroys instance and places
        heap.reference(inst.addr());
        assert_eq!(heap.unreference(inst.addr()), None);
        heap.value_delete(tmpl.addr());
        assert_eq!(heap.free_bytes(), before);
    }

    #[test]
    pub fn test_marking_survives_in_places() {
        let mut heap = Heap::new();
        let tmpl = heap.template_new().unwrap();
        let inst = heap.net_instance_new_with_places(tmpl, 2).unwrap();

        let place = heap.net_place_at(inst, 1).unwrap().unwrap();
        heap.place_push(place, Token::integer(99), 4).unwrap();

        let again = heap.net_place_at(inst, 1).unwrap().unwrap();
        let (token, weight) = heap.place_item(again, 0).unwrap();
        assert_eq!(token.as_integer(), 99);
        assert_eq!(weight, 4);
        heap.release_token(token);

        heap.value_delete(inst.addr());
        heap.value_delete(tmpl.addr());
    }

    #[test]
    pub fn test_registry_tracks_live_instances() {
        let mut heap = Heap::new();
        let tmpl = heap.template_new().unwrap();
        let registry = heap.array_new().unwrap();
        heap.template_set_instances(tmpl, Some(registry));

        let first = heap.net_instance_new(tmpl).unwrap();
        let second = heap.net_instance_new(tmpl).unwrap();
        let third = heap.net_instance_new(tmpl).unwrap();
        assert_eq!(heap.array_len(registry), 3);

        // registry entries are unowned: counts stay put
        assert_eq!(heap.ref_count(first.addr()), 0);

        // deleting from the middle swaps the tail entry down
        heap.value_delete(second.addr());
        assert_eq!(heap.array_len(registry), 2);
        let survivor = heap.array_get(registry, 1).unwrap();
        assert_eq!(survivor.address(), Some(third.addr()));

        // the clone was third's only counted reference; releasing it
        // destroys the instance, which strikes itself off on the way
        heap.release_token(survivor);
        assert_eq!(heap.array_len(registry), 1);

        heap.value_delete(first.addr());
        assert_eq!(heap.array_len(registry), 0);
    }
}
