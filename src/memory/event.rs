//! Events: calendar queue nodes
//!
//! An event schedules a weighted token arrival at a place of a net
//! instance at a simulation time. Events are neither indexable nor
//! collectable; the calendar links (prev/next) and the instance field
//! are unowned, the token is owned and released with the event.

use crate::error::MemoryError;

use super::block::{read_addr, write_addr, BlockAddr, BLOCK_SIZE, LINK_SIZE};
use super::heap::Heap;
use super::net::NetInstanceRef;
use super::signature::Signature;
use super::token::{load_bits, store_bits, Token};

#[cfg(target_pointer_width = "16")]
mod codec {
    //! 16-byte tier: signature and place id share a packed word and
    //! the node fills the block exactly

    use super::LINK_SIZE;

    pub const TIME: usize = 2;
    pub const NUMBER: usize = 6;
    pub const TOKEN: usize = 8;
    pub const INSTANCE: usize = TOKEN + LINK_SIZE;
    pub const PREV: usize = INSTANCE + LINK_SIZE;
    pub const NEXT: usize = PREV + LINK_SIZE;
    pub const HEADER_SIZE: usize = NEXT + LINK_SIZE;

    pub fn init(block: &mut [u8], tag: u8) {
        block[0] = tag & 0x0f;
        block[1] = 0;
    }

    pub fn place_id(block: &[u8]) -> u32 {
        (u16::from_le_bytes([block[0], block[1]]) >> 4) as u32
    }

    pub fn set_place_id(block: &mut [u8], id: u32) {
        let word = (u16::from_le_bytes([block[0], block[1]]) & 0x000f) | ((id as u16) << 4);
        block[..2].copy_from_slice(&word.to_le_bytes());
    }

    pub fn time(block: &[u8]) -> u32 {
        u32::from_le_bytes(block[TIME..TIME + 4].try_into().unwrap())
    }

    pub fn set_time(block: &mut [u8], time: u32) {
        block[TIME..TIME + 4].copy_from_slice(&time.to_le_bytes());
    }

    pub fn number(block: &[u8]) -> u32 {
        u16::from_le_bytes(block[NUMBER..NUMBER + 2].try_into().unwrap()) as u32
    }

    pub fn set_number(block: &mut [u8], number: u32) {
        block[NUMBER..NUMBER + 2].copy_from_slice(&(number as u16).to_le_bytes());
    }
}

#[cfg(not(target_pointer_width = "16"))]
mod codec {
    //! Wide tiers: 32-bit fields then link-sized token and link fields

    use super::LINK_SIZE;

    pub const PLACE_ID: usize = 4;
    pub const TIME: usize = 8;
    pub const NUMBER: usize = 12;
    pub const TOKEN: usize = 16;
    pub const INSTANCE: usize = TOKEN + LINK_SIZE;
    pub const PREV: usize = INSTANCE + LINK_SIZE;
    pub const NEXT: usize = PREV + LINK_SIZE;
    pub const HEADER_SIZE: usize = NEXT + LINK_SIZE;

    pub fn init(block: &mut [u8], tag: u8) {
        block[..4].copy_from_slice(&(tag as u32).to_le_bytes());
    }

    pub fn place_id(block: &[u8]) -> u32 {
        u32::from_le_bytes(block[PLACE_ID..PLACE_ID + 4].try_into().unwrap())
    }

    pub fn set_place_id(block: &mut [u8], id: u32) {
        block[PLACE_ID..PLACE_ID + 4].copy_from_slice(&id.to_le_bytes());
    }

    pub fn time(block: &[u8]) -> u32 {
        u32::from_le_bytes(block[TIME..TIME + 4].try_into().unwrap())
    }

    pub fn set_time(block: &mut [u8], time: u32) {
        block[TIME..TIME + 4].copy_from_slice(&time.to_le_bytes());
    }

    pub fn number(block: &[u8]) -> u32 {
        u32::from_le_bytes(block[NUMBER..NUMBER + 4].try_into().unwrap())
    }

    pub fn set_number(block: &mut [u8], number: u32) {
        block[NUMBER..NUMBER + 4].copy_from_slice(&number.to_le_bytes());
    }
}

pub(crate) const EVENT_HEADER_SIZE: usize = codec::HEADER_SIZE;

const _: () = assert!(EVENT_HEADER_SIZE <= BLOCK_SIZE, "event node must fit one block");

/// Token bits stored in an event node
pub(crate) fn stored_token_bits(block: &[u8]) -> usize {
    load_bits(&block[codec::TOKEN..codec::TOKEN + LINK_SIZE])
}

/// Typed handle on an event block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EventRef(pub(crate) BlockAddr);

impl EventRef {
    pub fn addr(self) -> BlockAddr {
        self.0
    }
}

impl Heap {
    /// Schedule `number` arrivals of `token` at place `place_id` of
    /// `instance` at `time`; the token's reference moves into the
    /// event
    pub fn event_new(
        &mut self,
        token: Token,
        number: u32,
        place_id: u32,
        instance: NetInstanceRef,
        time: u32,
    ) -> Result<EventRef, MemoryError> {
        let addr = match self.alloc_block() {
            Ok(addr) => addr,
            Err(e) => {
                self.release_token(token);
                return Err(e);
            }
        };
        let block = self.block_mut(addr);
        codec::init(block, Signature::Event.tag());
        codec::set_place_id(block, place_id);
        codec::set_time(block, time);
        codec::set_number(block, number);
        store_bits(
            &mut block[codec::TOKEN..codec::TOKEN + LINK_SIZE],
            token.into_bits(),
        );
        write_addr(
            &mut block[codec::INSTANCE..codec::INSTANCE + LINK_SIZE],
            Some(instance.addr()),
        );
        Ok(EventRef(addr))
    }

    pub fn event_time(&self, event: EventRef) -> u32 {
        codec::time(self.block(event.0))
    }

    pub fn event_set_time(&mut self, event: EventRef, time: u32) {
        codec::set_time(self.block_mut(event.0), time);
    }

    pub fn event_place_id(&self, event: EventRef) -> u32 {
        codec::place_id(self.block(event.0))
    }

    pub fn event_set_place_id(&mut self, event: EventRef, id: u32) {
        codec::set_place_id(self.block_mut(event.0), id);
    }

    pub fn event_number(&self, event: EventRef) -> u32 {
        codec::number(self.block(event.0))
    }

    pub fn event_set_number(&mut self, event: EventRef, number: u32) {
        codec::set_number(self.block_mut(event.0), number);
    }

    /// Clone out the scheduled token
    pub fn event_token(&mut self, event: EventRef) -> Token {
        let bits = stored_token_bits(self.block(event.0));
        self.clone_token_bits(bits);
        Token::from_bits(bits)
    }

    /// Replace the scheduled token, releasing the old one
    pub fn event_set_token(&mut self, event: EventRef, token: Token) {
        let old = stored_token_bits(self.block(event.0));
        let bits = token.into_bits();
        store_bits(
            &mut self.block_mut(event.0)[codec::TOKEN..codec::TOKEN + LINK_SIZE],
            bits,
        );
        self.release_token_bits(old);
    }

    /// The instance the event belongs to (an unowned back-reference)
    pub fn event_instance(&self, event: EventRef) -> Option<NetInstanceRef> {
        self.event_link(event, codec::INSTANCE).map(NetInstanceRef)
    }

    pub fn event_set_instance(&mut self, event: EventRef, instance: Option<NetInstanceRef>) {
        self.event_set_link(event, codec::INSTANCE, instance.map(NetInstanceRef::addr));
    }

    pub fn event_prev(&self, event: EventRef) -> Option<EventRef> {
        self.event_link(event, codec::PREV).map(EventRef)
    }

    pub fn event_set_prev(&mut self, event: EventRef, prev: Option<EventRef>) {
        self.event_set_link(event, codec::PREV, prev.map(EventRef::addr));
    }

    pub fn event_next(&self, event: EventRef) -> Option<EventRef> {
        self.event_link(event, codec::NEXT).map(EventRef)
    }

    pub fn event_set_next(&mut self, event: EventRef, next: Option<EventRef>) {
        self.event_set_link(event, codec::NEXT, next.map(EventRef::addr));
    }

    /// Downcast a type-erased block known to hold an event
    pub fn as_event(&self, addr: BlockAddr) -> Option<EventRef> {
        (self.signature_of(addr) == Signature::Event).then_some(EventRef(addr))
    }

    fn event_link(&self, event: EventRef, offset: usize) -> Option<BlockAddr> {
        read_addr(&self.block(event.0)[offset..offset + LINK_SIZE])
    }

    fn event_set_link(&mut self, event: EventRef, offset: usize, addr: Option<BlockAddr>) {
        write_addr(&mut self.block_mut(event.0)[offset..offset + LINK_SIZE], addr);
    }

    pub(crate) fn render_event(&self, addr: BlockAddr) -> String {
        let event = EventRef(addr);
        let token = self.render_token_bits(stored_token_bits(self.block(addr)));
        format!(
            "Event({}, time={}, place={}, n={}, token={}, inst={})",
            addr,
            self.event_time(event),
            self.event_place_id(event),
            self.event_number(event),
            token,
            self.event_instance(event)
                .map(|i| i.addr().to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}
