//! Runtime value classification
//!
//! The signature in a head block's leading header bits identifies the
//! value kind; generic code dispatches on it with exhaustive matches.
//! Indexability and collectability are fixed per kind at compile time.

use super::layout::ChainSpec;
use super::{array, net, place, string, tuple};
use crate::memory::block::BLOCK_SIZE;

/// Kind tag carried in every head block's header
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Signature {
    /// Byte string
    String = 0,
    /// Immutable token collection
    Tuple = 1,
    /// Mutable token collection
    Array = 2,
    /// Weighted token multiset
    Place = 3,
    /// Running net built from a template
    NetInstance = 4,
    /// Compiled net template
    Template = 5,
    /// Calendar queue node
    Event = 6,
}

/// Signature stamped on tuples: the 16-byte tier has no room for a
/// distinct immutable kind and folds tuples into arrays
pub const TUPLE_SIGNATURE: Signature = if BLOCK_SIZE == 16 {
    Signature::Array
} else {
    Signature::Tuple
};

impl Signature {
    /// Recover a signature from stored header bits
    pub fn from_tag(tag: u8) -> Option<Signature> {
        match tag {
            0 => Some(Signature::String),
            1 => Some(Signature::Tuple),
            2 => Some(Signature::Array),
            3 => Some(Signature::Place),
            4 => Some(Signature::NetInstance),
            5 => Some(Signature::Template),
            6 => Some(Signature::Event),
            _ => None,
        }
    }

    /// The stored header bits
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Signature::String => "String",
            Signature::Tuple => "Tuple",
            Signature::Array => "Array",
            Signature::Place => "Place",
            Signature::NetInstance => "NetInst",
            Signature::Template => "Template",
            Signature::Event => "Event",
        }
    }

    /// Whether the kind stores items across a block chain
    pub const fn is_indexable(self) -> bool {
        match self {
            Signature::String
            | Signature::Tuple
            | Signature::Array
            | Signature::Place
            | Signature::NetInstance => true,
            Signature::Template | Signature::Event => false,
        }
    }

    /// Whether the kind carries a reference count
    pub const fn is_collectable(self) -> bool {
        match self {
            Signature::String
            | Signature::Tuple
            | Signature::Array
            | Signature::NetInstance => true,
            Signature::Place | Signature::Template | Signature::Event => false,
        }
    }

    /// Capacity model for indexable kinds
    pub fn chain_spec(self) -> Option<ChainSpec> {
        match self {
            Signature::String => Some(string::SPEC),
            Signature::Tuple => Some(tuple::SPEC),
            Signature::Array => Some(array::SPEC),
            Signature::Place => Some(place::SPEC),
            Signature::NetInstance => Some(net::SPEC),
            Signature::Template | Signature::Event => None,
        }
    }
}
