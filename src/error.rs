//! Faults raised by the object memory

use thiserror::Error;

/// The three fault classes of the object memory.
///
/// None of these is transient: `NoMemory` is pool exhaustion and the
/// others are structural misuse by the caller. Nothing is retried and
/// nothing here terminates the process; callers decide whether an error
/// is fatal for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The block pool has no bag with a suitable free block
    #[error("out of block memory (requested {requested} bytes)")]
    NoMemory { requested: usize },

    /// The item count would exceed the header's representable maximum
    #[error("collection full at {limit} items: {value}")]
    CollectionFull { limit: u32, value: String },

    /// An index or access outside the value's current extent
    #[error("index {index} out of range (limit {limit}): {value}")]
    OutOfRange { index: i64, limit: u32, value: String },
}
