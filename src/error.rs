use thiserror::Error;

use crate::attribute::{PageNum, SlotNum};

/// The internal error taxonomy for every layer of the crate.
///
/// Every fallible operation in `pfm`, `page`, `tuple`, `rbfm`, and `catalog`
/// returns one of these variants (wrapped in [`Result`]) rather than the
/// integer status codes of the system this crate implements.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {page} out of range (file has {page_count} pages)")]
    OutOfRangePage { page: PageNum, page_count: PageNum },

    #[error("slot {slot} out of range on page {page} ({num_slots} slots)")]
    OutOfRangeSlot {
        page: PageNum,
        slot: SlotNum,
        num_slots: u16,
    },

    #[error("record has been deleted")]
    RecordDeleted,

    #[error("tuple is corrupt: attempted to read past byte {size}")]
    CorruptTuple { size: usize },

    #[error("record of {size} bytes does not fit in a single page")]
    RecordTooLarge { size: usize },

    #[error("update outgrew its page and there is no room left for a forwarding tombstone")]
    NoSpaceForTombstone,

    #[error("unrecognized attribute type tag {tag}")]
    UnknownType { tag: u8 },

    #[error("'{table}' is a reserved catalog table name")]
    Reserved { table: String },

    #[error("no such table '{table}'")]
    NoSuchTable { table: String },

    #[error("no such attribute '{attribute}'")]
    NoSuchAttribute { attribute: String },
}

pub type Result<T> = std::result::Result<T, Error>;
