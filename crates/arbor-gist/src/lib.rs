//! GiST index pages and their maintenance for Arbor.
//!
//! This crate provides:
//! - The GiST page format (leaf, internal and deleted pages)
//! - Index entries and heap row pointers
//! - A transaction clock used to stamp and recycle deleted pages
//! - A free space map for recyclable index pages
//! - The index relation tying pages, WAL and free space map together
//! - Vacuum: dead-entry removal and empty-leaf reclamation

pub mod freespace;
pub mod page;
pub mod relation;
pub mod tuple;
pub mod vacuum;
pub mod xact;

pub use freespace::IndexFreeSpaceMap;
pub use page::{page_recyclable, GistPage, PageKind, MAX_PAGE_ENTRIES};
pub use relation::{GistRelation, Persistence};
pub use tuple::{Downlink, ItemPointer, LeafTuple};
pub use vacuum::{
    bulk_delete, vacuum_cleanup, GistBulkDeleteResult, IndexBulkDeleteResult, PageSets,
    VacuumInfo,
};
pub use xact::{FullTransactionId, LocalClock, TransactionClock};
