//! GiST page format.
//!
//! A page is a header (LSN, NSN, right sibling, flags) plus a closed
//! [`PageKind`]. Allowed transitions:
//!
//! ```text
//! New ------> Leaf | Internal      (init)
//! Deleted --> Leaf | Internal      (init, once recyclable)
//! Leaf (no entries) --> Deleted    (mark_deleted)
//! ```
//!
//! Internal pages never become deleted. A page holds at most
//! [`MAX_PAGE_ENTRIES`] entries, so every offset fits an [`OffsetNumber`].

use crate::tuple::{Downlink, LeafTuple};
use crate::xact::{FullTransactionId, TransactionClock};
use arbor_common::{ArborError, BlockNumber, OffsetNumber, Result, FIRST_OFFSET, PAGE_SIZE};
use arbor_wal::Lsn;

/// Space taken by the page header.
const PAGE_HEADER_SIZE: usize = 24;

/// Smallest space one entry can take: its line pointer plus an aligned
/// tuple header.
const MIN_ENTRY_SIZE: usize = 16;

/// Most entries a single page can hold.
pub const MAX_PAGE_ENTRIES: usize = (PAGE_SIZE - PAGE_HEADER_SIZE) / MIN_ENTRY_SIZE;

/// What a page currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageKind {
    /// Allocated but never initialized.
    #[default]
    New,
    /// Leaf page with its entries in offset order.
    Leaf(Vec<LeafTuple>),
    /// Internal page with its downlinks in offset order.
    Internal(Vec<Downlink>),
    /// Unlinked from the tree. Recyclable once no transaction that could
    /// still hold a reference to it is running.
    Deleted {
        /// Next transaction id at the time of deletion.
        delete_xid: FullTransactionId,
    },
}

/// A GiST index page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GistPage {
    /// Position of the last WAL record (or fake LSN) that modified this page.
    pub lsn: Lsn,
    /// Node sequence number: the LSN of the last split of this page.
    pub nsn: Lsn,
    /// Right sibling created by a split, if any.
    pub rightlink: Option<BlockNumber>,
    /// Set while a split has not yet inserted the sibling's downlink into
    /// the parent.
    pub follow_right: bool,
    /// Set once entries have been removed from this page by a vacuum.
    pub tuples_deleted: bool,
    /// Page contents.
    pub kind: PageKind,
}

impl GistPage {
    /// Creates an uninitialized page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a leaf page holding `tuples`.
    ///
    /// Fails if `tuples` does not fit on one page.
    pub fn leaf(tuples: Vec<LeafTuple>) -> Result<Self> {
        Self::with_kind(BlockNumber::INVALID, PageKind::Leaf(tuples))
    }

    /// Creates an internal page holding `downlinks`.
    ///
    /// Fails if `downlinks` does not fit on one page.
    pub fn internal(downlinks: Vec<Downlink>) -> Result<Self> {
        Self::with_kind(BlockNumber::INVALID, PageKind::Internal(downlinks))
    }

    fn with_kind(block: BlockNumber, kind: PageKind) -> Result<Self> {
        let page = Self {
            kind,
            ..Self::default()
        };
        page.check_capacity(block)?;
        Ok(page)
    }

    /// Reinitializes a new or deleted page as a leaf.
    pub fn init_leaf(&mut self, block: BlockNumber, tuples: Vec<LeafTuple>) -> Result<()> {
        self.check_initializable(block)?;
        *self = Self::with_kind(block, PageKind::Leaf(tuples))?;
        Ok(())
    }

    /// Reinitializes a new or deleted page as an internal page.
    pub fn init_internal(&mut self, block: BlockNumber, downlinks: Vec<Downlink>) -> Result<()> {
        self.check_initializable(block)?;
        *self = Self::with_kind(block, PageKind::Internal(downlinks))?;
        Ok(())
    }

    /// Fails with [`ArborError::PageCorrupted`] if the page holds more
    /// entries than fit on a page.
    ///
    /// Entries added through [`GistPage::leaf_tuples_mut`] or
    /// [`GistPage::downlinks_mut`] are not checked until this is called.
    pub fn check_capacity(&self, block: BlockNumber) -> Result<()> {
        let count = self.entry_count();
        if count > MAX_PAGE_ENTRIES {
            return Err(ArborError::PageCorrupted {
                block: block.0,
                reason: format!(
                    "{} entries exceed the page capacity of {}",
                    count, MAX_PAGE_ENTRIES
                ),
            });
        }
        Ok(())
    }

    fn check_initializable(&self, block: BlockNumber) -> Result<()> {
        match self.kind {
            PageKind::New | PageKind::Deleted { .. } => Ok(()),
            _ => Err(ArborError::PageCorrupted {
                block: block.0,
                reason: "cannot initialize a live page".to_string(),
            }),
        }
    }

    #[inline]
    pub fn is_new(&self) -> bool {
        matches!(self.kind, PageKind::New)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, PageKind::Leaf(_))
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, PageKind::Internal(_))
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self.kind, PageKind::Deleted { .. })
    }

    /// Returns the deletion stamp of a deleted page.
    pub fn delete_xid(&self) -> Option<FullTransactionId> {
        match self.kind {
            PageKind::Deleted { delete_xid } => Some(delete_xid),
            _ => None,
        }
    }

    fn entry_count(&self) -> usize {
        match &self.kind {
            PageKind::Leaf(tuples) => tuples.len(),
            PageKind::Internal(downlinks) => downlinks.len(),
            PageKind::New | PageKind::Deleted { .. } => 0,
        }
    }

    /// Returns the highest used offset, which is also the entry count.
    /// New and deleted pages have no entries.
    ///
    /// Saturates at `OffsetNumber::MAX` for a page over capacity.
    pub fn max_offset(&self) -> OffsetNumber {
        OffsetNumber::try_from(self.entry_count()).unwrap_or(OffsetNumber::MAX)
    }

    /// Returns true if the page holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn leaf_tuples(&self) -> Option<&[LeafTuple]> {
        match &self.kind {
            PageKind::Leaf(tuples) => Some(tuples),
            _ => None,
        }
    }

    pub fn leaf_tuples_mut(&mut self) -> Option<&mut Vec<LeafTuple>> {
        match &mut self.kind {
            PageKind::Leaf(tuples) => Some(tuples),
            _ => None,
        }
    }

    pub fn downlinks(&self) -> Option<&[Downlink]> {
        match &self.kind {
            PageKind::Internal(downlinks) => Some(downlinks),
            _ => None,
        }
    }

    pub fn downlinks_mut(&mut self) -> Option<&mut Vec<Downlink>> {
        match &mut self.kind {
            PageKind::Internal(downlinks) => Some(downlinks),
            _ => None,
        }
    }

    /// Returns the downlink at a 1-based offset.
    pub fn downlink(&self, offset: OffsetNumber) -> Option<&Downlink> {
        let index = (offset as usize).checked_sub(FIRST_OFFSET as usize)?;
        self.downlinks()?.get(index)
    }

    /// Removes the entries at the given 1-based offsets in one step.
    ///
    /// Offsets must be ascending and refer to existing entries; remaining
    /// entries keep their relative order. On error the page is unchanged.
    pub fn delete_offsets(&mut self, block: BlockNumber, offsets: &[OffsetNumber]) -> Result<()> {
        self.check_offsets(block, offsets)?;
        self.remove_offsets(offsets);
        Ok(())
    }

    /// Checks that [`GistPage::delete_offsets`] would accept `offsets`.
    pub fn check_offsets(&self, block: BlockNumber, offsets: &[OffsetNumber]) -> Result<()> {
        self.check_capacity(block)?;
        let max = self.max_offset();
        let sorted = offsets.windows(2).all(|w| w[0] < w[1]);
        if !sorted || offsets.iter().any(|&o| o < FIRST_OFFSET || o > max) {
            return Err(ArborError::PageCorrupted {
                block: block.0,
                reason: format!("bad offsets {:?} for page with {} entries", offsets, max),
            });
        }
        Ok(())
    }

    /// Removes entries at offsets already accepted by
    /// [`GistPage::check_offsets`]. Offsets out of order or out of range are
    /// skipped.
    pub(crate) fn remove_offsets(&mut self, offsets: &[OffsetNumber]) {
        let mut targets = offsets.iter().peekable();
        let mut offset = FIRST_OFFSET;
        let mut keep = || {
            let remove = targets.next_if_eq(&&offset).is_some();
            offset += 1;
            !remove
        };
        match &mut self.kind {
            PageKind::Leaf(tuples) => tuples.retain(|_| keep()),
            PageKind::Internal(downlinks) => downlinks.retain(|_| keep()),
            PageKind::New | PageKind::Deleted { .. } => {}
        }
    }

    /// Marks an empty leaf as deleted, stamping it with `delete_xid`.
    pub fn mark_deleted(&mut self, block: BlockNumber, delete_xid: FullTransactionId) -> Result<()> {
        self.check_deletable(block)?;
        self.set_deleted(delete_xid);
        Ok(())
    }

    /// Checks that [`GistPage::mark_deleted`] would succeed.
    pub fn check_deletable(&self, block: BlockNumber) -> Result<()> {
        if !matches!(&self.kind, PageKind::Leaf(tuples) if tuples.is_empty()) {
            return Err(ArborError::PageCorrupted {
                block: block.0,
                reason: "only an empty leaf can be marked deleted".to_string(),
            });
        }
        Ok(())
    }

    /// Marks a page already accepted by [`GistPage::check_deletable`] as
    /// deleted.
    pub(crate) fn set_deleted(&mut self, delete_xid: FullTransactionId) {
        self.kind = PageKind::Deleted { delete_xid };
    }
}

/// Returns true if the page can be handed out again for reuse.
///
/// New pages are always recyclable. A deleted page is recyclable once no
/// transaction that might still be dispatched to it is running. Live pages
/// never are.
pub fn page_recyclable(page: &GistPage, clock: &dyn TransactionClock) -> bool {
    match page.kind {
        PageKind::New => true,
        PageKind::Deleted { delete_xid } => clock.is_removable(delete_xid),
        PageKind::Leaf(_) | PageKind::Internal(_) => false,
    }
}
