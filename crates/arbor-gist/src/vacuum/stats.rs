//! Statistics carried across the stages of one vacuum.

use super::block_set::PageSets;

/// Index statistics reported to the maintenance driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBulkDeleteResult {
    /// Pages in the index at the end of the last scan.
    pub num_pages: u32,
    /// True if `num_index_tuples` is an estimate.
    pub estimated_count: bool,
    /// Entries left in the index.
    pub num_index_tuples: u64,
    /// Entries removed by the bulk-delete passes of this run.
    pub tuples_removed: u64,
    /// Pages unlinked from the tree by this run's cleanup.
    pub pages_removed: u32,
    /// Pages currently marked deleted, recyclable or not.
    pub pages_deleted: u32,
    /// Deleted pages that are recyclable and were recorded free.
    pub pages_free: u32,
}

/// Statistics plus the page sets remembered between the scan and cleanup.
///
/// Returned by [`bulk_delete`](super::bulk_delete) and handed back to the
/// next bulk-delete or cleanup call of the same run.
#[derive(Debug, Default)]
pub struct GistBulkDeleteResult {
    pub stats: IndexBulkDeleteResult,
    /// Sets built by the last scan; dropped by cleanup.
    pub(crate) page_sets: Option<PageSets>,
}

impl GistBulkDeleteResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the page sets built by the last scan, if still held.
    pub fn page_sets(&self) -> Option<&PageSets> {
        self.page_sets.as_ref()
    }

    /// Drops the page sets and returns the plain statistics.
    pub fn into_stats(self) -> IndexBulkDeleteResult {
        self.stats
    }
}
