//! GiST index vacuum.
//!
//! Vacuum runs in two stages:
//!
//! 1. [`bulk_delete`] scans every page in physical order, removes entries
//!    the liveness callback reports dead, records recyclable pages in the
//!    free space map, and remembers internal pages and empty leaves.
//! 2. [`vacuum_cleanup`] revisits the remembered internal pages and
//!    unlinks the empty leaves below them, then finalizes the statistics.
//!
//! Both stages run concurrently with inserts, splits and searches. Page
//! locks are held for one page at a time, except while unlinking a leaf,
//! where the leaf is locked before its parent.

mod block_set;
mod delay;
mod reclaim;
mod scan;
mod stats;

pub use block_set::{BlockSet, PageSetArena, PageSets};
pub use delay::VacuumDelay;
pub use stats::{GistBulkDeleteResult, IndexBulkDeleteResult};

use crate::relation::GistRelation;
use crate::tuple::ItemPointer;
use crate::xact::TransactionClock;
use arbor_common::{Result, VacuumConfig};
use std::sync::atomic::AtomicBool;

/// Everything a vacuum needs from its driver.
pub struct VacuumInfo<'a> {
    /// Index being vacuumed.
    pub index: &'a GistRelation,
    /// Statistics-only run: cleanup does nothing.
    pub analyze_only: bool,
    /// True if `num_heap_tuples` is an estimate.
    pub estimated_count: bool,
    /// Live rows in the heap, as counted by the driver.
    pub num_heap_tuples: u64,
    /// Source of deletion stamps and the recycling horizon.
    pub clock: &'a dyn TransactionClock,
    pub config: &'a VacuumConfig,
    /// Checked between pages; once set, the vacuum stops with
    /// [`ArborError::Interrupted`](arbor_common::ArborError::Interrupted).
    pub interrupt: Option<&'a AtomicBool>,
}

impl<'a> VacuumInfo<'a> {
    /// Creates info for a full vacuum with exact heap counts.
    pub fn new(
        index: &'a GistRelation,
        clock: &'a dyn TransactionClock,
        config: &'a VacuumConfig,
        num_heap_tuples: u64,
    ) -> Self {
        Self {
            index,
            analyze_only: false,
            estimated_count: false,
            num_heap_tuples,
            clock,
            config,
            interrupt: None,
        }
    }
}

/// Removes every entry for which `callback` returns true.
///
/// Pass `None` as `stats` on the first call of a run and the returned
/// value on later calls; `tuples_removed` accumulates across them.
pub fn bulk_delete(
    info: &VacuumInfo<'_>,
    stats: Option<GistBulkDeleteResult>,
    callback: &mut dyn FnMut(&ItemPointer) -> bool,
) -> Result<GistBulkDeleteResult> {
    info.config.validate()?;
    let mut stats = stats.unwrap_or_default();
    scan::vacuum_scan(info, &mut stats, Some(callback))?;
    Ok(stats)
}

/// Finishes a vacuum run: scans if no bulk delete ran, unlinks empty leaves,
/// and clamps the tuple count.
///
/// Returns the statistics unchanged when `info.analyze_only` is set.
pub fn vacuum_cleanup(
    info: &VacuumInfo<'_>,
    stats: Option<GistBulkDeleteResult>,
) -> Result<Option<IndexBulkDeleteResult>> {
    if info.analyze_only {
        return Ok(stats.map(GistBulkDeleteResult::into_stats));
    }
    info.config.validate()?;

    let mut stats = match stats {
        Some(stats) => stats,
        None => {
            let mut stats = GistBulkDeleteResult::new();
            scan::vacuum_scan(info, &mut stats, None)?;
            stats
        }
    };

    if let Some(page_sets) = stats.page_sets.take() {
        reclaim::delete_empty_pages(info, &mut stats.stats, &page_sets)?;
    }

    let mut stats = stats.into_stats();
    if !info.estimated_count && stats.num_index_tuples > info.num_heap_tuples {
        stats.num_index_tuples = info.num_heap_tuples;
    }
    Ok(Some(stats))
}
