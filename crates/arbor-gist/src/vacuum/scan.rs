//! First stage: the physical-order scan and per-page processing.

use super::block_set::PageSets;
use super::delay::VacuumDelay;
use super::stats::{GistBulkDeleteResult, IndexBulkDeleteResult};
use super::VacuumInfo;
use crate::page::page_recyclable;
use crate::tuple::ItemPointer;
use arbor_common::{BlockNumber, OffsetNumber, Result, FIRST_OFFSET};
use arbor_wal::{LogRecordType, Lsn, PageUpdatePayload};
use tracing::{debug, info, warn};

type DeadCallback<'c> = dyn FnMut(&ItemPointer) -> bool + 'c;

struct ScanState<'s, 'c> {
    info: &'s VacuumInfo<'s>,
    stats: &'s mut IndexBulkDeleteResult,
    page_sets: &'s mut PageSets,
    callback: Option<&'s mut DeadCallback<'c>>,
    /// Pages whose NSN is newer than this were split after the scan began.
    start_nsn: Lsn,
    delay: VacuumDelay<'s>,
}

/// Scans the whole index, resetting the per-scan statistics and page sets.
///
/// The relation length is re-read after each pass, so blocks added by
/// concurrent splits are visited too.
pub(super) fn vacuum_scan(
    info: &VacuumInfo<'_>,
    result: &mut GistBulkDeleteResult,
    callback: Option<&mut DeadCallback<'_>>,
) -> Result<()> {
    let rel = info.index;
    let GistBulkDeleteResult { stats, page_sets } = result;

    stats.estimated_count = false;
    stats.num_index_tuples = 0;
    stats.pages_deleted = 0;
    stats.pages_free = 0;

    let page_sets =
        page_sets.get_or_insert_with(|| PageSets::new(info.config.page_set_chunk_blocks));
    page_sets.reset();

    let mut state = ScanState {
        info,
        stats,
        page_sets,
        callback,
        start_nsn: rel.current_lsn(),
        delay: VacuumDelay::new(rel.name(), info.config, info.interrupt),
    };

    let mut blkno = BlockNumber::ROOT;
    let num_pages = loop {
        let num_pages = rel.num_blocks();
        if blkno.0 >= num_pages {
            break num_pages;
        }
        while blkno.0 < num_pages {
            state.process_page(blkno)?;
            blkno = blkno.next();
        }
    };

    if state.stats.pages_free > 0 {
        rel.fsm().vacuum();
    }
    state.stats.num_pages = num_pages;

    info!(
        index = rel.name(),
        num_pages,
        num_index_tuples = state.stats.num_index_tuples,
        tuples_removed = state.stats.tuples_removed,
        pages_deleted = state.stats.pages_deleted,
        pages_free = state.stats.pages_free,
        internal_pages = state.page_sets.internal_count(),
        empty_leaves = state.page_sets.empty_leaf_count(),
        naps = state.delay.naps(),
        dirty_pages = rel.pool().stats().dirty_blocks,
        "gist.vacuum.scan_completed"
    );
    Ok(())
}

impl ScanState<'_, '_> {
    /// Processes one block reached by the forward scan, then any right
    /// siblings that a concurrent split moved entries to behind the scan.
    fn process_page(&mut self, orig_blkno: BlockNumber) -> Result<()> {
        let rel = self.info.index;
        let mut next = Some(orig_blkno);

        while let Some(blkno) = next.take() {
            self.delay.delay_point()?;

            let buffer = rel.read_buffer(blkno)?;
            self.delay.charge_hit();
            let mut page = buffer.exclusive();

            if page_recyclable(&page, self.info.clock) {
                rel.fsm().record_free_page(blkno);
                self.stats.pages_free += 1;
                self.stats.pages_deleted += 1;
            } else if page.is_deleted() {
                self.stats.pages_deleted += 1;
            } else if page.is_leaf() {
                page.check_capacity(blkno)?;

                // A split after the scan started may have moved entries to
                // a lower block the scan already passed.
                if page.follow_right || self.start_nsn < page.nsn {
                    if let Some(right) = page.rightlink.filter(|r| *r < orig_blkno) {
                        debug!(
                            index = rel.name(),
                            block = %blkno,
                            right = %right,
                            "gist.vacuum.follow_right"
                        );
                        next = Some(right);
                    }
                }

                let mut todelete: Vec<OffsetNumber> = Vec::new();
                if let (Some(callback), Some(tuples)) =
                    (self.callback.as_deref_mut(), page.leaf_tuples())
                {
                    for (offset, tuple) in (FIRST_OFFSET..).zip(tuples) {
                        if callback(&tuple.heap_ptr) {
                            todelete.push(offset);
                        }
                    }
                }

                if !todelete.is_empty() {
                    // Nothing may fail between the log append and the page change.
                    page.check_offsets(blkno, &todelete)?;
                    let lsn = rel.log_change(LogRecordType::GistPageUpdate, || {
                        PageUpdatePayload {
                            block: blkno,
                            deleted_offsets: todelete.clone(),
                        }
                        .serialize()
                    })?;
                    page.remove_offsets(&todelete);
                    page.tuples_deleted = true;
                    page.lsn = lsn;
                    buffer.mark_dirty();
                    self.delay.charge_dirty();
                    self.stats.tuples_removed += todelete.len() as u64;
                }

                let nremain = page.max_offset();
                if nremain == 0 {
                    // Pages reached through a rightlink are left for the next
                    // vacuum; the set only takes ascending blocks.
                    if blkno == orig_blkno {
                        self.page_sets.record_empty_leaf(blkno)?;
                    }
                } else {
                    self.stats.num_index_tuples += nremain as u64;
                }
            } else if let Some(downlinks) = page.downlinks() {
                page.check_capacity(blkno)?;
                for (offset, downlink) in (FIRST_OFFSET..).zip(downlinks) {
                    if downlink.invalid {
                        warn!(
                            index = rel.name(),
                            block = %blkno,
                            offset,
                            detail = "incomplete split left by crash recovery on an old on-disk format",
                            hint = "rebuild the index",
                            "gist.vacuum.invalid_inner_tuple"
                        );
                    }
                }
                if blkno == orig_blkno {
                    self.page_sets.record_internal(blkno)?;
                }
            }
        }
        Ok(())
    }
}
