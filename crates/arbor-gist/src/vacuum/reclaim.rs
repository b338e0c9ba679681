//! Second stage: unlinking empty leaves from their parents.

use super::block_set::PageSets;
use super::delay::VacuumDelay;
use super::stats::IndexBulkDeleteResult;
use super::VacuumInfo;
use crate::page::GistPage;
use arbor_buffer::Buffer;
use arbor_common::{BlockNumber, OffsetNumber, Result, FIRST_OFFSET};
use arbor_wal::{LogRecordType, PageDeletePayload};
use tracing::{debug, info};

/// Visits the remembered internal pages and deletes the empty leaves they
/// point to.
///
/// A parent is never left without a downlink. Leaves that cannot be
/// deleted because of a concurrent change are left for the next vacuum.
pub(super) fn delete_empty_pages(
    info: &VacuumInfo<'_>,
    stats: &mut IndexBulkDeleteResult,
    page_sets: &PageSets,
) -> Result<()> {
    let rel = info.index;
    let mut delay = VacuumDelay::new(rel.name(), info.config, info.interrupt);
    let mut empty_pages_remaining = page_sets.empty_leaf_count();
    let pages_removed_before = stats.pages_removed;

    for blkno in page_sets.internal_pages() {
        if empty_pages_remaining == 0 {
            break;
        }
        delay.delay_point()?;

        let buffer = rel.read_buffer(blkno)?;
        delay.charge_hit();

        let todelete: Vec<(OffsetNumber, BlockNumber)> = {
            let page = buffer.share();
            let Some(downlinks) = page.downlinks() else {
                debug_assert!(false, "internal page {} is no longer internal", blkno);
                continue;
            };
            page.check_capacity(blkno)?;

            let limit = downlinks.len().saturating_sub(1);
            (FIRST_OFFSET..)
                .zip(downlinks)
                .filter(|(_, downlink)| page_sets.is_empty_leaf(downlink.child))
                .map(|(offset, downlink)| (offset, downlink.child))
                .take(limit)
                .collect()
        };

        // The parent is unlocked here. Its downlinks may move before we
        // lock it again, so delete_page re-checks everything.
        let mut deleted: OffsetNumber = 0;
        for &(offset, leaf_blkno) in &todelete {
            // Never remove the last downlink.
            if buffer.share().max_offset() <= FIRST_OFFSET {
                break;
            }

            let leaf_buffer = rel.read_buffer(leaf_blkno)?;
            if delete_page(info, stats, &buffer, offset - deleted, &leaf_buffer)? {
                deleted += 1;
                delay.charge_dirty();
            }
        }

        stats.pages_removed += deleted as u32;
        // Every examined downlink counts, even the ones we failed to delete.
        empty_pages_remaining = empty_pages_remaining.saturating_sub(todelete.len());
    }

    info!(
        index = rel.name(),
        pages_removed = stats.pages_removed - pages_removed_before,
        pages_deleted = stats.pages_deleted,
        "gist.vacuum.empty_pages_deleted"
    );
    Ok(())
}

/// Deletes an empty leaf and removes its downlink from `parent`.
///
/// Locks the leaf, then the parent. Returns `Ok(false)` without changing
/// anything if a concurrent insert or split made the deletion unsafe.
fn delete_page(
    info: &VacuumInfo<'_>,
    stats: &mut IndexBulkDeleteResult,
    parent_buffer: &Buffer<GistPage>,
    downlink: OffsetNumber,
    leaf_buffer: &Buffer<GistPage>,
) -> Result<bool> {
    let rel = info.index;
    let leaf_blkno = leaf_buffer.block();
    let parent_blkno = parent_buffer.block();

    let mut leaf = leaf_buffer.exclusive();
    let mut parent = parent_buffer.exclusive();

    if !leaf.is_leaf() {
        debug_assert!(false, "leaf page {} is no longer a leaf", leaf_blkno);
        return Ok(false);
    }
    if leaf.follow_right {
        debug!(
            index = rel.name(),
            leaf = %leaf_blkno,
            "gist.vacuum.delete_skipped.split_in_progress"
        );
        return Ok(false);
    }
    if !leaf.is_empty() {
        debug!(index = rel.name(), leaf = %leaf_blkno, "gist.vacuum.delete_skipped.not_empty");
        return Ok(false);
    }

    if !parent.is_internal() {
        debug_assert!(false, "parent page {} is no longer internal", parent_blkno);
        return Ok(false);
    }
    let maxoff = parent.max_offset();
    if maxoff < downlink || maxoff <= FIRST_OFFSET {
        debug!(
            index = rel.name(),
            leaf = %leaf_blkno,
            parent = %parent_blkno,
            "gist.vacuum.delete_skipped.parent_changed"
        );
        return Ok(false);
    }
    if parent.downlink(downlink).map(|d| d.child) != Some(leaf_blkno) {
        debug!(
            index = rel.name(),
            leaf = %leaf_blkno,
            parent = %parent_blkno,
            "gist.vacuum.delete_skipped.downlink_moved"
        );
        return Ok(false);
    }

    // Every fallible check runs before the log append, so a refused
    // deletion leaves neither a record nor a page change behind.
    leaf.check_deletable(leaf_blkno)?;
    parent.check_offsets(parent_blkno, &[downlink])?;

    // Scans that already followed the downlink may still visit the leaf, so
    // it only becomes recyclable once every transaction running now is gone.
    let delete_xid = info.clock.read_next_full_xid();

    let lsn = rel.log_change(LogRecordType::GistPageDelete, || {
        PageDeletePayload {
            leaf: leaf_blkno,
            parent: parent_blkno,
            downlink,
            delete_xid: delete_xid.0,
        }
        .serialize()
    })?;

    leaf.set_deleted(delete_xid);
    leaf_buffer.mark_dirty();
    stats.pages_deleted += 1;

    parent.remove_offsets(&[downlink]);
    parent_buffer.mark_dirty();

    parent.lsn = lsn;
    leaf.lsn = lsn;

    debug!(
        index = rel.name(),
        leaf = %leaf_blkno,
        parent = %parent_blkno,
        downlink,
        delete_xid = %delete_xid,
        "gist.vacuum.page_deleted"
    );
    Ok(true)
}
