//! A GiST index relation and the collaborators its maintenance uses.

use crate::freespace::IndexFreeSpaceMap;
use crate::page::{page_recyclable, GistPage};
use crate::xact::TransactionClock;
use arbor_buffer::{Buffer, BufferPool};
use arbor_common::{BlockNumber, Result};
use arbor_wal::{FakeLsnSource, LogRecordType, Lsn, WalWriter};
use bytes::Bytes;
use std::sync::Arc;

/// Durability class of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// WAL-logged and shared between sessions.
    Permanent,
    /// Shared between sessions, not WAL-logged. Pages are stamped with
    /// fake LSNs.
    Unlogged,
    /// Private to one session and not WAL-logged. Needs no extension lock.
    Temporary,
}

/// An index relation: its pages, log, and free space map.
pub struct GistRelation {
    name: String,
    persistence: Persistence,
    pool: BufferPool<GistPage>,
    wal: Arc<WalWriter>,
    fake_lsn: FakeLsnSource,
    fsm: IndexFreeSpaceMap,
}

impl GistRelation {
    /// Creates an empty relation.
    pub fn new(name: impl Into<String>, persistence: Persistence, wal: Arc<WalWriter>) -> Self {
        let name = name.into();
        Self {
            pool: BufferPool::new(name.clone()),
            name,
            persistence,
            wal,
            fake_lsn: FakeLsnSource::new(),
            fsm: IndexFreeSpaceMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Returns true if changes to this relation are WAL-logged.
    pub fn needs_wal(&self) -> bool {
        self.persistence == Persistence::Permanent
    }

    /// Returns true if only the owning session can see this relation.
    pub fn is_local(&self) -> bool {
        self.persistence == Persistence::Temporary
    }

    pub fn pool(&self) -> &BufferPool<GistPage> {
        &self.pool
    }

    pub fn wal(&self) -> &WalWriter {
        &self.wal
    }

    pub fn fsm(&self) -> &IndexFreeSpaceMap {
        &self.fsm
    }

    /// Reads and pins a block.
    pub fn read_buffer(&self, block: BlockNumber) -> Result<Buffer<GistPage>> {
        self.pool.read_buffer(block)
    }

    /// Returns the current relation length.
    ///
    /// Shared relations take the extension lock around the read so that a
    /// concurrently added block is never seen before its initializer has
    /// locked it.
    pub fn num_blocks(&self) -> u32 {
        if self.is_local() {
            return self.pool.num_blocks();
        }
        let _lock = self.pool.lock_extension();
        self.pool.num_blocks()
    }

    /// Returns a position usable as a "changed after" marker: the WAL
    /// insert position for logged relations, a fresh fake LSN otherwise.
    pub fn current_lsn(&self) -> Lsn {
        if self.needs_wal() {
            self.wal.insert_position()
        } else {
            self.fake_lsn.next()
        }
    }

    /// Logs a page change and returns the LSN to stamp on the changed pages.
    ///
    /// Relations that are not WAL-logged get a fake LSN instead.
    pub fn log_change(
        &self,
        record_type: LogRecordType,
        payload: impl FnOnce() -> Bytes,
    ) -> Result<Lsn> {
        if self.needs_wal() {
            self.wal.append(record_type, payload())
        } else {
            Ok(self.fake_lsn.next())
        }
    }

    /// Gets a page for new content and initializes it with `init`.
    ///
    /// A page from the free space map is reused if it is still recyclable
    /// once locked; otherwise the relation is extended. `init` runs under
    /// the page's exclusive lock (and, when extending, the extension lock).
    pub fn allocate_page<F>(&self, clock: &dyn TransactionClock, init: F) -> Result<BlockNumber>
    where
        F: FnOnce(BlockNumber, &mut GistPage) -> Result<()>,
    {
        while let Some(block) = self.fsm.get_free_page() {
            let buffer = self.pool.read_buffer(block)?;
            let mut page = buffer.exclusive();
            if page_recyclable(&page, clock) {
                init(block, &mut *page)?;
                buffer.mark_dirty();
                return Ok(block);
            }
        }

        let lock = self.pool.lock_extension();
        let buffer = self.pool.extend(&lock);
        let block = buffer.block();
        let mut page = buffer.exclusive();
        drop(lock);
        init(block, &mut *page)?;
        buffer.mark_dirty();
        Ok(block)
    }
}

impl std::fmt::Debug for GistRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistRelation")
            .field("name", &self.name)
            .field("persistence", &self.persistence)
            .field("num_blocks", &self.pool.num_blocks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{ItemPointer, LeafTuple};
    use crate::xact::{FullTransactionId, LocalClock};

    fn relation(persistence: Persistence) -> GistRelation {
        GistRelation::new("test_idx", persistence, Arc::new(WalWriter::in_memory()))
    }

    #[test]
    fn test_persistence_flags() {
        let rel = relation(Persistence::Permanent);
        assert!(rel.needs_wal());
        assert!(!rel.is_local());

        let rel = relation(Persistence::Unlogged);
        assert!(!rel.needs_wal());
        assert!(!rel.is_local());

        let rel = relation(Persistence::Temporary);
        assert!(!rel.needs_wal());
        assert!(rel.is_local());
    }

    #[test]
    fn test_current_lsn_logged() {
        let rel = relation(Persistence::Permanent);
        let before = rel.current_lsn();
        let stamped = rel
            .log_change(LogRecordType::GistPageUpdate, || Bytes::from_static(b"x"))
            .unwrap();

        assert!(stamped > before);
        assert_eq!(rel.current_lsn(), stamped);
        assert_eq!(rel.wal().record_count(), 1);
    }

    #[test]
    fn test_current_lsn_unlogged_is_fake() {
        let rel = relation(Persistence::Unlogged);
        let a = rel.current_lsn();
        let b = rel
            .log_change(LogRecordType::GistPageUpdate, Bytes::new)
            .unwrap();

        assert!(b > a);
        assert!(rel.current_lsn() > b);
        assert_eq!(rel.wal().record_count(), 0);
    }

    #[test]
    fn test_allocate_page_extends() {
        let rel = relation(Persistence::Permanent);
        let clock = LocalClock::new();

        let block = rel
            .allocate_page(&clock, |block, page| page.init_leaf(block, vec![]))
            .unwrap();

        assert_eq!(block, BlockNumber(0));
        assert_eq!(rel.num_blocks(), 1);
        assert!(rel.read_buffer(block).unwrap().share().is_leaf());
    }

    #[test]
    fn test_allocate_page_reuses_recyclable_page() {
        let rel = relation(Persistence::Permanent);
        let clock = LocalClock::new();
        for _ in 0..3 {
            rel.allocate_page(&clock, |block, page| page.init_leaf(block, vec![]))
                .unwrap();
        }

        {
            let buffer = rel.read_buffer(BlockNumber(1)).unwrap();
            let mut page = buffer.exclusive();
            page.mark_deleted(BlockNumber(1), clock.read_next_full_xid())
                .unwrap();
        }
        clock.advance();
        rel.fsm().record_free_page(BlockNumber(1));
        rel.fsm().vacuum();

        let tuple = LeafTuple::new(vec![1u8], ItemPointer::new(9u32, 1));
        let block = rel
            .allocate_page(&clock, |block, page| page.init_leaf(block, vec![tuple]))
            .unwrap();

        assert_eq!(block, BlockNumber(1));
        assert_eq!(rel.num_blocks(), 3);
        assert_eq!(rel.read_buffer(block).unwrap().share().max_offset(), 1);
    }

    #[test]
    fn test_allocate_page_skips_unrecyclable_page() {
        let rel = relation(Persistence::Permanent);
        let clock = LocalClock::starting_at(FullTransactionId(10));
        rel.allocate_page(&clock, |block, page| page.init_leaf(block, vec![]))
            .unwrap();
        {
            let buffer = rel.read_buffer(BlockNumber(0)).unwrap();
            buffer
                .exclusive()
                .mark_deleted(BlockNumber(0), clock.read_next_full_xid())
                .unwrap();
        }
        rel.fsm().record_free_page(BlockNumber(0));
        rel.fsm().vacuum();

        let block = rel
            .allocate_page(&clock, |block, page| page.init_leaf(block, vec![]))
            .unwrap();
        assert_eq!(block, BlockNumber(1));
        assert!(rel.read_buffer(BlockNumber(0)).unwrap().share().is_deleted());
    }
}
