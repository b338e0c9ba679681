//! Buffer pool manager for a single relation.

use crate::frame::BufferFrame;
use arbor_common::page::BlockNumber;
use arbor_common::{ArborError, Result};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Buffer pool holding every block of one relation.
///
/// Manages the relation's frames with:
/// - Block number to frame mapping (dense, index = block number)
/// - Pin counting for concurrent access
/// - Per-frame share/exclusive content locks
/// - A relation-extension lock serializing growth
pub struct BufferPool<P> {
    /// Relation name, used in error messages.
    name: String,
    /// Frames indexed by block number.
    frames: RwLock<Vec<Arc<BufferFrame<P>>>>,
    /// Relation-extension lock.
    extension_lock: Mutex<()>,
}

/// Proof that the relation-extension lock is held.
pub struct ExtensionLock<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl<P: Default> BufferPool<P> {
    /// Creates an empty relation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: RwLock::new(Vec::new()),
            extension_lock: Mutex::new(()),
        }
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current number of blocks in the relation.
    ///
    /// A concurrent extender may add blocks at any time; callers that must
    /// not observe a half-initialized block take the extension lock first.
    pub fn num_blocks(&self) -> u32 {
        self.frames.read().len() as u32
    }

    /// Acquires the relation-extension lock.
    pub fn lock_extension(&self) -> ExtensionLock<'_> {
        ExtensionLock {
            _guard: self.extension_lock.lock(),
        }
    }

    /// Appends a new all-default block to the relation.
    ///
    /// The caller must hold the extension lock, and should lock the
    /// returned buffer before releasing it so that nobody can inspect the
    /// page before it is initialized.
    pub fn extend(&self, _lock: &ExtensionLock<'_>) -> Buffer<P> {
        let mut frames = self.frames.write();
        let block = BlockNumber(frames.len() as u32);
        let frame = Arc::new(BufferFrame::new(block, P::default()));
        frames.push(Arc::clone(&frame));
        frame.pin();
        Buffer { frame }
    }

    /// Reads and pins a block.
    pub fn read_buffer(&self, block: BlockNumber) -> Result<Buffer<P>> {
        let frames = self.frames.read();
        let frame = frames
            .get(block.as_index())
            .cloned()
            .ok_or_else(|| ArborError::PageNotFound {
                relation: self.name.clone(),
                block: block.0,
                num_blocks: frames.len() as u32,
            })?;
        frame.pin();
        Ok(Buffer { frame })
    }

    /// Hands every dirty page to `flush_fn` and clears its dirty flag.
    ///
    /// Each page is read under a share lock. Returns the number of pages
    /// flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(BlockNumber, &P) -> Result<()>,
    {
        // Collect frames first to avoid holding the frame table during flush
        let frames: Vec<_> = self.frames.read().iter().cloned().collect();
        let mut flushed = 0;

        for frame in frames {
            if frame.is_dirty() {
                let page = frame.read_page();
                flush_fn(frame.block(), &page)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        Ok(flushed)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let frames = self.frames.read();
        BufferPoolStats {
            total_blocks: frames.len(),
            pinned_blocks: frames.iter().filter(|f| f.is_pinned()).count(),
            dirty_blocks: frames.iter().filter(|f| f.is_dirty()).count(),
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Number of blocks in the relation.
    pub total_blocks: usize,
    /// Number of pinned blocks.
    pub pinned_blocks: usize,
    /// Number of dirty blocks.
    pub dirty_blocks: usize,
}

/// A pinned block. The pin is released when the buffer is dropped.
///
/// Pinning keeps the frame alive; it does not lock the page. Use
/// [`Buffer::share`] or [`Buffer::exclusive`] to take the content lock.
pub struct Buffer<P> {
    frame: Arc<BufferFrame<P>>,
}

impl<P> Buffer<P> {
    /// Returns the block number of this buffer.
    #[inline]
    pub fn block(&self) -> BlockNumber {
        self.frame.block()
    }

    /// Locks the page in share mode.
    #[inline]
    pub fn share(&self) -> RwLockReadGuard<'_, P> {
        self.frame.read_page()
    }

    /// Locks the page in exclusive mode.
    #[inline]
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, P> {
        self.frame.write_page()
    }

    /// Marks the page as modified.
    #[inline]
    pub fn mark_dirty(&self) {
        self.frame.set_dirty(true);
    }

    /// Returns true if the page has unflushed modifications.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }
}

impl<P> Drop for Buffer<P> {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

impl<P> std::fmt::Debug for Buffer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("frame", &self.frame).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(num_blocks: usize) -> BufferPool<Vec<u8>> {
        let pool = BufferPool::new("test_idx");
        let lock = pool.lock_extension();
        for _ in 0..num_blocks {
            pool.extend(&lock);
        }
        drop(lock);
        pool
    }

    #[test]
    fn test_buffer_pool_new() {
        let pool: BufferPool<Vec<u8>> = BufferPool::new("test_idx");

        assert_eq!(pool.name(), "test_idx");
        assert_eq!(pool.num_blocks(), 0);
        assert_eq!(pool.stats().total_blocks, 0);
    }

    #[test]
    fn test_buffer_pool_extend_assigns_dense_blocks() {
        let pool: BufferPool<Vec<u8>> = BufferPool::new("test_idx");
        let lock = pool.lock_extension();

        let b0 = pool.extend(&lock);
        let b1 = pool.extend(&lock);

        assert_eq!(b0.block(), BlockNumber(0));
        assert_eq!(b1.block(), BlockNumber(1));
        assert_eq!(pool.num_blocks(), 2);
        assert!(b0.share().is_empty());
    }

    #[test]
    fn test_buffer_pool_read_buffer_pins() {
        let pool = create_test_pool(3);

        let buf = pool.read_buffer(BlockNumber(1)).unwrap();
        assert_eq!(buf.block(), BlockNumber(1));
        assert_eq!(pool.stats().pinned_blocks, 1);

        drop(buf);
        assert_eq!(pool.stats().pinned_blocks, 0);
    }

    #[test]
    fn test_buffer_pool_read_beyond_end() {
        let pool = create_test_pool(2);

        let err = pool.read_buffer(BlockNumber(5)).unwrap_err();
        assert!(matches!(
            err,
            ArborError::PageNotFound {
                block: 5,
                num_blocks: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_buffer_pool_write_visible_to_other_buffers() {
        let pool = create_test_pool(1);

        {
            let buf = pool.read_buffer(BlockNumber(0)).unwrap();
            buf.exclusive().push(0xAB);
            buf.mark_dirty();
        }

        let buf = pool.read_buffer(BlockNumber(0)).unwrap();
        assert_eq!(*buf.share(), vec![0xAB]);
        assert!(buf.is_dirty());
    }

    #[test]
    fn test_buffer_pool_flush_all() {
        let pool = create_test_pool(5);

        for i in [0u32, 2, 4] {
            let buf = pool.read_buffer(BlockNumber(i)).unwrap();
            buf.exclusive().push(i as u8);
            buf.mark_dirty();
        }

        let mut flushed_blocks = vec![];
        let flushed = pool
            .flush_all(|block, page| {
                assert_eq!(page[0] as u32, block.0);
                flushed_blocks.push(block);
                Ok(())
            })
            .unwrap();

        assert_eq!(flushed, 3);
        assert_eq!(
            flushed_blocks,
            vec![BlockNumber(0), BlockNumber(2), BlockNumber(4)]
        );
        assert_eq!(pool.stats().dirty_blocks, 0);
    }

    #[test]
    fn test_buffer_pool_flush_error_propagates() {
        let pool = create_test_pool(1);
        pool.read_buffer(BlockNumber(0)).unwrap().mark_dirty();

        let result = pool.flush_all(|_, _| Err(ArborError::Internal("boom".to_string())));
        assert!(result.is_err());
        assert_eq!(pool.stats().dirty_blocks, 1);
    }

    #[test]
    fn test_buffer_pool_stats() {
        let pool = create_test_pool(4);

        let pinned = pool.read_buffer(BlockNumber(1)).unwrap();
        pool.read_buffer(BlockNumber(2)).unwrap().mark_dirty();

        let stats = pool.stats();
        assert_eq!(stats.total_blocks, 4);
        assert_eq!(stats.pinned_blocks, 1);
        assert_eq!(stats.dirty_blocks, 1);
        drop(pinned);
    }

    #[test]
    fn test_buffer_pool_concurrent_extend() {
        let pool: BufferPool<Vec<u8>> = BufferPool::new("test_idx");

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        let lock = pool.lock_extension();
                        let buf = pool.extend(&lock);
                        buf.exclusive().push(1);
                    }
                });
            }
        });

        assert_eq!(pool.num_blocks(), 100);
        for i in 0..100 {
            let buf = pool.read_buffer(BlockNumber(i)).unwrap();
            assert_eq!(*buf.share(), vec![1]);
        }
    }
}
