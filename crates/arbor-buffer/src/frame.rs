//! Buffer frame management.

use arbor_common::page::BlockNumber;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A frame in the buffer pool holding a single page of a relation.
///
/// Each frame contains:
/// - The page itself, behind the page content lock
/// - Metadata for buffer management (pin count, dirty flag)
pub struct BufferFrame<P> {
    /// Block this frame holds.
    block: BlockNumber,
    /// Page content, guarded by the share/exclusive content lock.
    page: RwLock<P>,
    /// Number of users currently holding the frame pinned.
    pin_count: AtomicU32,
    /// Whether the page has been modified since the last flush.
    is_dirty: AtomicBool,
}

impl<P> BufferFrame<P> {
    /// Creates a frame holding the given page.
    pub fn new(block: BlockNumber, page: P) -> Self {
        Self {
            block,
            page: RwLock::new(page),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Returns the block held by this frame.
    #[inline]
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the previous pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the pin count.
    ///
    /// Returns the new pin count.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Underflow protection: restore to 0
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if this frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Acquires the content lock in share mode.
    #[inline]
    pub fn read_page(&self) -> RwLockReadGuard<'_, P> {
        self.page.read()
    }

    /// Acquires the content lock in exclusive mode.
    #[inline]
    pub fn write_page(&self) -> RwLockWriteGuard<'_, P> {
        self.page.write()
    }
}

impl<P> std::fmt::Debug for BufferFrame<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("block", &self.block)
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frame_new() {
        let frame = BufferFrame::new(BlockNumber(3), 0u64);

        assert_eq!(frame.block(), BlockNumber(3));
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_buffer_frame_pin_unpin() {
        let frame = BufferFrame::new(BlockNumber(0), 0u64);

        assert_eq!(frame.pin(), 0);
        assert_eq!(frame.pin(), 1);
        assert!(frame.is_pinned());

        assert_eq!(frame.unpin(), 1);
        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_buffer_frame_unpin_underflow() {
        let frame = BufferFrame::new(BlockNumber(0), 0u64);

        // Unpin when already at 0 should stay at 0
        frame.unpin();
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_buffer_frame_dirty() {
        let frame = BufferFrame::new(BlockNumber(0), 0u64);

        frame.set_dirty(true);
        assert!(frame.is_dirty());

        frame.set_dirty(false);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_buffer_frame_page_access() {
        let frame = BufferFrame::new(BlockNumber(0), vec![1u8, 2, 3]);

        frame.write_page().push(4);
        assert_eq!(*frame.read_page(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_buffer_frame_shared_readers() {
        let frame = BufferFrame::new(BlockNumber(0), 7u32);

        let a = frame.read_page();
        let b = frame.read_page();
        assert_eq!(*a + *b, 14);
    }

    #[test]
    fn test_buffer_frame_debug() {
        let frame = BufferFrame::new(BlockNumber(5), 0u8);
        frame.pin();
        frame.set_dirty(true);

        let debug_str = format!("{:?}", frame);
        assert!(debug_str.contains("BufferFrame"));
        assert!(debug_str.contains("pin_count"));
        assert!(debug_str.contains("is_dirty"));
    }
}
