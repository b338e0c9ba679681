//! Index entries stored on GiST pages.

use arbor_common::{BlockNumber, OffsetNumber};
use bytes::Bytes;

/// Reference from an index entry to the heap row it indexes.
///
/// Combines a heap block with a line offset to uniquely identify where a
/// row is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPointer {
    /// Heap block containing the row.
    pub block: BlockNumber,
    /// Line offset within the heap block.
    pub offset: OffsetNumber,
}

impl ItemPointer {
    /// Creates a new item pointer.
    pub fn new(block: impl Into<BlockNumber>, offset: OffsetNumber) -> Self {
        Self {
            block: block.into(),
            offset,
        }
    }

    /// Invalid item pointer.
    pub const INVALID: ItemPointer = ItemPointer {
        block: BlockNumber::INVALID,
        offset: 0,
    };

    /// Returns true if this is a valid item pointer.
    pub fn is_valid(&self) -> bool {
        self.block.is_valid() && self.offset != 0
    }
}

impl std::fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.block, self.offset)
    }
}

/// Leaf entry: an opaque key plus the row it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafTuple {
    /// Encoded key (bounding predicate) of the row.
    pub key: Bytes,
    /// Heap row referenced by this entry.
    pub heap_ptr: ItemPointer,
}

impl LeafTuple {
    /// Creates a leaf entry.
    pub fn new(key: impl Into<Bytes>, heap_ptr: ItemPointer) -> Self {
        Self {
            key: key.into(),
            heap_ptr,
        }
    }
}

/// Internal entry: a bounding key plus the child page it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Union key of every entry below the child.
    pub key: Bytes,
    /// Child page.
    pub child: BlockNumber,
    /// Set on entries left behind by incomplete splits of old on-disk
    /// formats. Such entries are reported and never repaired here.
    pub invalid: bool,
}

impl Downlink {
    /// Creates a valid downlink.
    pub fn new(key: impl Into<Bytes>, child: impl Into<BlockNumber>) -> Self {
        Self {
            key: key.into(),
            child: child.into(),
            invalid: false,
        }
    }

    /// Creates a downlink carrying the legacy invalid marker.
    pub fn invalid(key: impl Into<Bytes>, child: impl Into<BlockNumber>) -> Self {
        Self {
            invalid: true,
            ..Self::new(key, child)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_pointer_validity() {
        assert!(ItemPointer::new(3u32, 1).is_valid());
        assert!(!ItemPointer::new(3u32, 0).is_valid());
        assert!(!ItemPointer::INVALID.is_valid());
    }

    #[test]
    fn test_item_pointer_display() {
        assert_eq!(ItemPointer::new(12u32, 4).to_string(), "(12,4)");
    }

    #[test]
    fn test_item_pointer_ordering() {
        assert!(ItemPointer::new(1u32, 9) < ItemPointer::new(2u32, 1));
        assert!(ItemPointer::new(2u32, 1) < ItemPointer::new(2u32, 2));
    }

    #[test]
    fn test_downlink_constructors() {
        let d = Downlink::new(Bytes::from_static(b"box"), 5u32);
        assert_eq!(d.child, BlockNumber(5));
        assert!(!d.invalid);

        let d = Downlink::invalid(Bytes::from_static(b"box"), 5u32);
        assert!(d.invalid);
        assert_eq!(d.key.as_ref(), b"box");
    }

    #[test]
    fn test_leaf_tuple_new() {
        let t = LeafTuple::new(vec![1u8, 2, 3], ItemPointer::new(0u32, 7));
        assert_eq!(t.key.len(), 3);
        assert_eq!(t.heap_ptr.offset, 7);
    }
}
