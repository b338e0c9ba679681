//! Block and item addressing shared by every Arbor crate.

use serde::{Deserialize, Serialize};

/// Page size in bytes. Used to size free-space-map pages.
pub const PAGE_SIZE: usize = 8 * 1024;

/// Offset of an entry within a page. Offsets are 1-based.
pub type OffsetNumber = u16;

/// First valid offset on a page.
pub const FIRST_OFFSET: OffsetNumber = 1;

/// Identifier of a fixed-size block within a relation.
///
/// Block numbers are dense and assigned in ascending order as the
/// relation grows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockNumber(pub u32);

impl BlockNumber {
    /// Sentinel meaning "no block" (e.g. a missing right sibling).
    pub const INVALID: BlockNumber = BlockNumber(u32::MAX);

    /// Block holding the root of a tree index.
    pub const ROOT: BlockNumber = BlockNumber(0);

    /// Returns true if this is not the invalid sentinel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns the following block number.
    #[inline]
    pub fn next(&self) -> Self {
        BlockNumber(self.0 + 1)
    }

    /// Returns the block as a vector index.
    #[inline]
    pub fn as_index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

impl From<u32> for BlockNumber {
    fn from(value: u32) -> Self {
        BlockNumber(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_number_validity() {
        assert!(BlockNumber(0).is_valid());
        assert!(BlockNumber::ROOT.is_valid());
        assert!(!BlockNumber::INVALID.is_valid());
    }

    #[test]
    fn test_block_number_next_and_ordering() {
        let b = BlockNumber(5);
        assert_eq!(b.next(), BlockNumber(6));
        assert!(b < b.next());
        assert!(BlockNumber(1000) < BlockNumber::INVALID);
    }

    #[test]
    fn test_block_number_display() {
        assert_eq!(BlockNumber(17).to_string(), "17");
        assert_eq!(BlockNumber::INVALID.to_string(), "invalid");
    }

    #[test]
    fn test_block_number_as_index() {
        assert_eq!(BlockNumber(3).as_index(), 3);
        assert_eq!(BlockNumber::from(9u32), BlockNumber(9));
    }

    #[test]
    fn test_first_offset() {
        assert_eq!(FIRST_OFFSET, 1);
    }

    #[test]
    fn test_block_number_serde_roundtrip() {
        let original = BlockNumber(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: BlockNumber = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
