//! Free space map for index pages.
//!
//! Index pages are either entirely free or in use, so each tracked block
//! is one category byte: [`CATEGORY_FREE`] or [`CATEGORY_USED`].
//!
//! The map has two levels:
//! ```text
//! upper:  [ max(leaf 0) | max(leaf 1) | ... ]
//!              |              |
//! leaves: [ 1 byte / block ] [ 1 byte / block ] ...
//! ```
//! Updates touch the leaf level only. [`IndexFreeSpaceMap::vacuum`]
//! recomputes the upper level, and searches descend through the upper
//! level, so a freed page becomes discoverable after the next vacuum of
//! the map.

use arbor_common::{BlockNumber, PAGE_SIZE};
use parking_lot::Mutex;

/// Size of the leaf header in bytes.
pub const FSM_LEAF_HEADER_SIZE: usize = 8;

/// Number of blocks tracked per FSM leaf page.
pub const ENTRIES_PER_FSM_PAGE: usize = PAGE_SIZE - FSM_LEAF_HEADER_SIZE;

/// Category of a block that is in use.
pub const CATEGORY_USED: u8 = 0;

/// Category of a block that can be reused.
pub const CATEGORY_FREE: u8 = 255;

/// One leaf page of the map.
#[derive(Debug, Clone)]
struct FsmLeaf {
    /// First block tracked by this leaf.
    first_block: u32,
    /// One category per tracked block.
    entries: Box<[u8]>,
}

impl FsmLeaf {
    fn new(first_block: u32) -> Self {
        Self {
            first_block,
            entries: vec![CATEGORY_USED; ENTRIES_PER_FSM_PAGE].into_boxed_slice(),
        }
    }

    fn max_category(&self) -> u8 {
        self.entries.iter().copied().max().unwrap_or(CATEGORY_USED)
    }

    fn find_free(&self) -> Option<u32> {
        self.entries
            .iter()
            .position(|&c| c == CATEGORY_FREE)
            .map(|i| self.first_block + i as u32)
    }
}

#[derive(Debug, Default)]
struct FsmState {
    leaves: Vec<FsmLeaf>,
    /// Max category of each leaf, as of the last vacuum.
    upper: Vec<u8>,
}

impl FsmState {
    fn set(&mut self, block: BlockNumber, category: u8) {
        let leaf_index = fsm_page_for(block) as usize;
        while self.leaves.len() <= leaf_index {
            let first_block = (self.leaves.len() * ENTRIES_PER_FSM_PAGE) as u32;
            self.leaves.push(FsmLeaf::new(first_block));
            self.upper.push(CATEGORY_USED);
        }
        let leaf = &mut self.leaves[leaf_index];
        leaf.entries[(block.0 - leaf.first_block) as usize] = category;
    }
}

/// Computes which leaf page tracks a given block.
pub fn fsm_page_for(block: BlockNumber) -> u32 {
    block.0 / ENTRIES_PER_FSM_PAGE as u32
}

/// Free space map of one index relation.
#[derive(Debug, Default)]
pub struct IndexFreeSpaceMap {
    state: Mutex<FsmState>,
}

impl IndexFreeSpaceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block as free for reuse.
    pub fn record_free_page(&self, block: BlockNumber) {
        self.state.lock().set(block, CATEGORY_FREE);
    }

    /// Records a block as in use.
    pub fn record_used_page(&self, block: BlockNumber) {
        self.state.lock().set(block, CATEGORY_USED);
    }

    /// Returns true if the leaf level records `block` as free.
    pub fn is_free(&self, block: BlockNumber) -> bool {
        let state = self.state.lock();
        state
            .leaves
            .get(fsm_page_for(block) as usize)
            .map(|leaf| leaf.entries[(block.0 - leaf.first_block) as usize] == CATEGORY_FREE)
            .unwrap_or(false)
    }

    /// Recomputes the upper level from the leaves.
    pub fn vacuum(&self) {
        let mut state = self.state.lock();
        let FsmState { leaves, upper } = &mut *state;
        for (slot, leaf) in upper.iter_mut().zip(leaves.iter()) {
            *slot = leaf.max_category();
        }
    }

    /// Finds a free block, marks it used and returns it.
    ///
    /// Only leaves the upper level advertises are searched. A stale upper
    /// entry that no longer leads to a free block is corrected on the way.
    pub fn get_free_page(&self) -> Option<BlockNumber> {
        let mut state = self.state.lock();
        for leaf_index in 0..state.upper.len() {
            if state.upper[leaf_index] != CATEGORY_FREE {
                continue;
            }
            match state.leaves[leaf_index].find_free() {
                Some(block) => {
                    let block = BlockNumber(block);
                    state.set(block, CATEGORY_USED);
                    return Some(block);
                }
                None => state.upper[leaf_index] = CATEGORY_USED,
            }
        }
        None
    }

    /// Returns the number of blocks recorded free at the leaf level.
    pub fn free_page_count(&self) -> usize {
        let state = self.state.lock();
        state
            .leaves
            .iter()
            .map(|leaf| leaf.entries.iter().filter(|&&c| c == CATEGORY_FREE).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_page_for() {
        assert_eq!(fsm_page_for(BlockNumber(0)), 0);
        assert_eq!(fsm_page_for(BlockNumber(ENTRIES_PER_FSM_PAGE as u32 - 1)), 0);
        assert_eq!(fsm_page_for(BlockNumber(ENTRIES_PER_FSM_PAGE as u32)), 1);
    }

    #[test]
    fn test_free_page_hidden_until_vacuum() {
        let fsm = IndexFreeSpaceMap::new();
        fsm.record_free_page(BlockNumber(5));

        assert!(fsm.is_free(BlockNumber(5)));
        assert_eq!(fsm.get_free_page(), None);

        fsm.vacuum();
        assert_eq!(fsm.get_free_page(), Some(BlockNumber(5)));
        // Handing a page out marks it used
        assert!(!fsm.is_free(BlockNumber(5)));
        assert_eq!(fsm.get_free_page(), None);
    }

    #[test]
    fn test_record_used_page() {
        let fsm = IndexFreeSpaceMap::new();
        fsm.record_free_page(BlockNumber(1));
        fsm.record_free_page(BlockNumber(2));
        fsm.record_used_page(BlockNumber(1));
        fsm.vacuum();

        assert_eq!(fsm.free_page_count(), 1);
        assert_eq!(fsm.get_free_page(), Some(BlockNumber(2)));
    }

    #[test]
    fn test_stale_upper_level_is_corrected() {
        let fsm = IndexFreeSpaceMap::new();
        fsm.record_free_page(BlockNumber(3));
        fsm.vacuum();
        fsm.record_used_page(BlockNumber(3));

        assert_eq!(fsm.get_free_page(), None);
        assert_eq!(fsm.free_page_count(), 0);
    }

    #[test]
    fn test_multiple_leaves() {
        let fsm = IndexFreeSpaceMap::new();
        let far = BlockNumber(ENTRIES_PER_FSM_PAGE as u32 * 2 + 7);
        fsm.record_free_page(far);
        fsm.vacuum();

        assert!(!fsm.is_free(BlockNumber(7)));
        assert_eq!(fsm.get_free_page(), Some(far));
    }

    #[test]
    fn test_unknown_block_is_not_free() {
        let fsm = IndexFreeSpaceMap::new();
        assert!(!fsm.is_free(BlockNumber(100_000)));
        assert_eq!(fsm.free_page_count(), 0);
    }
}
