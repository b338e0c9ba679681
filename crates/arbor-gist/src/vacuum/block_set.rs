//! Ascending block-number sets backed by a resettable chunk arena.
//!
//! The scan visits blocks in physical order, so both sets it builds
//! (internal pages and empty leaves) only ever receive ascending values.
//! That makes a set a list of sorted chunks: appends are O(1), membership
//! is two binary searches, and the whole arena is released in O(1).

use arbor_common::{ArborError, BlockNumber, Result};

/// Chunk arena shared by the page sets of one vacuum.
///
/// Chunks are bump-allocated. [`PageSetArena::reset`] hands every chunk
/// back at once while keeping their memory for the next scan.
#[derive(Debug)]
pub struct PageSetArena {
    /// Capacity of each chunk, in block numbers.
    chunk_blocks: usize,
    /// Every chunk ever allocated.
    chunks: Vec<Vec<BlockNumber>>,
    /// Chunks handed out since the last reset.
    in_use: usize,
}

impl PageSetArena {
    /// Creates an arena whose chunks hold `chunk_blocks` block numbers.
    pub fn new(chunk_blocks: usize) -> Self {
        Self {
            chunk_blocks: chunk_blocks.max(1),
            chunks: Vec::new(),
            in_use: 0,
        }
    }

    /// Releases every chunk.
    pub fn reset(&mut self) {
        self.in_use = 0;
    }

    /// Returns the number of chunks handed out since the last reset.
    pub fn chunks_in_use(&self) -> usize {
        self.in_use
    }

    /// Returns the number of chunks backed by memory.
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.len()
    }

    fn allocate(&mut self) -> usize {
        let id = self.in_use;
        match self.chunks.get_mut(id) {
            Some(chunk) => chunk.clear(),
            None => self.chunks.push(Vec::with_capacity(self.chunk_blocks)),
        }
        self.in_use += 1;
        id
    }

    fn chunk(&self, id: usize) -> &[BlockNumber] {
        &self.chunks[id]
    }
}

/// Set of block numbers built by ascending appends.
#[derive(Debug, Default)]
pub struct BlockSet {
    /// Arena chunk ids, in value order.
    chunks: Vec<usize>,
    len: usize,
    last: Option<BlockNumber>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block, which must be greater than every block already in
    /// the set.
    pub fn push(&mut self, arena: &mut PageSetArena, block: BlockNumber) -> Result<()> {
        if let Some(last) = self.last {
            if block <= last {
                return Err(ArborError::NonAscendingBlock {
                    block: block.0,
                    last: last.0,
                });
            }
        }

        let current = match self.chunks.last() {
            Some(&id) if arena.chunk(id).len() < arena.chunk_blocks => id,
            _ => {
                let id = arena.allocate();
                self.chunks.push(id);
                id
            }
        };
        arena.chunks[current].push(block);
        self.len += 1;
        self.last = Some(block);
        Ok(())
    }

    /// Returns true if `block` is in the set.
    pub fn contains(&self, arena: &PageSetArena, block: BlockNumber) -> bool {
        let after = self
            .chunks
            .partition_point(|&id| arena.chunk(id)[0] <= block);
        match after.checked_sub(1) {
            Some(index) => arena.chunk(self.chunks[index]).binary_search(&block).is_ok(),
            None => false,
        }
    }

    /// Iterates the set in ascending order.
    pub fn iter<'a>(&'a self, arena: &'a PageSetArena) -> impl Iterator<Item = BlockNumber> + 'a {
        self.chunks
            .iter()
            .flat_map(move |&id| arena.chunk(id).iter().copied())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forgets every member. The chunks stay allocated in the arena until
    /// it is reset.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
        self.last = None;
    }
}

/// The two sets a scan hands to the empty-page reclaimer.
#[derive(Debug)]
pub struct PageSets {
    arena: PageSetArena,
    internal: BlockSet,
    empty_leaf: BlockSet,
}

impl PageSets {
    pub fn new(chunk_blocks: usize) -> Self {
        Self {
            arena: PageSetArena::new(chunk_blocks),
            internal: BlockSet::new(),
            empty_leaf: BlockSet::new(),
        }
    }

    /// Empties both sets and releases their memory to the arena.
    pub fn reset(&mut self) {
        self.internal.clear();
        self.empty_leaf.clear();
        self.arena.reset();
    }

    pub fn record_internal(&mut self, block: BlockNumber) -> Result<()> {
        self.internal.push(&mut self.arena, block)
    }

    pub fn record_empty_leaf(&mut self, block: BlockNumber) -> Result<()> {
        self.empty_leaf.push(&mut self.arena, block)
    }

    pub fn is_empty_leaf(&self, block: BlockNumber) -> bool {
        self.empty_leaf.contains(&self.arena, block)
    }

    /// Internal pages in ascending order.
    pub fn internal_pages(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.internal.iter(&self.arena)
    }

    /// Empty leaves in ascending order.
    pub fn empty_leaves(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.empty_leaf.iter(&self.arena)
    }

    pub fn internal_count(&self) -> usize {
        self.internal.len()
    }

    pub fn empty_leaf_count(&self) -> usize {
        self.empty_leaf.len()
    }

    pub fn arena(&self) -> &PageSetArena {
        &self.arena
    }
}
