//! Transaction clock used to stamp and recycle deleted pages.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// 64-bit transaction id: a 32-bit epoch followed by a 32-bit xid.
///
/// Full ids never wrap, so they compare with plain integer ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FullTransactionId(pub u64);

impl FullTransactionId {
    /// Invalid id.
    pub const INVALID: FullTransactionId = FullTransactionId(0);

    /// First id handed to a normal transaction.
    pub const FIRST_NORMAL: FullTransactionId = FullTransactionId(3);

    /// Builds a full id from its epoch and 32-bit xid.
    pub fn from_epoch_and_xid(epoch: u32, xid: u32) -> Self {
        Self(((epoch as u64) << 32) | xid as u64)
    }

    /// Returns the epoch.
    pub fn epoch(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the 32-bit xid.
    pub fn xid(&self) -> u32 {
        self.0 as u32
    }

    /// Returns true unless this is [`FullTransactionId::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for FullTransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.epoch(), self.xid())
    }
}

/// Source of transaction ids and of the global visibility horizon.
///
/// Passed into the vacuum explicitly so tests can control when deleted
/// pages become recyclable.
pub trait TransactionClock: Send + Sync {
    /// Returns the id the next transaction will receive.
    fn read_next_full_xid(&self) -> FullTransactionId;

    /// Returns true if no running or future transaction can still see
    /// state as of `xid`.
    fn is_removable(&self, xid: FullTransactionId) -> bool;
}

/// In-process clock with an explicit set of running transactions.
#[derive(Debug)]
pub struct LocalClock {
    /// Next id to hand out.
    next_xid: AtomicU64,
    /// Ids of transactions begun and not yet finished.
    running: Mutex<BTreeSet<u64>>,
}

impl LocalClock {
    /// Creates a clock whose first transaction gets
    /// [`FullTransactionId::FIRST_NORMAL`].
    pub fn new() -> Self {
        Self::starting_at(FullTransactionId::FIRST_NORMAL)
    }

    /// Creates a clock whose first transaction gets `next`.
    pub fn starting_at(next: FullTransactionId) -> Self {
        Self {
            next_xid: AtomicU64::new(next.0),
            running: Mutex::new(BTreeSet::new()),
        }
    }

    /// Starts a transaction and returns its id.
    pub fn begin(&self) -> FullTransactionId {
        let mut running = self.running.lock();
        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst);
        running.insert(xid);
        FullTransactionId(xid)
    }

    /// Finishes a transaction started with [`LocalClock::begin`].
    pub fn finish(&self, xid: FullTransactionId) {
        self.running.lock().remove(&xid.0);
    }

    /// Runs one empty transaction, moving the horizon forward when nothing
    /// older is running.
    pub fn advance(&self) -> FullTransactionId {
        let xid = self.begin();
        self.finish(xid);
        xid
    }

    /// Returns the oldest id any running or future transaction may see.
    pub fn oldest_visible(&self) -> FullTransactionId {
        let running = self.running.lock();
        match running.first() {
            Some(&oldest) => FullTransactionId(oldest),
            None => FullTransactionId(self.next_xid.load(Ordering::SeqCst)),
        }
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionClock for LocalClock {
    fn read_next_full_xid(&self) -> FullTransactionId {
        FullTransactionId(self.next_xid.load(Ordering::SeqCst))
    }

    fn is_removable(&self, xid: FullTransactionId) -> bool {
        xid < self.oldest_visible()
    }
}
