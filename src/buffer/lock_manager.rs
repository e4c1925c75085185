//! Page-level shared/exclusive locks.
//!
//! The [`LockManager`] never blocks. A failed [`LockManager::try_acquire`]
//! tells the caller to back off and retry; the buffer pool turns a retry
//! loop that runs too long into a transaction abort.

use std::collections::{HashMap, HashSet};

use log::trace;
use parking_lot::Mutex;

use crate::common::{PageId, TransactionId};

/// How a page is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Many readers.
    Shared,
    /// One writer.
    Exclusive,
    /// No lock at all. Used for internal-page reads, which rely on the
    /// move-right rule instead of locking.
    None,
}

/// Lock state of one page. The holder set of `Shared` is never empty.
#[derive(Debug)]
enum PageLock {
    Shared(HashSet<TransactionId>),
    Exclusive(TransactionId),
}

#[derive(Debug, Default)]
struct LockTable {
    pages: HashMap<PageId, PageLock>,
    held: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn record(&mut self, txn: TransactionId, pid: PageId) {
        self.held.entry(txn).or_default().insert(pid);
    }

    fn forget(&mut self, txn: TransactionId, pid: PageId) {
        if let Some(pages) = self.held.get_mut(&txn) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&txn);
            }
        }
    }

    fn remove_holder(&mut self, txn: TransactionId, pid: PageId) -> bool {
        let released = match self.pages.get_mut(&pid) {
            Some(PageLock::Exclusive(holder)) if *holder == txn => {
                self.pages.remove(&pid);
                true
            }
            Some(PageLock::Shared(holders)) => {
                let removed = holders.remove(&txn);
                if holders.is_empty() {
                    self.pages.remove(&pid);
                }
                removed
            }
            _ => false,
        };
        self.forget(txn, pid);
        released
    }
}

/// Lock table for every page of every file.
///
/// # Compatibility
/// | held \ requested | Shared | Exclusive |
/// |------------------|--------|-----------|
/// | none             | grant  | grant     |
/// | Shared (others)  | grant  | refuse    |
/// | Shared (only me) | keep   | upgrade   |
/// | Exclusive (me)   | keep   | keep      |
/// | Exclusive (other)| refuse | refuse    |
///
/// There is no downgrade and no deadlock detection.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take `mode` on `pid` for `txn` without waiting.
    ///
    /// `LockMode::None` always succeeds and records nothing.
    pub fn try_acquire(&self, txn: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let mut table = self.table.lock();

        let granted = match mode {
            LockMode::None => return true,
            LockMode::Shared => match table.pages.get_mut(&pid) {
                None => {
                    table.pages.insert(pid, PageLock::Shared(HashSet::from([txn])));
                    true
                }
                Some(PageLock::Shared(holders)) => {
                    holders.insert(txn);
                    true
                }
                Some(PageLock::Exclusive(holder)) => *holder == txn,
            },
            LockMode::Exclusive => match table.pages.get_mut(&pid) {
                None => {
                    table.pages.insert(pid, PageLock::Exclusive(txn));
                    true
                }
                Some(PageLock::Shared(holders)) => {
                    if holders.len() == 1 && holders.contains(&txn) {
                        table.pages.insert(pid, PageLock::Exclusive(txn));
                        true
                    } else {
                        false
                    }
                }
                Some(PageLock::Exclusive(holder)) => *holder == txn,
            },
        };

        if granted {
            table.record(txn, pid);
            trace!("{} granted {:?} on {}", txn, mode, pid);
        }
        granted
    }

    /// Drop whatever lock `txn` holds on `pid`.
    pub fn release(&self, txn: TransactionId, pid: PageId) {
        if self.table.lock().remove_holder(txn, pid) {
            trace!("{} released {}", txn, pid);
        }
    }

    /// Drop every lock `txn` holds. Returns how many were released.
    pub fn release_all(&self, txn: TransactionId) -> usize {
        let mut table = self.table.lock();
        let pages = table.held.remove(&txn).unwrap_or_default();
        for &pid in &pages {
            table.remove_holder(txn, pid);
        }
        trace!("{} released all {} locks", txn, pages.len());
        pages.len()
    }

    /// True if `txn` holds a shared or exclusive lock on `pid`.
    pub fn holds(&self, txn: TransactionId, pid: PageId) -> bool {
        self.lock_mode(txn, pid).is_some()
    }

    /// The mode in which `txn` holds `pid`, if any.
    pub fn lock_mode(&self, txn: TransactionId, pid: PageId) -> Option<LockMode> {
        match self.table.lock().pages.get(&pid) {
            Some(PageLock::Exclusive(holder)) if *holder == txn => Some(LockMode::Exclusive),
            Some(PageLock::Shared(holders)) if holders.contains(&txn) => Some(LockMode::Shared),
            _ => None,
        }
    }

    /// Pages on which `txn` holds a lock.
    pub fn pages_locked_by(&self, txn: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .held
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}
