//! Buffer Pool - the page cache, lock gate and rollback point.
//!
//! The [`BufferPool`] provides:
//! - Page caching between tree files and memory
//! - Page locking through the [`LockManager`], with timeout-based abort
//! - Random eviction of clean, unpinned pages
//! - Commit (flush) and abort (restore before-images) per transaction
//! - Retirement of pages allocated by aborted transactions

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::buffer::{BufferPoolStats, Catalog, Frame, LockManager, LockMode, PageRef, PoolEvent};
use crate::common::config::BufferPoolConfig;
use crate::common::{AbortReason, Error, PageId, Result, TransactionId};

/// Fixed-capacity cache of decoded pages shared by every transaction.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │                       BufferPool                         │
/// │  ┌─────────────────────┐   ┌──────────────────────────┐  │
/// │  │ cache               │   │ locks: LockManager       │  │
/// │  │ PageId → Arc<Frame> │   │ PageId → S{txn..} | X    │  │
/// │  └─────────────────────┘   └──────────────────────────┘  │
/// │  ┌─────────────────────┐   ┌──────────────────────────┐  │
/// │  │ catalog             │   │ stats                    │  │
/// │  │ FileId → DbFile     │   │ atomic counters          │  │
/// │  └─────────────────────┘   └──────────────────────────┘  │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `cache`: `Mutex`, held across a miss so a page is loaded only once
/// - `locks`: internal `Mutex`, never held while waiting
/// - frames: per-frame latches, never taken while `cache` is held
/// - `stats`: atomic counters
/// - `allocated`, `retired`: short `Mutex` sections, never nested
///
/// Lock order is `cache` then file I/O. Nothing that holds a page latch
/// takes the `cache` mutex.
///
/// # Usage
/// ```ignore
/// let pool = BufferPool::new(BufferPoolConfig::default(), catalog);
/// let txn = TransactionId::new();
///
/// let page = pool.fetch_page(txn, pid, LockMode::Exclusive)?;
/// page.write().as_leaf_mut()?.insert_tuple(tuple)?;
/// page.mark_dirty(Some(txn));
///
/// pool.commit(txn)?;
/// ```
pub struct BufferPool {
    config: BufferPoolConfig,
    catalog: Arc<Catalog>,
    cache: Mutex<HashMap<PageId, PageRef>>,
    locks: LockManager,
    stats: BufferPoolStats,
    /// Pages each running transaction appended to a file.
    allocated: Mutex<HashMap<TransactionId, Vec<PageId>>>,
    /// Pages appended by aborted transactions. Nothing links to them.
    retired: Mutex<HashSet<PageId>>,
}

impl BufferPool {
    /// # Panics
    /// Panics if `config.pool_size` is 0.
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>) -> Self {
        assert!(config.pool_size > 0, "pool_size must be > 0");

        Self {
            config,
            catalog,
            cache: Mutex::new(HashMap::with_capacity(config.pool_size)),
            locks: LockManager::new(),
            stats: BufferPoolStats::new(),
            allocated: Mutex::new(HashMap::new()),
            retired: Mutex::new(HashSet::new()),
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Lock `pid` in `mode` for `txn` and return the cached page, loading it
    /// if necessary.
    ///
    /// The lock is polled every `lock_poll_interval` until granted. The
    /// returned handle pins the page until dropped.
    ///
    /// # Errors
    /// - `Error::TransactionAborted` if the lock is not granted within
    ///   `lock_timeout`
    /// - `Error::NoCleanPages` if the pool is full of dirty or pinned pages
    /// - `Error::PageNotFound`, `Error::Corruption`, `Error::Io` from the file
    pub fn fetch_page(&self, txn: TransactionId, pid: PageId, mode: LockMode) -> Result<PageRef> {
        self.acquire_lock(txn, pid, mode)?;

        let mut cache = self.cache.lock();
        if let Some(frame) = cache.get(&pid) {
            self.stats.record(PoolEvent::Hit);
            trace!("{} hit {}", txn, pid);
            return Ok(Arc::clone(frame));
        }
        self.stats.record(PoolEvent::Miss);

        if cache.len() >= self.config.pool_size {
            self.evict_page(&mut cache)?;
        }

        let file = self.catalog.file(pid.file_id)?;
        let bytes = file.read_page_bytes(pid)?;
        let page = file.decode(pid, &bytes)?;
        self.stats.record(PoolEvent::PageRead);

        let frame = Arc::new(Frame::new(page, bytes));
        cache.insert(pid, Arc::clone(&frame));
        Ok(frame)
    }

    /// Give up `txn`'s lock on `pid` before the transaction ends.
    ///
    /// A page `txn` has dirtied stays locked until commit or abort, so the
    /// release is skipped for it.
    pub fn release_page(&self, txn: TransactionId, pid: PageId) {
        let dirtied_by_txn = self
            .cache
            .lock()
            .get(&pid)
            .is_some_and(|frame| frame.dirtier() == Some(txn));
        if !dirtied_by_txn {
            self.locks.release(txn, pid);
        }
    }

    /// Note that `txn` appended `pid` to its file.
    ///
    /// If `txn` aborts, `pid` is retired: its restored content is an empty
    /// page nothing links to, and [`BufferPool::is_retired`] tells anyone who
    /// reached it through an uncommitted link to start over.
    pub fn record_allocation(&self, txn: TransactionId, pid: PageId) {
        self.allocated.lock().entry(txn).or_default().push(pid);
    }

    /// True if `pid` was allocated by a transaction that aborted.
    pub fn is_retired(&self, pid: PageId) -> bool {
        self.retired.lock().contains(&pid)
    }

    /// True if `txn` holds a shared or exclusive lock on `pid`.
    pub fn holds_lock(&self, txn: TransactionId, pid: PageId) -> bool {
        self.locks.holds(txn, pid)
    }

    // ========================================================================
    // Public API: Transaction completion
    // ========================================================================

    /// Write every page `txn` dirtied, refresh their before-images and
    /// release all of `txn`'s locks.
    pub fn commit(&self, txn: TransactionId) -> Result<()> {
        self.transaction_complete(txn, true)
    }

    /// Restore every page `txn` dirtied to its before-image and release all
    /// of `txn`'s locks.
    pub fn abort(&self, txn: TransactionId) -> Result<()> {
        self.transaction_complete(txn, false)
    }

    /// Finish `txn`, committing or aborting it.
    ///
    /// Locks are released even if writing or restoring a page fails; the
    /// first such error is returned. Pages allocated by an aborted `txn` are
    /// retired before any page is restored, so an unlocked reader that sees
    /// restored content also sees the retirement.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> Result<()> {
        let allocated = self.allocated.lock().remove(&txn).unwrap_or_default();
        let result = if commit {
            self.flush_pages(txn)
        } else {
            if !allocated.is_empty() {
                debug!("{} retired {} pages", txn, allocated.len());
                self.retired.lock().extend(allocated);
            }
            self.restore_pages(txn)
        };
        let released = self.locks.release_all(txn);
        debug!(
            "{} {} ({} locks released)",
            txn,
            if commit { "committed" } else { "aborted" },
            released
        );
        result
    }

    fn pages_dirtied_by(&self, txn: TransactionId) -> Vec<PageRef> {
        self.cache
            .lock()
            .values()
            .filter(|frame| frame.dirtier() == Some(txn))
            .cloned()
            .collect()
    }

    fn restore_pages(&self, txn: TransactionId) -> Result<()> {
        let mut first_err = None;
        for frame in self.pages_dirtied_by(txn) {
            let restored = self
                .catalog
                .file(frame.id().file_id)
                .and_then(|file| file.decode(frame.id(), &frame.before_image()));
            match restored {
                Ok(page) => {
                    frame.restore(page);
                    trace!("{} restored {}", txn, frame.id());
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Public API: Flush and discard
    // ========================================================================

    /// Write every page dirtied by `txn`.
    pub fn flush_pages(&self, txn: TransactionId) -> Result<()> {
        for frame in self.pages_dirtied_by(txn) {
            self.flush_frame(&frame)?;
        }
        Ok(())
    }

    /// Write `pid` if it is cached and dirty.
    pub fn flush_page(&self, pid: PageId) -> Result<()> {
        let frame = self.cache.lock().get(&pid).cloned();
        match frame {
            Some(frame) => self.flush_frame(&frame),
            None => Ok(()),
        }
    }

    /// Write every dirty page.
    ///
    /// This refreshes before-images, so running transactions can no longer
    /// roll those pages back.
    pub fn flush_all_pages(&self) -> Result<()> {
        let frames: Vec<PageRef> = self.cache.lock().values().cloned().collect();
        for frame in frames {
            self.flush_frame(&frame)?;
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it.
    pub fn discard(&self, pid: PageId) {
        if self.cache.lock().remove(&pid).is_some() {
            trace!("discarded {}", pid);
        }
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of cached pages.
    pub fn page_count(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.cache.lock().contains_key(&pid)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn acquire_lock(&self, txn: TransactionId, pid: PageId, mode: LockMode) -> Result<()> {
        if mode == LockMode::None {
            return Ok(());
        }

        let start = Instant::now();
        let mut waited = false;
        while !self.locks.try_acquire(txn, pid, mode) {
            if !waited {
                self.stats.record(PoolEvent::LockWait);
                waited = true;
            }
            let elapsed = start.elapsed();
            if elapsed > self.config.lock_timeout {
                self.stats.record(PoolEvent::Abort);
                warn!(
                    "{} gave up on {:?} lock for {} after {}ms",
                    txn,
                    mode,
                    pid,
                    elapsed.as_millis()
                );
                return Err(Error::TransactionAborted {
                    txn,
                    reason: AbortReason::LockTimeout {
                        page: pid,
                        mode,
                        waited: elapsed,
                    },
                });
            }
            thread::sleep(self.config.lock_poll_interval);
        }
        Ok(())
    }

    /// Drop a random clean, unpinned page. Dirty pages are never evicted.
    fn evict_page(&self, cache: &mut HashMap<PageId, PageRef>) -> Result<()> {
        let candidates: Vec<PageId> = cache
            .iter()
            .filter(|(_, frame)| !frame.is_pinned() && !frame.is_dirty())
            .map(|(&pid, _)| pid)
            .collect();

        let victim = *candidates
            .choose(&mut rand::thread_rng())
            .ok_or(Error::NoCleanPages {
                capacity: self.config.pool_size,
            })?;

        cache.remove(&victim);
        self.stats.record(PoolEvent::Eviction);
        trace!("evicted {}", victim);
        Ok(())
    }

    /// Write a frame if dirty and make the written bytes its before-image.
    fn flush_frame(&self, frame: &Frame) -> Result<()> {
        if !frame.is_dirty() {
            return Ok(());
        }
        let file = self.catalog.file(frame.id().file_id)?;

        // Hold the read latch while encoding so no half-applied change is
        // written.
        let bytes = file.encode(&frame.read());
        file.write_page_bytes(frame.id(), &bytes)?;

        frame.set_before_image(bytes);
        frame.mark_dirty(None);
        self.stats.record(PoolEvent::PageWrite);
        trace!("flushed {}", frame.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FileId, PageCategory};
    use crate::storage::page::PageLayout;
    use crate::storage::{DbFile, PageFile};
    use crate::tuple::{Tuple, TupleDesc};
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        pool: BufferPool,
        file: Arc<PageFile>,
        _dir: tempfile::TempDir,
    }

    fn fixture(pool_size: usize) -> Fixture {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let layout = PageLayout::new(128, TupleDesc::new(1), 0);
        let file = Arc::new(
            PageFile::create(dir.path().join("t.db"), catalog.next_file_id(), layout).unwrap(),
        );
        catalog.add_file(file.clone());
        let config = BufferPoolConfig::default()
            .with_pool_size(pool_size)
            .with_lock_timeout(Duration::from_millis(60))
            .with_lock_poll_interval(Duration::from_millis(2));
        Fixture {
            pool: BufferPool::new(config, catalog),
            file,
            _dir: dir,
        }
    }

    fn first_leaf(f: &Fixture) -> PageId {
        PageId::new(f.file.id(), 1, PageCategory::Leaf)
    }

    fn insert(page: &PageRef, txn: TransactionId, key: i32) {
        page.write()
            .as_leaf_mut()
            .unwrap()
            .insert_tuple(Tuple::new(vec![key]))
            .unwrap();
        page.mark_dirty(Some(txn));
    }

    #[test]
    fn test_fetch_caches_page() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);

        f.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
        f.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();

        let snapshot = f.pool.stats().snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert!(f.pool.is_cached(pid));
        assert!(f.pool.holds_lock(txn, pid));
    }

    #[test]
    fn test_none_mode_takes_no_lock() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);
        f.pool.fetch_page(txn, pid, LockMode::None).unwrap();
        assert!(!f.pool.holds_lock(txn, pid));
    }

    #[test]
    fn test_unknown_file() {
        let f = fixture(4);
        let pid = PageId::new(FileId(99), 1, PageCategory::Leaf);
        let result = f.pool.fetch_page(TransactionId::new(), pid, LockMode::None);
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_commit_writes_and_releases() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);

        let page = f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        insert(&page, txn, 5);
        drop(page);
        f.pool.commit(txn).unwrap();

        assert!(!f.pool.holds_lock(txn, pid));
        let on_disk = f.file.decode(pid, &f.file.read_page_bytes(pid).unwrap()).unwrap();
        assert_eq!(on_disk.as_leaf().unwrap().num_tuples(), 1);
    }

    #[test]
    fn test_abort_restores_before_image() {
        let f = fixture(4);
        let pid = first_leaf(&f);

        let t1 = TransactionId::new();
        let page = f.pool.fetch_page(t1, pid, LockMode::Exclusive).unwrap();
        insert(&page, t1, 1);
        drop(page);
        f.pool.commit(t1).unwrap();

        let t2 = TransactionId::new();
        let page = f.pool.fetch_page(t2, pid, LockMode::Exclusive).unwrap();
        insert(&page, t2, 2);
        drop(page);
        f.pool.abort(t2).unwrap();

        let t3 = TransactionId::new();
        let page = f.pool.fetch_page(t3, pid, LockMode::Shared).unwrap();
        let keys: Vec<i32> = page.read().as_leaf().unwrap().keys().collect();
        assert_eq!(keys, vec![1]);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_release_keeps_lock_on_dirtied_page() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);

        let page = f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        f.pool.release_page(txn, pid);
        assert!(!f.pool.holds_lock(txn, pid));

        f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        insert(&page, txn, 3);
        f.pool.release_page(txn, pid);
        assert!(f.pool.holds_lock(txn, pid));
    }

    #[test]
    fn test_lock_timeout_aborts() {
        let f = fixture(4);
        let pid = first_leaf(&f);
        let (a, b) = (TransactionId::new(), TransactionId::new());

        f.pool.fetch_page(a, pid, LockMode::Exclusive).unwrap();
        let err = f.pool.fetch_page(b, pid, LockMode::Shared).unwrap_err();
        assert!(err.is_abort());
        match err {
            Error::TransactionAborted {
                txn,
                reason: AbortReason::LockTimeout { page, mode, waited },
            } => {
                assert_eq!(txn, b);
                assert_eq!(page, pid);
                assert_eq!(mode, LockMode::Shared);
                assert!(waited >= Duration::from_millis(60));
            }
            other => panic!("unexpected {:?}", other),
        }
        let snapshot = f.pool.stats().snapshot();
        assert_eq!(snapshot.aborts, 1);
        assert_eq!(snapshot.lock_waits, 1);
    }

    #[test]
    fn test_eviction_of_clean_pages() {
        let f = fixture(2);
        let txn = TransactionId::new();
        let pages: Vec<PageId> = (0..3)
            .map(|_| f.file.allocate_page(PageCategory::Leaf).unwrap())
            .collect();

        for &pid in &pages {
            f.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
        }
        assert_eq!(f.pool.page_count(), 2);
        assert_eq!(f.pool.stats().snapshot().evictions, 1);
    }

    #[test]
    fn test_pinned_pages_are_not_evicted() {
        let f = fixture(1);
        let txn = TransactionId::new();
        let other = f.file.allocate_page(PageCategory::Leaf).unwrap();

        let held = f.pool.fetch_page(txn, first_leaf(&f), LockMode::Shared).unwrap();
        let err = f.pool.fetch_page(txn, other, LockMode::Shared).unwrap_err();
        assert!(matches!(err, Error::NoCleanPages { capacity: 1 }));

        drop(held);
        f.pool.fetch_page(txn, other, LockMode::Shared).unwrap();
    }

    #[test]
    fn test_discard_drops_changes() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);

        let page = f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        insert(&page, txn, 9);
        drop(page);
        f.pool.discard(pid);
        assert!(!f.pool.is_cached(pid));

        let page = f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        assert_eq!(page.read().as_leaf().unwrap().num_tuples(), 0);
    }

    #[test]
    fn test_flush_page_refreshes_before_image() {
        let f = fixture(4);
        let txn = TransactionId::new();
        let pid = first_leaf(&f);

        let page = f.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        insert(&page, txn, 4);
        f.pool.flush_page(pid).unwrap();
        assert!(!page.is_dirty());

        // A flushed change survives abort: undo is single-level.
        drop(page);
        f.pool.abort(txn).unwrap();
        let page = f.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
        assert_eq!(page.read().as_leaf().unwrap().num_tuples(), 1);
    }

    #[test]
    fn test_abort_retires_allocated_pages() {
        let f = fixture(4);
        let (a, b) = (TransactionId::new(), TransactionId::new());

        let kept = f.file.allocate_page(PageCategory::Leaf).unwrap();
        f.pool.record_allocation(a, kept);
        let dropped = f.file.allocate_page(PageCategory::Leaf).unwrap();
        f.pool.record_allocation(b, dropped);

        f.pool.commit(a).unwrap();
        f.pool.abort(b).unwrap();

        assert!(!f.pool.is_retired(kept));
        assert!(f.pool.is_retired(dropped));
        assert!(!f.pool.is_retired(first_leaf(&f)));
    }

    #[test]
    fn test_waiter_sees_page_retired_once_granted() {
        let f = fixture(4);
        let (a, b) = (TransactionId::new(), TransactionId::new());
        let pid = f.file.allocate_page(PageCategory::Leaf).unwrap();
        f.pool.record_allocation(a, pid);
        let page = f.pool.fetch_page(a, pid, LockMode::Exclusive).unwrap();
        insert(&page, a, 1);
        drop(page);

        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let page = f.pool.fetch_page(b, pid, LockMode::Exclusive).unwrap();
                let x = (f.pool.is_retired(pid), page.read().as_leaf().unwrap().num_tuples());
                x
            });
            std::thread::sleep(Duration::from_millis(10));
            f.pool.abort(a).unwrap();
            assert_eq!(waiter.join().unwrap(), (true, 0));
        });
    }
}
