//! Integration tests for the buffer pool.
//!
//! These tests drive the pool against real page files, across threads and
//! across pool instances.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blinkdb::buffer::{BufferPool, Catalog, LockMode};
use blinkdb::common::config::BufferPoolConfig;
use blinkdb::storage::page::PageLayout;
use blinkdb::storage::{DbFile, PageFile};
use blinkdb::tuple::{Tuple, TupleDesc};
use blinkdb::{Error, PageCategory, PageId, TransactionId};
use tempfile::tempdir;

struct Setup {
    pool: Arc<BufferPool>,
    file: Arc<PageFile>,
    _dir: tempfile::TempDir,
}

fn setup(pool_size: usize, lock_timeout: Duration) -> Setup {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::new());
    let layout = PageLayout::new(128, TupleDesc::new(2), 0);
    let file = Arc::new(
        PageFile::create(dir.path().join("pool.db"), catalog.next_file_id(), layout).unwrap(),
    );
    catalog.add_file(file.clone());
    let config = BufferPoolConfig::default()
        .with_pool_size(pool_size)
        .with_lock_timeout(lock_timeout)
        .with_lock_poll_interval(Duration::from_millis(2));
    Setup {
        pool: Arc::new(BufferPool::new(config, catalog)),
        file,
        _dir: dir,
    }
}

fn leaves(s: &Setup, n: usize) -> Vec<PageId> {
    let mut pages = vec![PageId::new(s.file.id(), 1, PageCategory::Leaf)];
    while pages.len() < n {
        pages.push(s.file.allocate_page(PageCategory::Leaf).unwrap());
    }
    pages
}

fn add(s: &Setup, txn: TransactionId, pid: PageId, key: i32) {
    let page = s.pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
    page.write()
        .as_leaf_mut()
        .unwrap()
        .insert_tuple(Tuple::new(vec![key, 0]))
        .unwrap();
    page.mark_dirty(Some(txn));
}

fn keys(s: &Setup, txn: TransactionId, pid: PageId) -> Vec<i32> {
    let page = s.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
    let keys = page.read().as_leaf().unwrap().keys().collect();
    keys
}

/// A full pool of clean pages makes room by evicting one of them.
#[test]
fn test_eviction_with_clean_pages() {
    let s = setup(3, Duration::from_millis(100));
    let pages = leaves(&s, 4);
    let txn = TransactionId::new();

    for &pid in &pages[..3] {
        s.pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
    }
    assert_eq!(s.pool.page_count(), 3);

    s.pool.fetch_page(txn, pages[3], LockMode::Shared).unwrap();
    assert_eq!(s.pool.page_count(), 3);
    assert!(s.pool.is_cached(pages[3]));
    assert_eq!(s.pool.stats().snapshot().evictions, 1);
}

/// A full pool of dirty pages refuses to load another page.
#[test]
fn test_eviction_with_all_dirty_pages_fails() {
    let s = setup(3, Duration::from_millis(100));
    let pages = leaves(&s, 4);
    let txn = TransactionId::new();

    for (i, &pid) in pages[..3].iter().enumerate() {
        add(&s, txn, pid, i as i32);
    }

    let err = s
        .pool
        .fetch_page(txn, pages[3], LockMode::Shared)
        .unwrap_err();
    assert!(matches!(err, Error::NoCleanPages { capacity: 3 }));

    // Committing cleans the pages, which makes them evictable again.
    s.pool.commit(txn).unwrap();
    let txn = TransactionId::new();
    s.pool.fetch_page(txn, pages[3], LockMode::Shared).unwrap();
}

/// Evicted pages are written at commit, so reading them back after
/// eviction sees committed data.
#[test]
fn test_committed_data_survives_eviction() {
    let s = setup(2, Duration::from_millis(100));
    let pages = leaves(&s, 5);

    for (i, &pid) in pages.iter().enumerate() {
        let txn = TransactionId::new();
        add(&s, txn, pid, i as i32 * 10);
        s.pool.commit(txn).unwrap();
    }

    let txn = TransactionId::new();
    for (i, &pid) in pages.iter().enumerate() {
        assert_eq!(keys(&s, txn, pid), vec![i as i32 * 10]);
    }
    assert!(s.pool.stats().snapshot().evictions >= 3);
}

/// Abort restores dirtied pages and leaves untouched pages alone.
#[test]
fn test_abort_restores_only_dirtied_pages() {
    let s = setup(10, Duration::from_millis(100));
    let pages = leaves(&s, 2);

    let setup_txn = TransactionId::new();
    add(&s, setup_txn, pages[0], 1);
    add(&s, setup_txn, pages[1], 2);
    s.pool.commit(setup_txn).unwrap();

    let txn = TransactionId::new();
    add(&s, txn, pages[0], 100);
    assert_eq!(keys(&s, txn, pages[0]), vec![1, 100]);
    s.pool.abort(txn).unwrap();

    let check = TransactionId::new();
    assert_eq!(keys(&s, check, pages[0]), vec![1]);
    assert_eq!(keys(&s, check, pages[1]), vec![2]);
    assert!(!s.pool.holds_lock(txn, pages[0]));
}

/// A writer blocks a reader in another thread until the reader times out;
/// once the writer commits the reader's retry succeeds.
#[test]
fn test_lock_timeout_across_threads() {
    let s = setup(10, Duration::from_millis(50));
    let pid = leaves(&s, 1)[0];

    let writer = TransactionId::new();
    add(&s, writer, pid, 7);

    let pool = Arc::clone(&s.pool);
    let reader = thread::spawn(move || {
        let txn = TransactionId::new();
        let result = pool.fetch_page(txn, pid, LockMode::Shared).map(|_| ());
        pool.abort(txn).unwrap();
        result
    });
    let err = reader.join().unwrap().unwrap_err();
    assert!(err.is_abort());

    s.pool.commit(writer).unwrap();
    let txn = TransactionId::new();
    assert_eq!(keys(&s, txn, pid), vec![7]);
}

/// A waiting writer gets the lock when the holder finishes within the
/// timeout.
#[test]
fn test_waiting_writer_gets_lock() {
    let s = setup(10, Duration::from_secs(2));
    let pid = leaves(&s, 1)[0];

    let first = TransactionId::new();
    add(&s, first, pid, 1);

    let pool = Arc::clone(&s.pool);
    let second = thread::spawn(move || {
        let txn = TransactionId::new();
        let page = pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        page.write()
            .as_leaf_mut()
            .unwrap()
            .insert_tuple(Tuple::new(vec![2, 0]))
            .unwrap();
        page.mark_dirty(Some(txn));
        drop(page);
        pool.commit(txn).unwrap();
    });

    thread::sleep(Duration::from_millis(30));
    s.pool.commit(first).unwrap();
    second.join().unwrap();

    let txn = TransactionId::new();
    assert_eq!(keys(&s, txn, pid), vec![1, 2]);
}

/// Many readers share a page.
#[test]
fn test_concurrent_readers() {
    let s = setup(10, Duration::from_millis(200));
    let pid = leaves(&s, 1)[0];

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&s.pool);
            thread::spawn(move || {
                let txn = TransactionId::new();
                let page = pool.fetch_page(txn, pid, LockMode::Shared).unwrap();
                assert!(pool.holds_lock(txn, pid));
                drop(page);
                pool.commit(txn).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(s.pool.stats().snapshot().aborts, 0);
}

/// Pages written by one pool are read back by a fresh pool.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reload.db");
    let layout = PageLayout::new(128, TupleDesc::new(2), 0);
    let pid;

    {
        let catalog = Arc::new(Catalog::new());
        let file = Arc::new(PageFile::create(&path, catalog.next_file_id(), layout).unwrap());
        catalog.add_file(file.clone());
        let pool = BufferPool::new(BufferPoolConfig::default(), catalog);

        pid = PageId::new(file.id(), 1, PageCategory::Leaf);
        let txn = TransactionId::new();
        let page = pool.fetch_page(txn, pid, LockMode::Exclusive).unwrap();
        page.write()
            .as_leaf_mut()
            .unwrap()
            .insert_tuple(Tuple::new(vec![42, 1]))
            .unwrap();
        page.mark_dirty(Some(txn));
        pool.flush_all_pages().unwrap();
    }

    {
        let catalog = Arc::new(Catalog::new());
        let file = Arc::new(PageFile::open(&path, catalog.next_file_id(), layout).unwrap());
        catalog.add_file(file.clone());
        let pool = BufferPool::new(BufferPoolConfig::default(), catalog);

        let page = pool
            .fetch_page(TransactionId::new(), pid, LockMode::Shared)
            .unwrap();
        let keys: Vec<i32> = page.read().as_leaf().unwrap().keys().collect();
        assert_eq!(keys, vec![42]);
    }
}
