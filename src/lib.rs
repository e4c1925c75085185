//! blinkdb - a concurrent B-link tree index over a locking buffer pool.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            blinkdb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Index Layer (index/btree/)                  │   │
//! │  │   BLinkTreeFile: move-right search, split, root growth   │   │
//! │  │        Iterators + IndexPredicate + integrity check      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferPool: page cache, random clean-page eviction,    │   │
//! │  │   commit (flush) / abort (restore before-images)         │   │
//! │  │   LockManager: shared/exclusive page locks, timeouts     │   │
//! │  │   Catalog + Frame + Statistics                           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                    │   │
//! │  │   PageFile + DiskManager + page codec with checksums     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, TransactionId, Error, config)
//! - [`buffer`] - Buffer pool, lock manager and catalog
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - The B-link tree
//! - [`tuple`] - Fixed-width integer tuples
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use blinkdb::buffer::{BufferPool, Catalog};
//! use blinkdb::common::config::BufferPoolConfig;
//! use blinkdb::index::btree::{BLinkTreeFile, IndexPredicate, PredicateOp};
//! use blinkdb::storage::page::PageLayout;
//! use blinkdb::tuple::{Tuple, TupleDesc};
//! use blinkdb::TransactionId;
//!
//! let pool = Arc::new(BufferPool::new(BufferPoolConfig::default(), Arc::new(Catalog::new())));
//! let layout = PageLayout::new(blinkdb::PAGE_SIZE, TupleDesc::new(2), 0);
//! let tree = BLinkTreeFile::open_or_create(Arc::clone(&pool), "my_index.db", layout).unwrap();
//!
//! let txn = TransactionId::new();
//! for k in 0..100 {
//!     tree.insert_tuple(txn, &Tuple::new(vec![k, k * 2])).unwrap();
//! }
//! pool.commit(txn).unwrap();
//!
//! let txn = TransactionId::new();
//! let hits = tree
//!     .index_iter(txn, IndexPredicate::new(PredicateOp::Equals, 42))
//!     .count();
//! assert_eq!(hits, 1);
//! pool.commit(txn).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FileId, PageCategory, PageId, Result, TransactionId};

pub use buffer::{BufferPool, BufferPoolStats, Catalog, LockMode, StatsSnapshot};
pub use index::btree::{BLinkTreeFile, IndexPredicate, PredicateOp, TreeSummary};
pub use storage::page::{BTreePage, PageLayout};
pub use storage::PageFile;
pub use tuple::{Tuple, TupleDesc};
