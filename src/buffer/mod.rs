//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between the tree and its
//! files. Every page access goes through it and through its lock manager.
//!
//! # Components
//! - [`BufferPool`] - The page cache and transaction completion
//! - [`LockManager`] - Page-level shared/exclusive locks
//! - [`Frame`] - A cached page + dirty owner + before-image
//! - [`Catalog`] - Maps file ids to files
//! - [`BufferPoolStats`] - Performance statistics

mod buffer_pool;
mod catalog;
mod frame;
mod lock_manager;
mod stats;

pub use buffer_pool::BufferPool;
pub use catalog::Catalog;
pub use frame::{Frame, PageRef};
pub use lock_manager::{LockManager, LockMode};
pub use stats::{BufferPoolStats, PoolEvent, StatsSnapshot};
