//! Configuration constants for blinkdb.

use std::time::Duration;

/// Default size of a tree page in bytes (4KB).
///
/// Each [`PageFile`](crate::storage::PageFile) is created with its own page
/// size so tests can shrink pages and force splits with few tuples.
pub const PAGE_SIZE: usize = 4096;

/// Size of the root pointer page stored at offset 0 of every tree file.
///
/// # Layout (18 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       9     page header
/// 9       4     root page number (0 = no root)
/// 13      1     root page category
/// 14      4     first header page number (0 = none)
/// ```
pub const ROOT_POINTER_PAGE_SIZE: usize = 18;

/// Default number of pages the buffer pool caches.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// How long `BufferPool::fetch_page` waits for a lock before aborting.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(2200);

/// Sleep between two lock attempts in `BufferPool::fetch_page`.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Buffer pool tuning knobs.
///
/// # Example
/// ```
/// use blinkdb::common::config::BufferPoolConfig;
/// use std::time::Duration;
///
/// let config = BufferPoolConfig::default()
///     .with_pool_size(128)
///     .with_lock_timeout(Duration::from_millis(500));
/// assert_eq!(config.pool_size, 128);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Maximum number of cached pages.
    pub pool_size: usize,
    /// Wall-clock budget for one lock acquisition.
    pub lock_timeout: Duration,
    /// Backoff between lock attempts.
    pub lock_poll_interval: Duration,
}

impl BufferPoolConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_PAGES,
            lock_timeout: LOCK_TIMEOUT,
            lock_poll_interval: LOCK_POLL_INTERVAL,
        }
    }
}
