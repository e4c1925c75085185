//! Buffer pool counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the buffer pool counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// A fetch found the page cached.
    Hit,
    /// A fetch had to load the page.
    Miss,
    Eviction,
    PageRead,
    PageWrite,
    /// A fetch found its lock taken and started polling.
    LockWait,
    /// A fetch gave up on its lock.
    Abort,
}

const NUM_EVENTS: usize = 7;

impl PoolEvent {
    fn index(self) -> usize {
        self as usize
    }
}

/// Event counters of a [`BufferPool`](crate::buffer::BufferPool).
///
/// Counters are independent of each other, so updates use
/// `Ordering::Relaxed`.
///
/// # Example
/// ```
/// use blinkdb::buffer::{BufferPoolStats, PoolEvent};
///
/// let stats = BufferPoolStats::new();
/// stats.record(PoolEvent::LockWait);
/// assert_eq!(stats.snapshot().lock_waits, 1);
/// ```
#[derive(Debug, Default)]
pub struct BufferPoolStats {
    counters: [AtomicU64; NUM_EVENTS],
}

impl BufferPoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, event: PoolEvent) {
        self.counters[event.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count(&self, event: PoolEvent) -> u64 {
        self.counters[event.index()].load(Ordering::Relaxed)
    }

    /// Fraction of fetches served from the cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.count(PoolEvent::Hit),
            cache_misses: self.count(PoolEvent::Miss),
            evictions: self.count(PoolEvent::Eviction),
            pages_read: self.count(PoolEvent::PageRead),
            pages_written: self.count(PoolEvent::PageWrite),
            lock_waits: self.count(PoolEvent::LockWait),
            aborts: self.count(PoolEvent::Abort),
        }
    }

    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time copy of [`BufferPoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
    pub lock_waits: u64,
    pub aborts: u64,
}

impl StatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            total => self.cache_hits as f64 / total as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits {} misses {} ({:.1}% hit) evictions {} reads {} writes {} lock waits {} aborts {}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.pages_read,
            self.pages_written,
            self.lock_waits,
            self.aborts
        )
    }
}
