//! Frame - one cached page.
//!
//! A [`Frame`] holds a decoded [`BTreePage`] plus metadata needed for buffer
//! management:
//! - Which transaction dirtied it, if any
//! - The before-image used to roll the page back

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, TransactionId};
use crate::storage::page::BTreePage;

/// Shared handle to a cached page.
///
/// While any `PageRef` to a frame is alive outside the pool, the frame is
/// pinned and will not be evicted.
pub type PageRef = Arc<Frame>;

/// A page in the buffer pool.
///
/// # Thread Safety
/// - `page`: `RwLock` latch, held only for the duration of one read or
///   modification, never across a fetch of another page
/// - `dirtier`: `Mutex`, kept outside the latch so eviction can test it
///   without touching the page
/// - `before_image`: `Mutex`, replaced on load and on flush
pub struct Frame {
    id: PageId,
    page: RwLock<BTreePage>,
    dirtier: Mutex<Option<TransactionId>>,
    before_image: Mutex<Vec<u8>>,
}

impl Frame {
    /// A clean frame for a page just read from disk as `bytes`.
    pub fn new(page: BTreePage, bytes: Vec<u8>) -> Self {
        Self {
            id: page.id(),
            page: RwLock::new(page),
            dirtier: Mutex::new(None),
            before_image: Mutex::new(bytes),
        }
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    /// Acquire the read latch on the page.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, BTreePage> {
        self.page.read()
    }

    /// Acquire the write latch on the page.
    ///
    /// Modifying the page does not mark it dirty; call
    /// [`Frame::mark_dirty`] with the modifying transaction.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, BTreePage> {
        self.page.write()
    }

    // ========================================================================
    // Dirty flag
    // ========================================================================

    /// Record `txn` as the page's dirtier, or clear the flag with `None`.
    #[inline]
    pub fn mark_dirty(&self, txn: Option<TransactionId>) {
        *self.dirtier.lock() = txn;
    }

    /// The transaction that dirtied the page, if it is dirty.
    #[inline]
    pub fn dirtier(&self) -> Option<TransactionId> {
        *self.dirtier.lock()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirtier().is_some()
    }

    // ========================================================================
    // Before-image
    // ========================================================================

    /// Bytes of the page as of its last load or flush.
    pub fn before_image(&self) -> Vec<u8> {
        self.before_image.lock().clone()
    }

    pub fn set_before_image(&self, bytes: Vec<u8>) {
        *self.before_image.lock() = bytes;
    }

    /// Replace the cached page with `page` and clear the dirty flag.
    pub(crate) fn restore(&self, page: BTreePage) {
        *self.page.write() = page;
        self.mark_dirty(None);
    }

    /// True if nothing outside the pool holds this frame.
    #[inline]
    pub(crate) fn is_pinned(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) > 1
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("dirtier", &self.dirtier())
            .finish()
    }
}
