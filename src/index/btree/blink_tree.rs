//! The B-link tree file.
//!
//! Every page of a level links to its right sibling and carries a high key,
//! an exclusive upper bound on the keys reachable from it. A reader that
//! lands on a page whose high key is not above its search key moves right.
//! Because a split only ever hands the upper half of a page to a new right
//! sibling, this "move-right" rule lets internal pages be read without locks
//! and lets a split finish before its parent is touched.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPool, LockMode, PageRef};
use crate::common::{Error, FileId, PageCategory, PageId, Result, TransactionId};
use crate::index::btree::iterator::{BLinkTreeIndexIterator, BLinkTreeIterator};
use crate::index::btree::IndexPredicate;
use crate::storage::page::{Entry, PageLayout};
use crate::storage::PageFile;
use crate::tuple::{Key, Tuple};

/// What a recursive insert is placing.
enum Item {
    Tuple(Tuple),
    /// An entry promoted by a split, bound for internal level `level`.
    Entry { entry: Entry, level: u16 },
}

impl Item {
    fn target_level(&self) -> u16 {
        match self {
            Item::Tuple(_) => 0,
            Item::Entry { level, .. } => *level,
        }
    }
}

/// A split that still has to be recorded one level up.
#[derive(Debug, Clone, Copy)]
struct Promotion {
    entry: Entry,
    /// Level of the internal page the entry belongs in.
    level: u16,
}

/// A B-link tree index over one [`PageFile`].
///
/// All page access goes through the shared [`BufferPool`]. Operations that
/// modify pages return the ids of the pages they dirtied; the changes become
/// durable with [`BufferPool::commit`] and are undone with
/// [`BufferPool::abort`]. An operation that fails with
/// `Error::TransactionAborted` leaves the transaction to be aborted by the
/// caller.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use blinkdb::buffer::{BufferPool, Catalog};
/// use blinkdb::common::config::BufferPoolConfig;
/// use blinkdb::index::btree::BLinkTreeFile;
/// use blinkdb::storage::page::PageLayout;
/// use blinkdb::tuple::{Tuple, TupleDesc};
/// use blinkdb::TransactionId;
///
/// let pool = Arc::new(BufferPool::new(BufferPoolConfig::default(), Arc::new(Catalog::new())));
/// let layout = PageLayout::new(4096, TupleDesc::new(2), 0);
/// let tree = BLinkTreeFile::create(Arc::clone(&pool), "index.db", layout).unwrap();
///
/// let txn = TransactionId::new();
/// tree.insert_tuple(txn, &Tuple::new(vec![1, 100])).unwrap();
/// pool.commit(txn).unwrap();
/// ```
pub struct BLinkTreeFile {
    file: Arc<PageFile>,
    pool: Arc<BufferPool>,
}

impl BLinkTreeFile {
    /// Create a new tree file at `path` and register it with the pool's
    /// catalog.
    pub fn create<P: AsRef<Path>>(pool: Arc<BufferPool>, path: P, layout: PageLayout) -> Result<Self> {
        let id = pool.catalog().next_file_id();
        let file = PageFile::create(path, id, layout)?;
        Ok(Self::new(pool, Arc::new(file)))
    }

    /// Open an existing tree file written with `layout`.
    pub fn open<P: AsRef<Path>>(pool: Arc<BufferPool>, path: P, layout: PageLayout) -> Result<Self> {
        let id = pool.catalog().next_file_id();
        let file = PageFile::open(path, id, layout)?;
        Ok(Self::new(pool, Arc::new(file)))
    }

    /// Open the tree file at `path`, creating it if it does not exist.
    pub fn open_or_create<P: AsRef<Path>>(
        pool: Arc<BufferPool>,
        path: P,
        layout: PageLayout,
    ) -> Result<Self> {
        let id = pool.catalog().next_file_id();
        let file = PageFile::open_or_create(path, id, layout)?;
        Ok(Self::new(pool, Arc::new(file)))
    }

    /// Wrap an already opened file and register it with the pool's catalog.
    pub fn new(pool: Arc<BufferPool>, file: Arc<PageFile>) -> Self {
        pool.catalog().add_file(file.clone());
        Self { file, pool }
    }

    #[inline]
    pub fn id(&self) -> FileId {
        crate::storage::DbFile::id(self.file.as_ref())
    }

    #[inline]
    pub fn layout(&self) -> &PageLayout {
        self.file.layout()
    }

    #[inline]
    pub fn key_field(&self) -> usize {
        self.layout().key_field
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Number of pages in the file, root pointer excluded.
    pub fn num_pages(&self) -> u32 {
        self.file.num_pages()
    }

    #[inline]
    pub(crate) fn key_of(&self, tuple: &Tuple) -> Key {
        tuple.field(self.key_field())
    }

    pub(crate) fn fetch(&self, txn: TransactionId, pid: PageId, mode: LockMode) -> Result<PageRef> {
        self.pool.fetch_page(txn, pid, mode)
    }

    fn mark_dirty(&self, txn: TransactionId, page: &PageRef, dirty: &mut HashSet<PageId>) {
        page.mark_dirty(Some(txn));
        dirty.insert(page.id());
    }

    /// Append an empty page for `txn`. If `txn` aborts the page is retired.
    fn allocate(&self, txn: TransactionId, category: PageCategory) -> Result<PageId> {
        let pid = self.file.allocate_page(category)?;
        self.pool.record_allocation(txn, pid);
        Ok(pid)
    }

    fn check_shape(&self, tuple: &Tuple) -> Result<()> {
        if !tuple.matches(&self.layout().desc) {
            return Err(Error::illegal(format!(
                "tuple {} does not have {} fields",
                tuple,
                self.layout().desc.num_fields()
            )));
        }
        Ok(())
    }

    fn check_page(&self, pid: PageId) -> Result<()> {
        if pid.file_id != self.id() {
            return Err(Error::illegal(format!("{} does not belong to {}", pid, self.id())));
        }
        Ok(())
    }

    // ========================================================================
    // Root pointer
    // ========================================================================

    /// Id of the current root page.
    ///
    /// The root pointer page is read without a lock: a stale root is still
    /// the leftmost page of its level, so a descent from it stays correct.
    pub fn root_pointer(&self, txn: TransactionId) -> Result<PageId> {
        let rp = self.fetch(txn, PageId::root_pointer(self.id()), LockMode::None)?;
        let root = rp.read().as_root_pointer()?.root_id();
        root.ok_or_else(|| Error::illegal(format!("{} has no root", self.id())))
    }

    /// Level of a page: 0 for leaves, the stored level for internal pages.
    pub(crate) fn level_of(&self, txn: TransactionId, pid: PageId) -> Result<u16> {
        match pid.category {
            PageCategory::Leaf => Ok(0),
            PageCategory::Internal => {
                let page = self.fetch(txn, pid, LockMode::None)?;
                let level = page.read().as_internal()?.level();
                Ok(level)
            }
            _ => Err(Error::illegal(format!("{} has no level", pid))),
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Follow right siblings while `key` is not below the page's high key.
    ///
    /// Each page left behind is released; a page the transaction dirtied
    /// keeps its lock.
    fn move_right(
        &self,
        txn: TransactionId,
        mut page: PageRef,
        key: Key,
        mode: LockMode,
    ) -> Result<PageRef> {
        loop {
            let next = {
                let guard = page.read();
                match (guard.right_sibling(), guard.high_key()) {
                    (Some(sibling), Some(high)) if key >= high => Some(sibling),
                    _ => None,
                }
            };
            let Some(sibling) = next else {
                return Ok(page);
            };
            let left = page.id();
            drop(page);
            if mode != LockMode::None {
                self.pool.release_page(txn, left);
            }
            page = self.fetch(txn, sibling, mode)?;
        }
    }

    /// Find the leftmost leaf that may hold `key`, or the leftmost leaf of
    /// the tree when `key` is `None`, starting the descent at `pid`.
    ///
    /// Internal pages are read without locks; the leaf is fetched in `mode`.
    /// A page allocated by a transaction that has since aborted can only be
    /// reached through a link that no longer exists, so landing on one
    /// restarts the descent from the root.
    ///
    /// # Errors
    /// `IllegalState` if the descent reaches a root pointer or header page.
    pub fn find_leaf_page(
        &self,
        txn: TransactionId,
        pid: PageId,
        mode: LockMode,
        key: Option<Key>,
    ) -> Result<PageRef> {
        let mut pid = pid;
        loop {
            match pid.category {
                PageCategory::Leaf => {
                    let mut page = self.fetch(txn, pid, mode)?;
                    if let Some(k) = key {
                        page = self.move_right(txn, page, k, mode)?;
                    }
                    if !self.pool.is_retired(page.id()) {
                        return Ok(page);
                    }
                    let retired = page.id();
                    drop(page);
                    if mode != LockMode::None {
                        self.pool.release_page(txn, retired);
                    }
                    pid = self.root_pointer(txn)?;
                }
                PageCategory::Internal => {
                    let mut page = self.fetch(txn, pid, LockMode::None)?;
                    if let Some(k) = key {
                        page = self.move_right(txn, page, k, LockMode::None)?;
                    }
                    let next = {
                        let guard = page.read();
                        guard.as_internal().and_then(|internal| match key {
                            Some(k) => internal.child_for(k),
                            None => internal.first_child().ok_or_else(|| {
                                Error::illegal(format!("{} has no children", internal.id()))
                            }),
                        })
                    };
                    pid = if self.pool.is_retired(page.id()) {
                        self.root_pointer(txn)?
                    } else {
                        next?
                    };
                }
                PageCategory::RootPointer | PageCategory::Header => {
                    return Err(Error::illegal(format!("{} reached during a tree descent", pid)));
                }
            }
        }
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert `tuple`, splitting pages as needed.
    ///
    /// Returns the ids of the pages dirtied, in page order.
    ///
    /// # Errors
    /// - `IllegalState` if the tuple does not have the file's shape
    /// - `TransactionAborted` if a page lock timed out
    /// - `NoCleanPages` if the pool ran out of room
    pub fn insert_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.check_shape(tuple)?;
        let mut dirty = HashSet::new();

        let root = self.root_pointer(txn)?;
        let mut pending = self.insert_into(txn, root, &Item::Tuple(tuple.clone()), &mut dirty)?;
        while let Some(promotion) = pending {
            pending = self.install_promotion(txn, promotion, &mut dirty)?;
        }

        let mut dirtied: Vec<PageId> = dirty.into_iter().collect();
        dirtied.sort();
        Ok(dirtied)
    }

    /// Record a split that reached the top of the recursion.
    ///
    /// If the root is below the promotion's level the root itself split and
    /// the tree grows a level. Otherwise another transaction grew the tree
    /// first, and the entry is routed down from the new root.
    fn install_promotion(
        &self,
        txn: TransactionId,
        promotion: Promotion,
        dirty: &mut HashSet<PageId>,
    ) -> Result<Option<Promotion>> {
        let rp_id = PageId::root_pointer(self.id());
        let rp = self.fetch(txn, rp_id, LockMode::Exclusive)?;
        let root = rp
            .read()
            .as_root_pointer()?
            .root_id()
            .ok_or_else(|| Error::illegal(format!("{} has no root", self.id())))?;

        if self.level_of(txn, root)? >= promotion.level {
            drop(rp);
            self.pool.release_page(txn, rp_id);
            let item = Item::Entry {
                entry: promotion.entry,
                level: promotion.level,
            };
            return self.insert_into(txn, root, &item, dirty);
        }

        let new_root_id = self.allocate(txn, PageCategory::Internal)?;
        let new_root = self.fetch(txn, new_root_id, LockMode::Exclusive)?;
        {
            let mut guard = new_root.write();
            let internal = guard.as_internal_mut()?;
            internal.set_level(promotion.level);
            internal.insert_entry(promotion.entry)?;
        }
        self.mark_dirty(txn, &new_root, dirty);

        rp.write().as_root_pointer_mut()?.set_root_id(new_root_id)?;
        self.mark_dirty(txn, &rp, dirty);

        let prev_root = self.fetch(txn, root, LockMode::Exclusive)?;
        prev_root.write().set_parent(Some(new_root_id));
        self.mark_dirty(txn, &prev_root, dirty);

        debug!(
            "{} grew {} to level {} with root {}",
            txn,
            self.id(),
            promotion.level,
            new_root_id
        );
        Ok(None)
    }

    /// Recursive insert below `pid`. Returns the entry a split left for the
    /// caller's level, if any.
    ///
    /// No page lock or latch is held across the recursive call: on the way
    /// back up the current page is fetched again by id and the move-right
    /// rule finds where it went in the meantime. A promotion for a level
    /// other than the current page's is passed up unchanged.
    fn insert_into(
        &self,
        txn: TransactionId,
        pid: PageId,
        item: &Item,
        dirty: &mut HashSet<PageId>,
    ) -> Result<Option<Promotion>> {
        match (pid.category, item) {
            (PageCategory::Leaf, Item::Tuple(tuple)) => self.insert_into_leaf(txn, pid, tuple, dirty),
            (PageCategory::Internal, _) => {
                let key = match item {
                    Item::Tuple(t) => self.key_of(t),
                    Item::Entry { entry, .. } => entry.key,
                };
                let page = self.fetch(txn, pid, LockMode::None)?;
                let page = self.move_right(txn, page, key, LockMode::None)?;
                let current = page.id();

                // Read before testing retirement: retirement precedes the
                // restore that empties the page.
                let route = {
                    let guard = page.read();
                    guard
                        .as_internal()
                        .and_then(|internal| Ok((internal.level(), internal.child_for(key)?)))
                };
                drop(page);
                if self.pool.is_retired(current) {
                    return self.reroute(txn, item, dirty);
                }
                let (level, child) = route?;

                if let Item::Entry { entry, level: target } = item {
                    if level == *target {
                        return self.insert_into_internal(txn, current, *entry, level, dirty);
                    }
                }

                let promoted = self.insert_into(txn, child, item, dirty)?;
                self.pool.release_page(txn, child);

                match promoted {
                    Some(p) if p.level == level => {
                        self.insert_into_internal(txn, current, p.entry, level, dirty)
                    }
                    other => Ok(other),
                }
            }
            (PageCategory::Leaf, Item::Entry { .. }) => Err(Error::illegal(format!(
                "entry for level {} reached leaf {}",
                item.target_level(),
                pid
            ))),
            _ => Err(Error::illegal(format!("{} reached during an insert", pid))),
        }
    }

    /// Start `item` over after its path led to a retired page.
    ///
    /// A tuple descends again from the current root. An entry goes back to
    /// the top as a promotion, where the root pointer lock decides between
    /// growing the tree and routing it down.
    fn reroute(
        &self,
        txn: TransactionId,
        item: &Item,
        dirty: &mut HashSet<PageId>,
    ) -> Result<Option<Promotion>> {
        match item {
            Item::Tuple(_) => {
                let root = self.root_pointer(txn)?;
                self.insert_into(txn, root, item, dirty)
            }
            Item::Entry { entry, level } => Ok(Some(Promotion {
                entry: *entry,
                level: *level,
            })),
        }
    }

    fn insert_into_leaf(
        &self,
        txn: TransactionId,
        pid: PageId,
        tuple: &Tuple,
        dirty: &mut HashSet<PageId>,
    ) -> Result<Option<Promotion>> {
        let key = self.key_of(tuple);
        let page = self.fetch(txn, pid, LockMode::Exclusive)?;
        let page = self.move_right(txn, page, key, LockMode::Exclusive)?;
        if self.pool.is_retired(page.id()) {
            let retired = page.id();
            drop(page);
            self.pool.release_page(txn, retired);
            return self.reroute(txn, &Item::Tuple(tuple.clone()), dirty);
        }

        let has_room = page.read().as_leaf()?.num_empty_slots() > 0;
        if has_room {
            page.write().as_leaf_mut()?.insert_tuple(tuple.clone())?;
            self.mark_dirty(txn, &page, dirty);
            self.pool.release_page(txn, page.id());
            return Ok(None);
        }

        let (right, separator) = self.split_leaf_page(txn, &page, dirty)?;
        let target = if key < separator { &page } else { &right };
        target.write().as_leaf_mut()?.insert_tuple(tuple.clone())?;

        self.pool.release_page(txn, page.id());
        self.pool.release_page(txn, right.id());
        Ok(Some(Promotion {
            entry: Entry::new(separator, page.id(), right.id()),
            level: 1,
        }))
    }

    fn insert_into_internal(
        &self,
        txn: TransactionId,
        pid: PageId,
        entry: Entry,
        level: u16,
        dirty: &mut HashSet<PageId>,
    ) -> Result<Option<Promotion>> {
        let page = self.fetch(txn, pid, LockMode::Exclusive)?;
        let page = self.move_right(txn, page, entry.key, LockMode::Exclusive)?;
        if self.pool.is_retired(page.id()) {
            let retired = page.id();
            drop(page);
            self.pool.release_page(txn, retired);
            return self.reroute(txn, &Item::Entry { entry, level }, dirty);
        }

        let has_room = page.read().as_internal()?.num_empty_slots() > 0;
        if has_room {
            page.write().as_internal_mut()?.insert_entry(entry)?;
            self.mark_dirty(txn, &page, dirty);
            self.pool.release_page(txn, page.id());
            return Ok(None);
        }

        let (right, median) = self.split_internal_page(txn, &page, dirty)?;
        let target = if entry.key < median { &page } else { &right };
        target.write().as_internal_mut()?.insert_entry(entry)?;

        self.pool.release_page(txn, page.id());
        self.pool.release_page(txn, right.id());
        Ok(Some(Promotion {
            entry: Entry::new(median, page.id(), right.id()),
            level: level + 1,
        }))
    }

    // ========================================================================
    // Splits
    // ========================================================================

    /// Move the upper half of a full leaf to a new right sibling.
    ///
    /// The separator, the first key moved, becomes the left page's high key
    /// and stays in the right page ("copy up"). Returns the new page and the
    /// separator.
    fn split_leaf_page(
        &self,
        txn: TransactionId,
        page: &PageRef,
        dirty: &mut HashSet<PageId>,
    ) -> Result<(PageRef, Key)> {
        let right_id = self.allocate(txn, PageCategory::Leaf)?;
        let right = self.fetch(txn, right_id, LockMode::Exclusive)?;

        let (moved, high_key, sibling) = {
            let mut guard = page.write();
            let leaf = guard.as_leaf_mut()?;
            let at = leaf.split_index();
            (leaf.split_off(at), leaf.high_key(), leaf.right_sibling())
        };
        let separator = moved
            .first()
            .map(|t| self.key_of(t))
            .ok_or_else(|| Error::illegal(format!("split of {} moved nothing", page.id())))?;

        {
            let mut guard = right.write();
            let leaf = guard.as_leaf_mut()?;
            leaf.append_sorted(moved)?;
            leaf.set_high_key(high_key);
            leaf.set_right_sibling(sibling);
        }
        {
            let mut guard = page.write();
            let leaf = guard.as_leaf_mut()?;
            leaf.set_high_key(Some(separator));
            leaf.set_right_sibling(Some(right_id));
        }
        self.mark_dirty(txn, page, dirty);
        self.mark_dirty(txn, &right, dirty);

        debug!("{} split {} at key {} into {}", txn, page.id(), separator, right_id);
        Ok((right, separator))
    }

    /// Move the entries above the median of a full internal page to a new
    /// right sibling.
    ///
    /// The median key leaves both pages ("push up") and becomes the left
    /// page's high key. The new page is filled before the old one is cut, so
    /// an unlocked reader sees either the old page whole or both halves
    /// linked. Returns the new page and the median.
    fn split_internal_page(
        &self,
        txn: TransactionId,
        page: &PageRef,
        dirty: &mut HashSet<PageId>,
    ) -> Result<(PageRef, Key)> {
        let right_id = self.allocate(txn, PageCategory::Internal)?;
        let right = self.fetch(txn, right_id, LockMode::Exclusive)?;

        let (mid, level, median, keys, children, high_key, sibling) = {
            let guard = page.read();
            let internal = guard.as_internal()?;
            let mid = internal.num_entries() / 2;
            let (median, keys, children) = internal.clone().split_off(mid);
            (
                mid,
                internal.level(),
                median,
                keys,
                children,
                internal.high_key(),
                internal.right_sibling(),
            )
        };

        {
            let mut guard = right.write();
            let internal = guard.as_internal_mut()?;
            internal.fill(level, keys, children)?;
            internal.set_high_key(high_key);
            internal.set_right_sibling(sibling);
        }
        {
            let mut guard = page.write();
            let internal = guard.as_internal_mut()?;
            internal.split_off(mid);
            internal.set_high_key(Some(median));
            internal.set_right_sibling(Some(right_id));
        }
        self.mark_dirty(txn, page, dirty);
        self.mark_dirty(txn, &right, dirty);

        debug!(
            "{} split {} (level {}) at key {} into {}",
            txn,
            page.id(),
            level,
            median,
            right_id
        );
        Ok((right, median))
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete `tuple`, located through its record id.
    ///
    /// If a split moved the tuple since it was read, the move-right rule
    /// finds it. Pages left under-full are not merged.
    ///
    /// # Errors
    /// `IllegalState` if the tuple does not have the file's shape, has no
    /// record id of this file, or is not in the tree.
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.check_shape(tuple)?;
        let rid = tuple
            .record_id()
            .ok_or_else(|| Error::illegal(format!("tuple {} has no record id", tuple)))?;
        self.check_page(rid.page_id)?;
        if rid.page_id.category != PageCategory::Leaf {
            return Err(Error::illegal(format!("{} is not a leaf", rid.page_id)));
        }
        let key = self.key_of(tuple);

        let mut page = self.fetch(txn, rid.page_id, LockMode::Exclusive)?;
        loop {
            let (deleted, next, underfull) = {
                let mut guard = page.write();
                let leaf = guard.as_leaf_mut()?;
                let deleted = leaf.delete_tuple(tuple);
                let next = match (leaf.right_sibling(), leaf.high_key()) {
                    (Some(sibling), Some(high)) if key >= high => Some(sibling),
                    _ => None,
                };
                (deleted, next, leaf.num_tuples() < leaf.max_tuples() / 2)
            };

            if deleted {
                page.mark_dirty(Some(txn));
                if underfull {
                    debug!("{} left {} under half full", txn, page.id());
                }
                return Ok(vec![page.id()]);
            }

            let left = page.id();
            drop(page);
            self.pool.release_page(txn, left);
            match next {
                Some(sibling) => page = self.fetch(txn, sibling, LockMode::Exclusive)?,
                None => {
                    return Err(Error::illegal(format!(
                        "tuple {} not found in {}",
                        tuple,
                        self.id()
                    )))
                }
            }
        }
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// All tuples in key order.
    pub fn iter(&self, txn: TransactionId) -> BLinkTreeIterator<'_> {
        BLinkTreeIterator::new(self, txn)
    }

    /// Tuples whose key satisfies `predicate`, in key order.
    pub fn index_iter(&self, txn: TransactionId, predicate: IndexPredicate) -> BLinkTreeIndexIterator<'_> {
        BLinkTreeIndexIterator::new(self, txn, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Catalog;
    use crate::common::config::BufferPoolConfig;
    use crate::tuple::{RecordId, TupleDesc};
    use tempfile::TempDir;

    fn tree(page_size: usize) -> (BLinkTreeFile, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(
            BufferPoolConfig::default().with_pool_size(200),
            Arc::new(Catalog::new()),
        ));
        let layout = PageLayout::new(page_size, TupleDesc::new(2), 0);
        let tree = BLinkTreeFile::create(pool, dir.path().join("t.db"), layout).unwrap();
        (tree, dir)
    }

    fn t(k: i32) -> Tuple {
        Tuple::new(vec![k, k * 10])
    }

    fn leaf_keys(tree: &BLinkTreeFile, txn: TransactionId, pid: PageId) -> Vec<Key> {
        let page = tree.fetch(txn, pid, LockMode::Shared).unwrap();
        let keys = page.read().as_leaf().unwrap().keys().collect();
        keys
    }

    #[test]
    fn test_new_tree_has_one_empty_leaf() {
        let (tree, _dir) = tree(128);
        let txn = TransactionId::new();
        let root = tree.root_pointer(txn).unwrap();
        assert_eq!(root.category, PageCategory::Leaf);
        assert!(leaf_keys(&tree, txn, root).is_empty());
        assert_eq!(tree.num_pages(), 1);
    }

    #[test]
    fn test_insert_returns_dirtied_pages() {
        let (tree, _dir) = tree(128);
        let txn = TransactionId::new();
        let dirtied = tree.insert_tuple(txn, &t(1)).unwrap();
        assert_eq!(dirtied, vec![tree.root_pointer(txn).unwrap()]);
    }

    #[test]
    fn test_insert_wrong_shape_fails() {
        let (tree, _dir) = tree(128);
        let err = tree
            .insert_tuple(TransactionId::new(), &Tuple::new(vec![1]))
            .unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_leaf_split_copies_separator_up() {
        // (68 - 20) / 8 = 6 tuples per leaf
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        for k in 1..=7 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }

        let root = tree.root_pointer(txn).unwrap();
        assert_eq!(root.category, PageCategory::Internal);
        let root_page = tree.fetch(txn, root, LockMode::None).unwrap();
        let entries: Vec<Entry> = root_page.read().as_internal().unwrap().entries().collect();
        assert_eq!(entries.len(), 1);
        let sep = entries[0].key;

        let left = leaf_keys(&tree, txn, entries[0].left);
        let right = leaf_keys(&tree, txn, entries[0].right);
        assert!(left.iter().all(|&k| k < sep));
        assert!(right.iter().all(|&k| k >= sep));
        assert_eq!(right[0], sep);
        assert_eq!(left.len() + right.len(), 7);
    }

    #[test]
    fn test_root_growth_stamps_parent() {
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        let first_root = tree.root_pointer(txn).unwrap();
        for k in 1..=7 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }
        let root = tree.root_pointer(txn).unwrap();
        let old = tree.fetch(txn, first_root, LockMode::None).unwrap();
        assert_eq!(old.read().parent_id(), Some(root));
    }

    #[test]
    fn test_internal_split_pushes_median_up() {
        // leaves hold 6, internal pages (68 - 26) / 8 = 5 entries
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        for k in 0..60 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }

        let root = tree.root_pointer(txn).unwrap();
        let root_page = tree.fetch(txn, root, LockMode::None).unwrap();
        let guard = root_page.read();
        let internal = guard.as_internal().unwrap();
        assert!(internal.level() >= 2);

        // A separator of the root appears in neither child as an entry key.
        let entry = internal.entries().next().unwrap();
        for child in [entry.left, entry.right] {
            let page = tree.fetch(txn, child, LockMode::None).unwrap();
            let keys: Vec<Key> = page
                .read()
                .as_internal()
                .unwrap()
                .entries()
                .map(|e| e.key)
                .collect();
            assert!(!keys.contains(&entry.key));
        }
    }

    #[test]
    fn test_find_leaf_page() {
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        for k in 0..40 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }
        let root = tree.root_pointer(txn).unwrap();

        let leftmost = tree.find_leaf_page(txn, root, LockMode::Shared, None).unwrap();
        assert_eq!(leftmost.read().as_leaf().unwrap().keys().next(), Some(0));

        let leaf = tree.find_leaf_page(txn, root, LockMode::Shared, Some(25)).unwrap();
        let guard = leaf.read();
        let leaf = guard.as_leaf().unwrap();
        assert!(leaf.keys().any(|k| k == 25));
        assert!(leaf.high_key().map_or(true, |h| 25 < h));
    }

    #[test]
    fn test_find_leaf_rejects_root_pointer() {
        let (tree, _dir) = tree(128);
        let txn = TransactionId::new();
        let rp = PageId::root_pointer(tree.id());
        assert!(matches!(
            tree.find_leaf_page(txn, rp, LockMode::Shared, None),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_move_right_from_stale_page() {
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        let first_leaf = tree.root_pointer(txn).unwrap();
        for k in 0..20 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }
        // Starting at the original leaf, as a reader with a stale root would.
        let leaf = tree
            .find_leaf_page(txn, first_leaf, LockMode::Shared, Some(19))
            .unwrap();
        assert!(leaf.read().as_leaf().unwrap().keys().any(|k| k == 19));
    }

    #[test]
    fn test_delete_follows_moved_tuple() {
        let (tree, _dir) = tree(68);
        let txn = TransactionId::new();
        for k in 0..6 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }
        let victim = tree
            .iter(txn)
            .map(|r| r.unwrap())
            .find(|t| t.field(0) == 5)
            .unwrap();

        // Splits the only leaf; key 5 moves right.
        tree.insert_tuple(txn, &t(6)).unwrap();

        let dirtied = tree.delete_tuple(txn, &victim).unwrap();
        assert_ne!(dirtied[0], victim.record_id().unwrap().page_id);
        let keys: Vec<Key> = tree.iter(txn).map(|r| r.unwrap().field(0)).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 6]);

        assert!(matches!(
            tree.delete_tuple(txn, &victim),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_delete_without_record_id() {
        let (tree, _dir) = tree(128);
        assert!(tree.delete_tuple(TransactionId::new(), &t(1)).is_err());
    }

    #[test]
    fn test_delete_wrong_shape_fails() {
        let (tree, _dir) = tree(128);
        let txn = TransactionId::new();
        let mut short = Tuple::new(vec![]);
        short.set_record_id(Some(RecordId {
            page_id: tree.root_pointer(txn).unwrap(),
            slot: 0,
        }));
        assert!(matches!(
            tree.delete_tuple(txn, &short),
            Err(Error::IllegalState(_))
        ));
    }

    /// Split the only leaf and grow the root in `txn`, then abort it.
    /// Returns the aborted root and right leaf, both retired.
    fn aborted_split(tree: &BLinkTreeFile) -> (PageId, PageId) {
        let txn = TransactionId::new();
        for k in 1..=7 {
            tree.insert_tuple(txn, &t(k)).unwrap();
        }
        let root = tree.root_pointer(txn).unwrap();
        let right = {
            let page = tree.fetch(txn, root, LockMode::None).unwrap();
            let entry = page.read().as_internal().unwrap().entries().next().unwrap();
            entry.right
        };
        tree.pool().abort(txn).unwrap();
        assert!(tree.pool().is_retired(root));
        assert!(tree.pool().is_retired(right));
        (root, right)
    }

    #[test]
    fn test_descent_restarts_at_retired_leaf() {
        let (tree, _dir) = tree(68);
        let first_leaf = tree.root_pointer(TransactionId::new()).unwrap();
        let (root, right) = aborted_split(&tree);

        let txn = TransactionId::new();
        for start in [root, right] {
            let leaf = tree
                .find_leaf_page(txn, start, LockMode::Shared, Some(7))
                .unwrap();
            assert_eq!(leaf.id(), first_leaf);
        }
        assert!(!tree.pool().holds_lock(txn, right));
    }

    #[test]
    fn test_insert_reached_through_retired_pages_lands_in_tree() {
        let (tree, _dir) = tree(68);
        let (root, right) = aborted_split(&tree);

        let txn = TransactionId::new();
        let mut dirty = HashSet::new();
        let via_root = tree
            .insert_into(txn, root, &Item::Tuple(t(100)), &mut dirty)
            .unwrap();
        let via_leaf = tree
            .insert_into_leaf(txn, right, &t(101), &mut dirty)
            .unwrap();
        assert!(via_root.is_none() && via_leaf.is_none());
        tree.pool().commit(txn).unwrap();

        let check = TransactionId::new();
        let keys: Vec<Key> = tree.iter(check).map(|r| r.unwrap().field(0)).collect();
        assert_eq!(keys, vec![100, 101]);
        tree.check_integrity(check).unwrap();
    }

    #[test]
    fn test_retired_internal_page_sends_entry_back_up() {
        let (tree, _dir) = tree(68);
        let (root, right) = aborted_split(&tree);

        let txn = TransactionId::new();
        let first_leaf = tree.root_pointer(txn).unwrap();
        let entry = Entry::new(50, first_leaf, right);
        let mut dirty = HashSet::new();
        let bounced = tree
            .insert_into_internal(txn, root, entry, 1, &mut dirty)
            .unwrap()
            .unwrap();
        assert_eq!(bounced.level, 1);
        assert_eq!(bounced.entry.key, 50);
        assert!(dirty.is_empty());
    }
}
